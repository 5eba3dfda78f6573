//! Filters for exercising the engine in tests.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::{
    context::FilterContext,
    traits::{Filter, FilterError, FilterResult},
};

/// Shared record of which probe ran which phase, in order
#[derive(Debug, Clone, Default)]
pub struct ProbeLog(Arc<Mutex<Vec<String>>>);

impl ProbeLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }
}

/// Records its calls and fails or cancels on request
#[derive(Debug, Clone, Serialize)]
pub struct ProbeFilter {
    label: String,
    #[serde(skip)]
    check_code: Option<i32>,
    #[serde(skip)]
    execute_code: Option<i32>,
    #[serde(skip)]
    cancel_in_execute: bool,
    #[serde(skip)]
    wait_for_cancel: bool,
    #[serde(skip)]
    log: ProbeLog,
}

impl ProbeFilter {
    pub fn new(label: &str, log: &ProbeLog) -> Self {
        Self {
            label: label.to_string(),
            check_code: None,
            execute_code: None,
            cancel_in_execute: false,
            wait_for_cancel: false,
            log: log.clone(),
        }
    }

    pub fn failing_check(mut self, code: i32) -> Self {
        self.check_code = Some(code);
        self
    }

    pub fn failing_execute(mut self, code: i32) -> Self {
        self.execute_code = Some(code);
        self
    }

    /// Spin inside `execute` until the run is cancelled, giving up after five seconds
    pub fn waiting_for_cancel(mut self) -> Self {
        self.wait_for_cancel = true;
        self
    }

    /// Cancel the running pipeline from inside `execute`
    pub fn cancelling(mut self) -> Self {
        self.cancel_in_execute = true;
        self
    }
}

impl Filter for ProbeFilter {
    fn name(&self) -> &'static str {
        "ProbeFilter"
    }

    fn human_label(&self) -> &str {
        &self.label
    }

    fn data_check(&mut self, _ctx: &mut FilterContext<'_>) -> FilterResult {
        self.log.push(format!("check:{}", self.label));
        match self.check_code {
            Some(code) => Err(FilterError::new(code, format!("{} failed its check", self.label))),
            None => Ok(()),
        }
    }

    fn execute(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        self.log.push(format!("execute:{}", self.label));
        if self.cancel_in_execute {
            ctx.request_cancel();
        }
        if self.wait_for_cancel {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !ctx.is_cancelled() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        match self.execute_code {
            Some(code) => Err(FilterError::new(code, format!("{} failed to execute", self.label))),
            None => Ok(()),
        }
    }
}
