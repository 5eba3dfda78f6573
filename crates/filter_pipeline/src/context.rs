use filter_kit_common::PipelineMessage;

use crate::{
    data::DataContainerArray,
    runner::CancelToken,
    traits::PipelineObserver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Preflight,
    Execute,
}

/// What a filter sees while it runs: the shared data, the run mode, the
/// cancellation flag and a way to publish status, warnings and progress.
pub struct FilterContext<'a> {
    data: &'a mut DataContainerArray,
    mode: RunMode,
    cancel: &'a CancelToken,
    observers: &'a mut [Box<dyn PipelineObserver>],
    label: &'a str,
    name: &'static str,
    index: usize,
    warning_code: i32,
}

impl<'a> FilterContext<'a> {
    pub(crate) fn new(
        data: &'a mut DataContainerArray,
        mode: RunMode,
        cancel: &'a CancelToken,
        observers: &'a mut [Box<dyn PipelineObserver>],
        label: &'a str,
        name: &'static str,
        index: usize,
    ) -> Self {
        Self {
            data,
            mode,
            cancel,
            observers,
            label,
            name,
            index,
            warning_code: 0,
        }
    }

    pub fn data(&self) -> &DataContainerArray {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut DataContainerArray {
        &mut *self.data
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn in_preflight(&self) -> bool {
        self.mode == RunMode::Preflight
    }

    /// Long-running filters should poll this and return early when set
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the engine to stop after this filter returns
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn pipeline_index(&self) -> usize {
        self.index
    }

    /// Last warning code set by this filter, 0 if none
    pub fn warning_code(&self) -> i32 {
        self.warning_code
    }

    /// Record a warning. Warnings never stop a run.
    pub fn set_warning(&mut self, code: i32, text: impl Into<String>) {
        self.warning_code = code;
        let msg = PipelineMessage::warning(self.label, self.index, code, text).from_filter(self.name);
        self.publish(msg);
    }

    pub fn status(&mut self, text: impl Into<String>) {
        let msg = PipelineMessage::status(self.label, text)
            .at_index(self.index)
            .from_filter(self.name);
        self.publish(msg);
    }

    /// Progress within this filter, 0-100
    pub fn progress(&mut self, percent: u8, text: impl Into<String>) {
        let msg = PipelineMessage::progress(self.label, percent, text)
            .at_index(self.index)
            .from_filter(self.name);
        self.publish(msg);
    }

    fn publish(&mut self, msg: PipelineMessage) {
        for observer in self.observers.iter_mut() {
            observer.on_message(&msg);
        }
    }
}
