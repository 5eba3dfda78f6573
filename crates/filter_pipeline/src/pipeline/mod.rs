pub mod builder;

use std::time::Instant;

use filter_kit_common::{PipelineMessage, utils::format_elapsed};
use tracing::{debug, error, info, warn};

use crate::{
    context::{FilterContext, RunMode},
    data::DataContainerArray,
    error::{PipelineError, Result},
    runner::CancelToken,
    traits::{Filter, FilterResult, PipelineObserver},
    types::{FilterId, PreflightReport, RunOutcome},
};

/// A filter in a pipeline together with its per-run state
pub struct FilterNode {
    id: FilterId,
    filter: Box<dyn Filter>,
    enabled: bool,
    error_code: i32,
    warning_code: i32,
}

impl FilterNode {
    pub fn new<F>(filter: F) -> Self
    where
        F: Filter + 'static,
    {
        Self::from_boxed(Box::new(filter))
    }

    pub fn from_boxed(filter: Box<dyn Filter>) -> Self {
        Self {
            id: FilterId::next(),
            filter,
            enabled: true,
            error_code: 0,
            warning_code: 0,
        }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    pub fn filter_mut(&mut self) -> &mut dyn Filter {
        self.filter.as_mut()
    }

    pub fn human_label(&self) -> &str {
        self.filter.human_label()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Error code from the last preflight or execute, 0 when clean
    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    pub fn warning_code(&self) -> i32 {
        self.warning_code
    }

    fn clear_codes(&mut self) {
        self.error_code = 0;
        self.warning_code = 0;
    }
}

impl std::fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterNode")
            .field("id", &self.id)
            .field("filter", &self.filter.name())
            .field("enabled", &self.enabled)
            .field("error_code", &self.error_code)
            .field("warning_code", &self.warning_code)
            .finish()
    }
}

/// An ordered list of filters run one after another against a shared
/// [`DataContainerArray`]
#[derive(Default)]
pub struct FilterPipeline {
    name: String,
    filters: Vec<FilterNode>,
    observers: Vec<Box<dyn PipelineObserver>>,
    cancel: CancelToken,
}

impl FilterPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterNode> {
        self.filters.iter()
    }

    pub fn get(&self, index: usize) -> Option<&FilterNode> {
        self.filters.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FilterNode> {
        self.filters.get_mut(index)
    }

    pub fn position(&self, id: FilterId) -> Option<usize> {
        self.filters.iter().position(|node| node.id == id)
    }

    pub fn node(&self, id: FilterId) -> Option<&FilterNode> {
        self.filters.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: FilterId) -> Option<&mut FilterNode> {
        self.filters.iter_mut().find(|node| node.id == id)
    }

    pub fn ids(&self) -> Vec<FilterId> {
        self.filters.iter().map(FilterNode::id).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.filters.iter().map(|node| node.human_label().to_string()).collect()
    }

    /// Append a filter and return its id
    pub fn push_filter<F>(&mut self, filter: F) -> FilterId
    where
        F: Filter + 'static,
    {
        self.push_back(FilterNode::new(filter))
    }

    pub fn push_back(&mut self, node: FilterNode) -> FilterId {
        let id = node.id;
        self.filters.push(node);
        id
    }

    /// Insert at `index`, which may equal the length to append
    pub fn insert(&mut self, index: usize, node: FilterNode) -> Result<FilterId> {
        if index > self.filters.len() {
            return Err(PipelineError::IndexOutOfBounds { index, len: self.filters.len() });
        }
        let id = node.id;
        self.filters.insert(index, node);
        Ok(id)
    }

    pub fn remove(&mut self, index: usize) -> Option<FilterNode> {
        (index < self.filters.len()).then(|| self.filters.remove(index))
    }

    /// Remove by id, returning the position it occupied
    pub fn remove_by_id(&mut self, id: FilterId) -> Option<(usize, FilterNode)> {
        let index = self.position(id)?;
        Some((index, self.filters.remove(index)))
    }

    pub fn clear(&mut self) -> Vec<FilterNode> {
        std::mem::take(&mut self.filters)
    }

    pub fn enabled_count(&self) -> usize {
        self.filters.iter().filter(|node| node.enabled).count()
    }

    pub fn add_observer<O>(&mut self, observer: O)
    where
        O: PipelineObserver + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn push_boxed_observer(&mut self, observer: Box<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    pub fn pop_observer(&mut self) -> Option<Box<dyn PipelineObserver>> {
        self.observers.pop()
    }

    /// Token shared with this pipeline; cancelling it stops the current run
    /// at the next check.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clear a previous cancellation so the pipeline can run again
    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    /// Preflight against an empty data container array
    pub fn preflight_pipeline(&mut self) -> PreflightReport {
        self.preflight_with(&DataContainerArray::default())
    }

    /// Validate every enabled filter in order against a scratch copy of `seed`.
    ///
    /// A failing filter does not stop the pass: every filter is checked so all
    /// problems are reported at once. `seed` is never modified.
    pub fn preflight_with(&mut self, seed: &DataContainerArray) -> PreflightReport {
        let mut scratch = seed.clone();
        let mut report = PreflightReport::default();
        debug!(pipeline = %self.name, filters = self.filters.len(), "Preflighting pipeline");

        for (index, node) in self.filters.iter_mut().enumerate() {
            node.clear_codes();
            if !node.enabled {
                continue;
            }

            let label = node.filter.human_label().to_string();
            let name = node.filter.name();
            let mut ctx = FilterContext::new(
                &mut scratch,
                RunMode::Preflight,
                &self.cancel,
                &mut self.observers,
                &label,
                name,
                index,
            );
            let result = node.filter.data_check(&mut ctx);
            node.warning_code = ctx.warning_code();

            if node.warning_code != 0 {
                report.warning_count += 1;
            }
            if let Err(err) = result {
                debug!(filter = %label, index, code = err.code, "Preflight error: {}", err.message);
                node.error_code = err.code;
                report.error_count += 1;
                report.first_error.get_or_insert(err.code);
                let msg = PipelineMessage::error(&label, index, err.code, err.message).from_filter(name);
                publish(&mut self.observers, msg);
            }
        }

        debug!(
            pipeline = %self.name,
            errors = report.error_count,
            warnings = report.warning_count,
            "Preflight finished"
        );
        report
    }

    /// Run every enabled filter in order against `data`, stopping at the first error.
    ///
    /// Filters modify `data` in place; nothing is rolled back when a later filter
    /// fails. Cancellation is checked before each filter starts and after it returns.
    pub fn execute(&mut self, data: &mut DataContainerArray) -> RunOutcome {
        let started = Instant::now();
        let total = self.enabled_count();
        let mut completed = 0usize;

        info!(pipeline = %self.name, filters = total, "Executing pipeline");
        let msg = PipelineMessage::status(&self.name, format!("Executing {} filters", total));
        publish(&mut self.observers, msg);

        for (index, node) in self.filters.iter_mut().enumerate() {
            node.clear_codes();
            if !node.enabled {
                debug!(index, filter = node.filter.name(), "Skipping disabled filter");
                continue;
            }

            if self.cancel.is_cancelled() {
                return cancelled(&self.name, &mut self.observers, index);
            }

            let label = node.filter.human_label().to_string();
            let name = node.filter.name();
            debug!(index, filter = name, "Executing filter");
            let msg = PipelineMessage::status(&label, "Executing")
                .at_index(index)
                .from_filter(name);
            publish(&mut self.observers, msg);

            let mut ctx = FilterContext::new(
                &mut *data,
                RunMode::Execute,
                &self.cancel,
                &mut self.observers,
                &label,
                name,
                index,
            );
            let result: FilterResult = node
                .filter
                .data_check(&mut ctx)
                .and_then(|_| node.filter.execute(&mut ctx));
            node.warning_code = ctx.warning_code();

            if let Err(err) = result {
                error!(pipeline = %self.name, filter = %label, index, code = err.code, "{}", err.message);
                node.error_code = err.code;
                let msg = PipelineMessage::error(&label, index, err.code, err.message).from_filter(name);
                publish(&mut self.observers, msg);
                return RunOutcome::Failed { index, code: node.error_code };
            }

            if self.cancel.is_cancelled() {
                return cancelled(&self.name, &mut self.observers, index);
            }

            completed += 1;
            let percent = (completed * 100 / total.max(1)) as u8;
            let msg = PipelineMessage::progress(&self.name, percent, label).at_index(index);
            publish(&mut self.observers, msg);
        }

        let elapsed = format_elapsed(started.elapsed().as_millis());
        info!(pipeline = %self.name, %elapsed, "Pipeline complete");
        let msg = PipelineMessage::status(&self.name, format!("Pipeline complete ({})", elapsed));
        publish(&mut self.observers, msg);
        RunOutcome::Completed
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "Pipeline '{}': {} filters, {} enabled",
            self.name,
            self.filters.len(),
            self.enabled_count()
        )
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("name", &self.name)
            .field("filters", &self.filters)
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn publish(observers: &mut [Box<dyn PipelineObserver>], msg: PipelineMessage) {
    for observer in observers.iter_mut() {
        observer.on_message(&msg);
    }
}

fn cancelled(name: &str, observers: &mut [Box<dyn PipelineObserver>], index: usize) -> RunOutcome {
    warn!(pipeline = %name, index, "Pipeline was canceled");
    publish(observers, PipelineMessage::status(name, "Pipeline was canceled"));
    RunOutcome::Cancelled { index }
}
