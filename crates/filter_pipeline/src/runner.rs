//! Running a whole pipeline on a worker thread.
//!
//! The pipeline and its data are moved onto a blocking worker for the duration of
//! the run and handed back when it finishes, so nothing can edit either while the
//! filters execute. Messages stream back over a channel.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use filter_kit_common::PipelineMessage;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    data::DataContainerArray,
    error::{PipelineError, Result},
    observer::ChannelObserver,
    pipeline::FilterPipeline,
    types::{RunEvent, RunOutcome, RunState},
};

/// Cooperative cancellation flag shared between a pipeline, its filters and
/// whoever started the run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run state shared between the worker and the handle
#[derive(Debug, Clone, Default)]
struct SharedState(Arc<Mutex<RunState>>);

impl SharedState {
    fn get(&self) -> RunState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: RunEvent) -> Result<RunState> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *state = state.transition(event)?;
        Ok(*state)
    }

    /// Move an active run to `Cancelling`. Returns false when the run already ended.
    fn cancel_if_active(&self) -> bool {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.is_active() {
            return false;
        }
        *state = RunState::Cancelling;
        true
    }
}

/// Everything handed back when a run ends
#[derive(Debug)]
pub struct CompletedRun {
    pub pipeline: FilterPipeline,
    pub data: DataContainerArray,
    pub outcome: RunOutcome,
    /// `Stopped` after a normal or failed run, `Idle` after a cancelled one
    pub state: RunState,
}

/// Cancels a run from anywhere, independently of its [`RunHandle`]
#[derive(Debug, Clone)]
pub struct RunCanceller {
    state: SharedState,
    cancel: CancelToken,
}

impl RunCanceller {
    /// Request cancellation. Filters stop at their next check.
    /// Does nothing once the run has finished.
    pub fn cancel(&self) -> Result<()> {
        if self.state.cancel_if_active() {
            self.cancel.cancel();
        } else {
            debug!(state = %self.state.get(), "Run already finished, nothing to cancel");
        }
        Ok(())
    }
}

/// A pipeline executing on a worker
pub struct RunHandle {
    state: SharedState,
    cancel: CancelToken,
    messages: mpsc::UnboundedReceiver<PipelineMessage>,
    join: JoinHandle<(FilterPipeline, DataContainerArray, RunOutcome)>,
}

/// Move `pipeline` and `data` onto a blocking worker and execute.
///
/// Must be called from within a tokio runtime.
pub fn spawn(mut pipeline: FilterPipeline, mut data: DataContainerArray) -> Result<RunHandle> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| PipelineError::Worker(e.to_string()))?;

    let state = SharedState::default();
    state.apply(RunEvent::Start)?;

    let (tx, rx) = mpsc::unbounded_channel();
    pipeline.add_observer(ChannelObserver::new(tx));
    pipeline.reset_cancel();
    let cancel = pipeline.cancel_token();

    info!(pipeline = %pipeline.name(), "Starting pipeline worker");
    let worker_state = state.clone();
    let join = runtime.spawn_blocking(move || {
        let outcome = pipeline.execute(&mut data);
        // Dropping the channel observer closes the message stream.
        pipeline.pop_observer();
        match worker_state.apply(RunEvent::Finish) {
            Ok(state) => debug!(%state, %outcome, "Pipeline worker finished"),
            Err(e) => debug!(error = %e, "Run state was not active at finish"),
        }
        (pipeline, data, outcome)
    });

    Ok(RunHandle {
        state,
        cancel,
        messages: rx,
        join,
    })
}

impl RunHandle {
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Request cancellation. Filters stop at their next check.
    pub fn cancel(&self) -> Result<()> {
        self.canceller().cancel()
    }

    pub fn canceller(&self) -> RunCanceller {
        RunCanceller {
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next message, or `None` once the run has finished and all messages are drained
    pub async fn next_message(&mut self) -> Option<PipelineMessage> {
        self.messages.recv().await
    }

    /// Wait for the run to end, discarding undelivered messages
    pub async fn wait(self) -> Result<CompletedRun> {
        self.wait_with(|_| {}).await
    }

    /// Wait for the run to end, passing each message to `on_message` as it arrives
    pub async fn wait_with<F>(mut self, mut on_message: F) -> Result<CompletedRun>
    where
        F: FnMut(PipelineMessage),
    {
        while let Some(msg) = self.messages.recv().await {
            on_message(msg);
        }
        let (pipeline, data, outcome) = self
            .join
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?;
        Ok(CompletedRun {
            pipeline,
            data,
            outcome,
            state: self.state.get(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ProbeFilter, ProbeLog};

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let result = spawn(FilterPipeline::new("No runtime"), DataContainerArray::new());
        assert!(matches!(result, Err(PipelineError::Worker(_))));
    }

    #[tokio::test]
    async fn test_background_run_returns_pipeline_and_data() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Background");
        pipeline.push_filter(ProbeFilter::new("First", &log));
        pipeline.push_filter(ProbeFilter::new("Second", &log));

        let handle = spawn(pipeline, DataContainerArray::new()).unwrap();
        let mut messages = Vec::new();
        let completed = handle.wait_with(|m| messages.push(m)).await.unwrap();

        assert_eq!(completed.outcome, RunOutcome::Completed);
        assert_eq!(completed.state, RunState::Stopped);
        assert_eq!(completed.pipeline.len(), 2);
        assert!(!messages.is_empty());
        assert_eq!(log.entries().len(), 4);
    }

    #[tokio::test]
    async fn test_background_failure_is_reported() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Background failure");
        pipeline.push_filter(ProbeFilter::new("First", &log));
        pipeline.push_filter(ProbeFilter::new("Second", &log).failing_execute(-5));
        pipeline.push_filter(ProbeFilter::new("Third", &log));

        let handle = spawn(pipeline, DataContainerArray::new()).unwrap();
        let mut errors = Vec::new();
        let completed = handle
            .wait_with(|m| {
                if m.is_error() {
                    errors.push(m)
                }
            })
            .await
            .unwrap();

        assert_eq!(completed.outcome, RunOutcome::Failed { index: 1, code: -5 });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].prefix, "Second");
        assert_eq!(errors[0].pipeline_index, Some(1));
    }

    #[tokio::test]
    async fn test_cancel_through_handle_ends_idle() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Cancelled");
        pipeline.push_filter(ProbeFilter::new("Waiting", &log).waiting_for_cancel());
        pipeline.push_filter(ProbeFilter::new("Never", &log));

        let handle = spawn(pipeline, DataContainerArray::new()).unwrap();
        handle.cancel().unwrap();
        assert_eq!(handle.state(), RunState::Cancelling);

        let completed = handle.wait().await.unwrap();
        assert_eq!(completed.outcome, RunOutcome::Cancelled { index: 0 });
        assert_eq!(completed.state, RunState::Idle);
        assert!(!log.entries().iter().any(|e| e.ends_with(":Never")));
    }

    #[tokio::test]
    async fn test_cancel_after_finish_keeps_outcome() {
        let mut pipeline = FilterPipeline::new("Finished");
        pipeline.push_filter(ProbeFilter::new("Only", &ProbeLog::default()));

        let mut handle = spawn(pipeline, DataContainerArray::new()).unwrap();
        let canceller = handle.canceller();
        while handle.state() != RunState::Stopped {
            tokio::task::yield_now().await;
        }
        canceller.cancel().unwrap();
        assert_eq!(handle.state(), RunState::Stopped);
        assert!(!handle.cancel_token().is_cancelled());

        while handle.next_message().await.is_some() {}
        let completed = handle.wait().await.unwrap();
        assert_eq!(completed.outcome, RunOutcome::Completed);
        assert_eq!(completed.state, RunState::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_from_filter_stops_run() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Cancelled");
        pipeline.push_filter(ProbeFilter::new("First", &log).cancelling());
        pipeline.push_filter(ProbeFilter::new("Second", &log));

        let handle = spawn(pipeline, DataContainerArray::new()).unwrap();
        let completed = handle.wait().await.unwrap();
        assert_eq!(completed.outcome, RunOutcome::Cancelled { index: 0 });
        // The filter cancelled through the token, not through the handle.
        assert_eq!(completed.state, RunState::Stopped);
    }
}
