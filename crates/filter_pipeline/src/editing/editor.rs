use std::path::Path;

use tracing::debug;

use crate::{
    data::DataContainerArray,
    editing::{
        AddFiltersCommand,
        ClearPipelineCommand,
        EditCommand,
        MoveFiltersCommand,
        RemoveFiltersCommand,
        SetFiltersEnabledCommand,
        UndoStack,
    },
    error::{PipelineError, Result},
    io,
    pipeline::{FilterNode, FilterPipeline},
    registry::FilterRegistry,
    runner::{self, CompletedRun, RunHandle},
    traits::Filter,
    types::{FilterId, PreflightReport, RunOutcome},
};

/// A pipeline being edited: every change is undoable, and the pipeline can be
/// re-validated after each edit.
///
/// While a run has the pipeline checked out, every edit fails with
/// [`PipelineError::PipelineBusy`].
pub struct PipelineEditor {
    pipeline: Option<FilterPipeline>,
    undo_stack: UndoStack,
    auto_preflight: bool,
    seed: DataContainerArray,
    last_preflight: Option<PreflightReport>,
}

impl PipelineEditor {
    pub fn new(pipeline: FilterPipeline) -> Self {
        Self {
            pipeline: Some(pipeline),
            undo_stack: UndoStack::new(),
            auto_preflight: false,
            seed: DataContainerArray::default(),
            last_preflight: None,
        }
    }

    /// Open a pipeline file, resolving filters through `registry`
    pub fn open<P: AsRef<Path>>(path: P, registry: &FilterRegistry) -> Result<Self> {
        Ok(Self::new(io::load_pipeline(path, registry)?))
    }

    /// Preflight after every successful edit, undo and redo
    pub fn with_auto_preflight(mut self, enabled: bool) -> Self {
        self.auto_preflight = enabled;
        self
    }

    /// Keep at most `limit` edits in the history
    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.undo_stack = UndoStack::with_limit(limit);
        self
    }

    /// Data the preflight starts from, e.g. containers a run will be seeded with
    pub fn set_seed(&mut self, seed: DataContainerArray) {
        self.seed = seed;
    }

    pub fn pipeline(&self) -> Result<&FilterPipeline> {
        self.pipeline.as_ref().ok_or(PipelineError::PipelineBusy)
    }

    pub fn is_checked_out(&self) -> bool {
        self.pipeline.is_none()
    }

    pub fn add_filter<F>(&mut self, filter: F) -> Result<FilterId>
    where
        F: Filter + 'static,
    {
        let node = FilterNode::new(filter);
        let id = node.id();
        self.add_filters(vec![node], None)?;
        Ok(id)
    }

    /// Insert `nodes` at `position`, or append them when `position` is `None`
    pub fn add_filters(&mut self, nodes: Vec<FilterNode>, position: Option<usize>) -> Result<Vec<FilterId>> {
        let command = AddFiltersCommand::new(nodes, position);
        let ids = command.ids().to_vec();
        self.apply(Box::new(command))?;
        Ok(ids)
    }

    pub fn remove_filters(&mut self, ids: &[FilterId]) -> Result<()> {
        let command = RemoveFiltersCommand::new(self.pipeline()?, ids.to_vec())?;
        self.apply(Box::new(command))
    }

    pub fn move_filters(&mut self, ids: &[FilterId], destination: usize) -> Result<()> {
        let command = MoveFiltersCommand::new(self.pipeline()?, ids.to_vec(), destination)?;
        self.apply(Box::new(command))
    }

    pub fn set_enabled(&mut self, ids: &[FilterId], enabled: bool) -> Result<()> {
        self.apply(Box::new(SetFiltersEnabledCommand::new(ids.to_vec(), enabled)))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.apply(Box::new(ClearPipelineCommand::new()))
    }

    /// Apply any edit command and record it for undo
    pub fn apply(&mut self, command: Box<dyn EditCommand>) -> Result<()> {
        let pipeline = self.pipeline.as_mut().ok_or(PipelineError::PipelineBusy)?;
        debug!(edit = %command.text(), "Applying pipeline edit");
        self.undo_stack.push(command, pipeline)?;
        self.after_edit();
        Ok(())
    }

    pub fn undo(&mut self) -> Result<()> {
        let pipeline = self.pipeline.as_mut().ok_or(PipelineError::PipelineBusy)?;
        self.undo_stack.undo(pipeline)?;
        self.after_edit();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let pipeline = self.pipeline.as_mut().ok_or(PipelineError::PipelineBusy)?;
        self.undo_stack.redo(pipeline)?;
        self.after_edit();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.pipeline.is_some() && self.undo_stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.pipeline.is_some() && self.undo_stack.can_redo()
    }

    pub fn undo_text(&self) -> Option<String> {
        self.undo_stack.undo_text()
    }

    pub fn redo_text(&self) -> Option<String> {
        self.undo_stack.redo_text()
    }

    /// Whether there are edits since the pipeline was opened or last saved
    pub fn is_modified(&self) -> bool {
        !self.undo_stack.is_clean()
    }

    pub fn mark_saved(&mut self) {
        self.undo_stack.set_clean();
    }

    /// Write the pipeline file and mark the current state as saved
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        io::save_pipeline(self.pipeline()?, path)?;
        self.mark_saved();
        Ok(())
    }

    /// Preflight against the seed data and remember the report
    pub fn preflight(&mut self) -> Result<PreflightReport> {
        let pipeline = self.pipeline.as_mut().ok_or(PipelineError::PipelineBusy)?;
        let report = pipeline.preflight_with(&self.seed);
        self.last_preflight = Some(report.clone());
        Ok(report)
    }

    pub fn last_preflight(&self) -> Option<&PreflightReport> {
        self.last_preflight.as_ref()
    }

    /// Take the pipeline out for a run. Edits fail until it is checked back in.
    pub fn checkout(&mut self) -> Result<FilterPipeline> {
        self.pipeline.take().ok_or(PipelineError::PipelineBusy)
    }

    pub fn checkin(&mut self, pipeline: FilterPipeline) {
        self.pipeline = Some(pipeline);
    }

    /// Check the pipeline out and execute it on a worker against `data`
    pub fn spawn_run(&mut self, data: DataContainerArray) -> Result<RunHandle> {
        tokio::runtime::Handle::try_current().map_err(|e| PipelineError::Worker(e.to_string()))?;
        let pipeline = self.checkout()?;
        runner::spawn(pipeline, data)
    }

    /// Check the pipeline of a finished run back in and return its data and outcome
    pub fn finish_run(&mut self, run: CompletedRun) -> (DataContainerArray, RunOutcome) {
        self.checkin(run.pipeline);
        (run.data, run.outcome)
    }

    fn after_edit(&mut self) {
        if self.auto_preflight {
            if let Some(pipeline) = self.pipeline.as_mut() {
                self.last_preflight = Some(pipeline.preflight_with(&self.seed));
            }
        } else {
            self.last_preflight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        filters::{CreateAttributeMatrix, CreateDataContainer},
        test_helpers::{ProbeFilter, ProbeLog},
    };
    use filter_kit_common::DataArrayPath;

    #[test]
    fn test_auto_preflight_follows_edits() {
        let mut editor = PipelineEditor::new(FilterPipeline::new("Live")).with_auto_preflight(true);
        editor
            .add_filter(CreateAttributeMatrix::new(DataArrayPath::matrix("Image", "Cells"), vec![2]))
            .unwrap();
        assert_eq!(editor.last_preflight().unwrap().first_error, Some(-11001));

        let container = FilterNode::new(CreateDataContainer::new("Image"));
        editor.add_filters(vec![container], Some(0)).unwrap();
        assert!(editor.last_preflight().unwrap().is_ok());

        editor.undo().unwrap();
        assert_eq!(editor.last_preflight().unwrap().error_count, 1);
    }

    #[test]
    fn test_modified_tracking() {
        let mut editor = PipelineEditor::new(FilterPipeline::new("Saved"));
        assert!(!editor.is_modified());
        let id = editor.add_filter(CreateDataContainer::new("A")).unwrap();
        assert!(editor.is_modified());
        editor.mark_saved();
        editor.set_enabled(&[id], false).unwrap();
        assert!(editor.is_modified());
        editor.undo().unwrap();
        assert!(!editor.is_modified());
        assert_eq!(editor.redo_text().as_deref(), Some("Disable"));
    }

    #[test]
    fn test_edits_refused_while_checked_out() {
        let log = ProbeLog::default();
        let mut editor = PipelineEditor::new(FilterPipeline::new("Busy"));
        let id = editor.add_filter(ProbeFilter::new("A", &log)).unwrap();

        let pipeline = editor.checkout().unwrap();
        assert!(editor.is_checked_out());
        assert!(matches!(editor.remove_filters(&[id]), Err(PipelineError::PipelineBusy)));
        assert!(matches!(editor.undo(), Err(PipelineError::PipelineBusy)));
        assert!(matches!(editor.checkout(), Err(PipelineError::PipelineBusy)));
        assert!(!editor.can_undo());

        editor.checkin(pipeline);
        editor.remove_filters(&[id]).unwrap();
        assert!(editor.pipeline().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_run_checks_out_until_finished() {
        let log = ProbeLog::default();
        let mut editor = PipelineEditor::new(FilterPipeline::new("Run"));
        editor.add_filter(ProbeFilter::new("A", &log)).unwrap();

        let handle = editor.spawn_run(DataContainerArray::new()).unwrap();
        assert!(matches!(editor.add_filter(ProbeFilter::new("B", &log)), Err(PipelineError::PipelineBusy)));

        let run = handle.wait().await.unwrap();
        let (_, outcome) = editor.finish_run(run);
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(log.entries(), ["check:A", "execute:A"]);
        editor.add_filter(ProbeFilter::new("B", &log)).unwrap();
        assert_eq!(editor.pipeline().unwrap().len(), 2);
    }
}
