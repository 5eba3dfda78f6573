//! Undoable edits to a pipeline.
//!
//! Every change to the filter list goes through an [`EditCommand`] pushed onto an
//! [`UndoStack`]. Commands hold the filters they take out of the pipeline, so
//! undoing a removal puts back the same filter instances with their parameters.

pub mod commands;
pub mod editor;

pub use commands::*;
pub use editor::PipelineEditor;

use crate::{
    error::{PipelineError, Result},
    pipeline::FilterPipeline,
};

/// An invertible change to a pipeline
pub trait EditCommand: Send {
    /// Text shown in "Undo ..." / "Redo ..." menu entries
    fn text(&self) -> String;

    /// Apply the change. Called once when pushed and again on every redo.
    fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()>;

    fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()>;
}

/// Linear history of applied commands
pub struct UndoStack {
    commands: Vec<Box<dyn EditCommand>>,
    /// Number of commands currently applied
    index: usize,
    /// `index` at the last save; `None` once that state can no longer be reached
    clean_index: Option<usize>,
    /// Maximum number of commands kept, 0 for no limit
    limit: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            index: 0,
            clean_index: Some(0),
            limit: 0,
        }
    }
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit, ..Self::default() }
    }

    /// Apply `command` and record it. Anything that could be redone is discarded.
    ///
    /// A command that fails to apply is not recorded.
    pub fn push(&mut self, mut command: Box<dyn EditCommand>, pipeline: &mut FilterPipeline) -> Result<()> {
        command.redo(pipeline)?;

        if self.clean_index.is_some_and(|clean| clean > self.index) {
            self.clean_index = None;
        }
        self.commands.truncate(self.index);
        self.commands.push(command);
        self.index += 1;

        if self.limit > 0 && self.commands.len() > self.limit {
            self.commands.remove(0);
            self.index -= 1;
            self.clean_index = self.clean_index.and_then(|clean| clean.checked_sub(1));
        }
        Ok(())
    }

    pub fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        if self.index == 0 {
            return Err(PipelineError::EmptyUndoStack("undo"));
        }
        self.commands[self.index - 1].undo(pipeline)?;
        self.index -= 1;
        Ok(())
    }

    pub fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        if self.index == self.commands.len() {
            return Err(PipelineError::EmptyUndoStack("redo"));
        }
        self.commands[self.index].redo(pipeline)?;
        self.index += 1;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.commands.len()
    }

    pub fn undo_text(&self) -> Option<String> {
        self.index.checked_sub(1).map(|i| self.commands[i].text())
    }

    pub fn redo_text(&self) -> Option<String> {
        self.commands.get(self.index).map(|c| c.text())
    }

    /// Whether the pipeline is in the state it had when last marked clean
    pub fn is_clean(&self) -> bool {
        self.clean_index == Some(self.index)
    }

    pub fn set_clean(&mut self) {
        self.clean_index = Some(self.index);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Forget all history. The current state becomes clean.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.index = 0;
        self.clean_index = Some(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::FilterNode,
        test_helpers::{ProbeFilter, ProbeLog},
    };

    fn labelled(pipeline: &FilterPipeline) -> Vec<String> {
        pipeline.labels()
    }

    fn probe(log: &ProbeLog, label: &str) -> FilterNode {
        FilterNode::new(ProbeFilter::new(label, log))
    }

    #[test]
    fn test_push_undo_redo() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Stack");
        let mut stack = UndoStack::new();

        stack
            .push(Box::new(AddFiltersCommand::new(vec![probe(&log, "A")], None)), &mut pipeline)
            .unwrap();
        stack
            .push(Box::new(AddFiltersCommand::new(vec![probe(&log, "B")], None)), &mut pipeline)
            .unwrap();
        assert_eq!(labelled(&pipeline), ["A", "B"]);
        assert_eq!(stack.undo_text().as_deref(), Some("Add 'B'"));

        stack.undo(&mut pipeline).unwrap();
        assert_eq!(labelled(&pipeline), ["A"]);
        assert!(stack.can_redo());
        stack.redo(&mut pipeline).unwrap();
        assert_eq!(labelled(&pipeline), ["A", "B"]);
        assert!(matches!(stack.redo(&mut pipeline), Err(PipelineError::EmptyUndoStack("redo"))));
    }

    #[test]
    fn test_push_discards_redo_tail() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Tail");
        let mut stack = UndoStack::new();
        stack
            .push(Box::new(AddFiltersCommand::new(vec![probe(&log, "A")], None)), &mut pipeline)
            .unwrap();
        stack.undo(&mut pipeline).unwrap();
        stack
            .push(Box::new(AddFiltersCommand::new(vec![probe(&log, "B")], None)), &mut pipeline)
            .unwrap();
        assert!(!stack.can_redo());
        assert_eq!(stack.len(), 1);
        assert_eq!(labelled(&pipeline), ["B"]);
    }

    #[test]
    fn test_clean_state_tracking() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Clean");
        let mut stack = UndoStack::new();
        assert!(stack.is_clean());

        stack
            .push(Box::new(AddFiltersCommand::new(vec![probe(&log, "A")], None)), &mut pipeline)
            .unwrap();
        assert!(!stack.is_clean());
        stack.set_clean();
        stack.undo(&mut pipeline).unwrap();
        assert!(!stack.is_clean());
        stack.redo(&mut pipeline).unwrap();
        assert!(stack.is_clean());

        // The saved state becomes unreachable once a different edit replaces it
        stack.undo(&mut pipeline).unwrap();
        stack
            .push(Box::new(AddFiltersCommand::new(vec![probe(&log, "B")], None)), &mut pipeline)
            .unwrap();
        stack.undo(&mut pipeline).unwrap();
        assert!(!stack.is_clean());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Limit");
        let mut stack = UndoStack::with_limit(2);
        for label in ["A", "B", "C"] {
            stack
                .push(Box::new(AddFiltersCommand::new(vec![probe(&log, label)], None)), &mut pipeline)
                .unwrap();
        }
        assert_eq!(stack.len(), 2);
        stack.undo(&mut pipeline).unwrap();
        stack.undo(&mut pipeline).unwrap();
        assert!(!stack.can_undo());
        assert_eq!(labelled(&pipeline), ["A"]);
    }

    #[test]
    fn test_failed_command_is_not_recorded() {
        let log = ProbeLog::default();
        let mut pipeline = FilterPipeline::new("Fail");
        let mut stack = UndoStack::new();
        let result = stack.push(Box::new(AddFiltersCommand::new(vec![probe(&log, "A")], Some(3))), &mut pipeline);
        assert!(matches!(result, Err(PipelineError::IndexOutOfBounds { index: 3, len: 0 })));
        assert!(stack.is_empty());
        assert!(pipeline.is_empty());
    }
}
