use crate::{
    editing::EditCommand,
    error::{PipelineError, Result},
    pipeline::{FilterNode, FilterPipeline},
    types::FilterId,
};

/// Take the filters with `ids` out of the pipeline, returning them with the
/// positions they occupied in ascending order.
fn take_nodes(pipeline: &mut FilterPipeline, ids: &[FilterId]) -> Result<Vec<(usize, FilterNode)>> {
    let mut positions = ids
        .iter()
        .map(|id| pipeline.position(*id).ok_or(PipelineError::FilterNotFound(*id)))
        .collect::<Result<Vec<_>>>()?;
    positions.sort_unstable();
    positions.dedup();

    let mut taken = Vec::with_capacity(positions.len());
    for &position in positions.iter().rev() {
        if let Some(node) = pipeline.remove(position) {
            taken.push((position, node));
        }
    }
    taken.reverse();
    Ok(taken)
}

/// Put back nodes taken by [`take_nodes`]. Inserting in ascending order lands
/// every node at its old position.
fn restore_nodes(pipeline: &mut FilterPipeline, nodes: Vec<(usize, FilterNode)>) -> Result<()> {
    for (position, node) in nodes {
        pipeline.insert(position, node)?;
    }
    Ok(())
}

fn describe(verb: &str, labels: &[String]) -> String {
    match labels {
        [label] => format!("{} '{}'", verb, label),
        _ => format!("{} {} filters", verb, labels.len()),
    }
}

/// Insert filters at a position, or append them
pub struct AddFiltersCommand {
    ids: Vec<FilterId>,
    labels: Vec<String>,
    position: Option<usize>,
    /// Filters waiting to be (re)inserted
    pending: Vec<FilterNode>,
}

impl AddFiltersCommand {
    pub fn new(nodes: Vec<FilterNode>, position: Option<usize>) -> Self {
        Self {
            ids: nodes.iter().map(FilterNode::id).collect(),
            labels: nodes.iter().map(|n| n.human_label().to_string()).collect(),
            position,
            pending: nodes,
        }
    }

    pub fn ids(&self) -> &[FilterId] {
        &self.ids
    }
}

impl EditCommand for AddFiltersCommand {
    fn text(&self) -> String {
        describe("Add", &self.labels)
    }

    fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        let start = self.position.unwrap_or(pipeline.len());
        if start > pipeline.len() {
            return Err(PipelineError::IndexOutOfBounds { index: start, len: pipeline.len() });
        }
        for (offset, node) in self.pending.drain(..).enumerate() {
            pipeline.insert(start + offset, node)?;
        }
        Ok(())
    }

    fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        let taken = take_nodes(pipeline, &self.ids)?;
        self.pending = taken.into_iter().map(|(_, node)| node).collect();
        Ok(())
    }
}

/// Remove filters, remembering where each one was
pub struct RemoveFiltersCommand {
    ids: Vec<FilterId>,
    labels: Vec<String>,
    removed: Vec<(usize, FilterNode)>,
}

impl RemoveFiltersCommand {
    pub fn new(pipeline: &FilterPipeline, ids: Vec<FilterId>) -> Result<Self> {
        let labels = ids
            .iter()
            .map(|id| {
                pipeline
                    .node(*id)
                    .map(|n| n.human_label().to_string())
                    .ok_or(PipelineError::FilterNotFound(*id))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ids, labels, removed: Vec::new() })
    }
}

impl EditCommand for RemoveFiltersCommand {
    fn text(&self) -> String {
        describe("Remove", &self.labels)
    }

    fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        self.removed = take_nodes(pipeline, &self.ids)?;
        Ok(())
    }

    fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        restore_nodes(pipeline, std::mem::take(&mut self.removed))
    }
}

/// Move filters so they sit together, in their current relative order,
/// starting at `destination` of the resulting list
pub struct MoveFiltersCommand {
    ids: Vec<FilterId>,
    labels: Vec<String>,
    destination: usize,
    original: Vec<(usize, FilterId)>,
}

impl MoveFiltersCommand {
    pub fn new(pipeline: &FilterPipeline, ids: Vec<FilterId>, destination: usize) -> Result<Self> {
        let labels = ids
            .iter()
            .map(|id| {
                pipeline
                    .node(*id)
                    .map(|n| n.human_label().to_string())
                    .ok_or(PipelineError::FilterNotFound(*id))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            ids,
            labels,
            destination,
            original: Vec::new(),
        })
    }
}

impl EditCommand for MoveFiltersCommand {
    fn text(&self) -> String {
        describe("Move", &self.labels)
    }

    fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        let taken = take_nodes(pipeline, &self.ids)?;
        if self.destination > pipeline.len() {
            let len = pipeline.len();
            restore_nodes(pipeline, taken)?;
            return Err(PipelineError::IndexOutOfBounds { index: self.destination, len });
        }

        self.original = taken.iter().map(|(position, node)| (*position, node.id())).collect();
        for (offset, (_, node)) in taken.into_iter().enumerate() {
            pipeline.insert(self.destination + offset, node)?;
        }
        Ok(())
    }

    fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        let ids: Vec<FilterId> = self.original.iter().map(|(_, id)| *id).collect();
        let taken = take_nodes(pipeline, &ids)?;
        let mut nodes: Vec<(usize, FilterNode)> = taken
            .into_iter()
            .map(|(_, node)| {
                let position = self
                    .original
                    .iter()
                    .find(|(_, id)| *id == node.id())
                    .map(|(position, _)| *position)
                    .unwrap_or_default();
                (position, node)
            })
            .collect();
        nodes.sort_by_key(|(position, _)| *position);
        restore_nodes(pipeline, nodes)
    }
}

/// Enable or disable filters
pub struct SetFiltersEnabledCommand {
    ids: Vec<FilterId>,
    enabled: bool,
    previous: Vec<(FilterId, bool)>,
}

impl SetFiltersEnabledCommand {
    pub fn new(ids: Vec<FilterId>, enabled: bool) -> Self {
        Self { ids, enabled, previous: Vec::new() }
    }
}

impl EditCommand for SetFiltersEnabledCommand {
    fn text(&self) -> String {
        let verb = if self.enabled { "Enable" } else { "Disable" };
        if self.ids.len() == 1 {
            verb.to_string()
        } else {
            format!("{} {} filters", verb, self.ids.len())
        }
    }

    fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        if let Some(missing) = self.ids.iter().find(|id| pipeline.node(**id).is_none()) {
            return Err(PipelineError::FilterNotFound(*missing));
        }
        self.previous.clear();
        for id in &self.ids {
            if let Some(node) = pipeline.node_mut(*id) {
                self.previous.push((*id, node.is_enabled()));
                node.set_enabled(self.enabled);
            }
        }
        Ok(())
    }

    fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        for (id, enabled) in &self.previous {
            pipeline
                .node_mut(*id)
                .ok_or(PipelineError::FilterNotFound(*id))?
                .set_enabled(*enabled);
        }
        Ok(())
    }
}

/// Remove every filter
#[derive(Default)]
pub struct ClearPipelineCommand {
    removed: Vec<FilterNode>,
}

impl ClearPipelineCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EditCommand for ClearPipelineCommand {
    fn text(&self) -> String {
        "Clear Pipeline".to_string()
    }

    fn redo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        self.removed = pipeline.clear();
        Ok(())
    }

    fn undo(&mut self, pipeline: &mut FilterPipeline) -> Result<()> {
        for node in self.removed.drain(..) {
            pipeline.push_back(node);
        }
        Ok(())
    }
}
