use crate::jvm::code::{Edge, EdgeInfo, Label, LabelFlags, LabelGenerator, LabelId};
use crate::jvm::Error;

/// Labels of one method body and the control flow between their blocks
///
/// Every label of the method lives here, whether it ends up starting a basic block or not. A
/// label is only a block if it appears in the block order, which is the order in which blocks
/// were placed in the bytecode.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    labels: Vec<Label>,

    /// Basic blocks in placement order (elements are unique)
    block_order: Vec<LabelId>,
}

impl ControlFlowGraph {
    pub fn new() -> ControlFlowGraph {
        ControlFlowGraph {
            labels: vec![],
            block_order: vec![],
        }
    }

    pub fn label(&self, label: LabelId) -> &Label {
        &self.labels[label.index()]
    }

    pub fn label_mut(&mut self, label: LabelId) -> &mut Label {
        &mut self.labels[label.index()]
    }

    /// All labels, in creation order
    pub fn labels(&self) -> impl Iterator<Item = &Label> + '_ {
        self.labels.iter()
    }

    /// Basic blocks, in placement order
    pub fn blocks(&self) -> &[LabelId] {
        &self.block_order
    }

    pub fn first_block(&self) -> Option<LabelId> {
        self.block_order.first().copied()
    }

    /// Record that a basic block starts at `label` (after every block recorded so far)
    pub fn push_block(&mut self, label: LabelId) {
        self.block_order.push(label);
    }

    /// Outgoing edges of a block, most recently added first
    pub fn successors(&self, block: LabelId) -> impl ExactSizeIterator<Item = &Edge> + '_ {
        self.label(block).outgoing_edges()
    }

    /// Add an edge in front of the existing outgoing edges of `from`
    ///
    /// Edge order is part of the contract of a block: when a block ends in `jsr`, the jump to the
    /// subroutine must be added before the edge to the instruction after the `jsr`.
    pub fn add_edge(&mut self, from: LabelId, to: LabelId, info: EdgeInfo) {
        self.label_mut(from).outgoing_edges_mut().push_front(Edge {
            info,
            successor: to,
        });
    }

    /// Add an edge from `from` to the exception handler at `handler`
    ///
    /// Blocks ending in `jsr` get the edge after their two call edges, so that the continuation
    /// and subroutine entry stay first and second.
    pub fn add_exception_edge(&mut self, from: LabelId, handler: LabelId) -> Result<(), Error> {
        let label = self.label_mut(from);
        if label.flags.contains(LabelFlags::SUBROUTINE_CALLER) {
            let edges = label.outgoing_edges_mut();
            if edges.len() < 2 {
                return Err(Error::MalformedSubroutineGraph {
                    block: from,
                    outgoing_edges: edges.len(),
                });
            }
            edges.insert(2, Edge::exception(handler));
        } else {
            label.outgoing_edges_mut().push_front(Edge::exception(handler));
        }
        Ok(())
    }
}

impl LabelGenerator<LabelId> for ControlFlowGraph {
    fn fresh_label(&mut self) -> LabelId {
        let label = match self.labels.last() {
            None => LabelId::START,
            Some(last) => last.id().next(),
        };
        self.labels.push(Label::new(label));
        label
    }
}
