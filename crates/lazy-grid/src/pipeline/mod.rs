//! The ordered queue of pending operations and how it is split into
//! engine calls.
//!
//! Consecutive chainable nodes are fused into one [`Group::Chain`], which
//! the executor turns into a single invocation per ensemble member.
//! Structural operators (merge, split, anomaly) always run on their own.

mod node;

pub use node::{CommandNode, Operand, Operator, Snapshot, SplitBy, TimeGroup};

use grid_engine::FileInfo;

/// Pending nodes of one dataset, in application order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    nodes: Vec<CommandNode>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, node: CommandNode) {
        self.nodes.push(node);
    }

    /// Take every pending node, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<CommandNode> {
        std::mem::take(&mut self.nodes)
    }

    pub fn nodes(&self) -> &[CommandNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Metadata the dataset will have once every pending node has run.
    pub fn project(&self, layout: Vec<FileInfo>) -> Vec<FileInfo> {
        self.nodes
            .iter()
            .fold(layout, |layout, node| node.project(layout))
    }
}

/// A unit of execution.
#[derive(Debug, Clone)]
pub enum Group {
    /// Nodes applied in one engine call per file.
    Chain(Vec<CommandNode>),
    /// A structural node with its own calling convention.
    Barrier(CommandNode),
}

/// Split nodes into execution groups. With `fuse` off every node is its
/// own group.
pub fn groups(nodes: Vec<CommandNode>, fuse: bool) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut chain: Vec<CommandNode> = Vec::new();

    for node in nodes {
        if node.is_barrier() {
            if !chain.is_empty() {
                groups.push(Group::Chain(std::mem::take(&mut chain)));
            }
            groups.push(Group::Barrier(node));
            continue;
        }
        if !chain.is_empty() && (!fuse || node.starts_chain()) {
            groups.push(Group::Chain(std::mem::take(&mut chain)));
        }
        chain.push(node);
    }

    if !chain.is_empty() {
        groups.push(Group::Chain(chain));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(op: Operator, k: f64) -> CommandNode {
        CommandNode::new(op, Operand::Scalar(k))
    }

    fn shape(groups: &[Group]) -> Vec<usize> {
        groups
            .iter()
            .map(|g| match g {
                Group::Chain(nodes) => nodes.len(),
                Group::Barrier(_) => 0,
            })
            .collect()
    }

    #[test]
    fn test_chainable_nodes_fuse() {
        let nodes = vec![
            scalar(Operator::Add, 1.0),
            scalar(Operator::Multiply, 2.0),
            CommandNode::unary(Operator::SpatialMean),
        ];
        assert_eq!(shape(&groups(nodes, true)), vec![3]);
    }

    #[test]
    fn test_fusion_disabled() {
        let nodes = vec![scalar(Operator::Add, 1.0), scalar(Operator::Multiply, 2.0)];
        assert_eq!(shape(&groups(nodes, false)), vec![1, 1]);
    }

    #[test]
    fn test_barriers_split_chains() {
        let nodes = vec![
            scalar(Operator::Add, 1.0),
            CommandNode::unary(Operator::MergeTime),
            scalar(Operator::Subtract, 1.0),
            CommandNode::unary(Operator::Split(SplitBy::Year)),
        ];
        assert_eq!(shape(&groups(nodes, true)), vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_variable_operand_starts_new_chain() {
        let nodes = vec![
            scalar(Operator::Add, 1.0),
            CommandNode::new(Operator::Multiply, Operand::VariableName("sst".into())),
            CommandNode::unary(Operator::Abs),
        ];
        assert_eq!(shape(&groups(nodes, true)), vec![1, 2]);
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut pipeline = Pipeline::new();
        pipeline.enqueue(scalar(Operator::Add, 1.0));
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline.drain().len(), 1);
        assert!(pipeline.is_empty());
    }
}
