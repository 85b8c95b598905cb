//! Graph Nodes
//!
//! A node is the unit across which cycle-freedom is enforced. It exclusively
//! owns a set of source and sink docks; destroying a node severs every edge
//! touching its docks before the docks are released.

use std::fmt;

use indexmap::IndexSet;

use crate::dock::{SinkId, SourceId};

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A vertex of the graph, owning a set of docks.
///
/// Docks may be added after construction and removed again at runtime:
/// variadic-input nodes grow and shrink their sink set as the user wires
/// them up.
pub struct Node {
    id: NodeId,
    title: String,
    /// Owned source docks, in creation order.
    pub(crate) sources: IndexSet<SourceId>,
    /// Owned sink docks, in creation order.
    pub(crate) sinks: IndexSet<SinkId>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            title: String::new(),
            sources: IndexSet::new(),
            sinks: IndexSet::new(),
        }
    }

    /// The node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Owned source docks, in creation order.
    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.iter().copied()
    }

    /// Owned sink docks, in creation order.
    pub fn sinks(&self) -> impl Iterator<Item = SinkId> + '_ {
        self.sinks.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dock_sets_preserve_creation_order() {
        let mut node = Node::new(NodeId::new(0));
        node.sinks.insert(SinkId::new(2));
        node.sinks.insert(SinkId::new(0));
        node.sinks.insert(SinkId::new(1));

        let order: Vec<u32> = node.sinks().map(|id| id.raw()).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn title_defaults_to_empty() {
        let mut node = Node::new(NodeId::new(3));
        assert_eq!(node.title(), "");
        node.set_title("Add");
        assert_eq!(node.title(), "Add");
    }
}
