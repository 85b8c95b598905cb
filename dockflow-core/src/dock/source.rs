//! Source Docks
//!
//! A source publishes a value to zero or more sinks. It owns the edge list,
//! kept in the order edges were established; that order is the delivery
//! order for every notification the source fires.

use indexmap::IndexSet;

use crate::dock::subscriber::{ChangedFn, InvalidatedFn, SubscriberList};
use crate::dock::{SinkId, SourceId};
use crate::graph::NodeId;
use crate::value::{Value, ValueCell, ValueType};

/// A dock that publishes values.
pub struct SourceDock {
    id: SourceId,
    owner: NodeId,
    label: String,
    pub(crate) cell: ValueCell,
    /// Connected sinks, in edge-establishment order.
    pub(crate) sinks: IndexSet<SinkId>,
    pub(crate) changed: SubscriberList<ChangedFn>,
    pub(crate) invalidated: SubscriberList<InvalidatedFn>,
}

impl SourceDock {
    pub(crate) fn new(id: SourceId, owner: NodeId, ty: ValueType, label: impl Into<String>) -> Self {
        Self {
            id,
            owner,
            label: label.into(),
            cell: ValueCell::new(ty),
            sinks: IndexSet::new(),
            changed: SubscriberList::new(),
            invalidated: SubscriberList::new(),
        }
    }

    /// This dock's id.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// The node that owns this dock.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// The type this dock was created with.
    pub fn value_type(&self) -> ValueType {
        self.cell.value_type()
    }

    /// Whether the source currently holds a valid value.
    pub fn is_valid(&self) -> bool {
        self.cell.is_valid()
    }

    /// The current value, if valid.
    pub fn value(&self) -> Option<&Value> {
        self.cell.get().ok()
    }

    /// The display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Connected sinks, in edge-establishment order.
    pub fn sinks(&self) -> impl Iterator<Item = SinkId> + '_ {
        self.sinks.iter().copied()
    }

    /// Number of connected sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}
