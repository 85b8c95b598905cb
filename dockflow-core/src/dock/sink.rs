//! Sink Docks
//!
//! A sink accepts at most one upstream source. Its cell mirrors the last
//! notification received: a `changed` stores the delivered value, an
//! `invalidated` (or a disconnect) clears it. With no upstream the sink is
//! always invalid.

use crate::dock::subscriber::{ChangedFn, InvalidatedFn, SubscriberList};
use crate::dock::{SinkId, SourceId};
use crate::graph::NodeId;
use crate::value::{Value, ValueCell, ValueType};

/// A dock that receives values.
pub struct SinkDock {
    id: SinkId,
    owner: NodeId,
    label: String,
    pub(crate) cell: ValueCell,
    pub(crate) upstream: Option<SourceId>,
    pub(crate) changed: SubscriberList<ChangedFn>,
    pub(crate) invalidated: SubscriberList<InvalidatedFn>,
}

impl SinkDock {
    pub(crate) fn new(id: SinkId, owner: NodeId, ty: ValueType, label: impl Into<String>) -> Self {
        Self {
            id,
            owner,
            label: label.into(),
            cell: ValueCell::new(ty),
            upstream: None,
            changed: SubscriberList::new(),
            invalidated: SubscriberList::new(),
        }
    }

    /// This dock's id.
    pub fn id(&self) -> SinkId {
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

    /// Whether the sink currently mirrors a valid value.
    pub fn is_valid(&self) -> bool {
        self.cell.is_valid()
    }

    /// The mirrored value, if valid.
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

    /// The connected upstream source, if any.
    pub fn upstream(&self) -> Option<SourceId> {
        self.upstream
    }
}
