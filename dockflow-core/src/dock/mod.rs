//! Docks
//!
//! This module implements the typed connection points of the graph: sources,
//! sinks, and their subscription machinery.
//!
//! # Concepts
//!
//! ## Sources and Sinks
//!
//! A dock is a typed connection point owned by a node. A [`SourceDock`]
//! publishes a value to zero or more sinks; a [`SinkDock`] subscribes to at
//! most one source. Edges are directed source → sink pairs with no identity
//! of their own.
//!
//! ## Identity
//!
//! Docks live in arenas owned by the graph and are referenced everywhere by
//! small copyable ids ([`SourceId`], [`SinkId`], or the combined [`DockId`]).
//! This eliminates the mutual back-references a node editor otherwise
//! accumulates (dock ↔ node, source ↔ sink) while keeping lookups O(1).
//!
//! ## Subscriptions
//!
//! Both dock kinds carry ordered `changed`/`invalidated` callback
//! registries. Node logic subscribes to its own sinks to recompute derived
//! sources; the embedding layer subscribes to whatever it renders.

mod sink;
mod source;
pub(crate) mod subscriber;

use std::fmt;

pub use sink::SinkDock;
pub use source::SourceDock;
pub use subscriber::{ChangedFn, InvalidatedFn, SubscriptionId};

/// Unique identifier for a source dock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u32);

impl SourceId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Unique identifier for a sink dock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u32);

impl SinkId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

/// Either kind of dock.
///
/// Operations shared by both kinds (labels, subscriptions, connectivity
/// queries) take a `DockId`; both id types convert into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DockId {
    /// A source dock.
    Source(SourceId),
    /// A sink dock.
    Sink(SinkId),
}

impl From<SourceId> for DockId {
    fn from(id: SourceId) -> Self {
        Self::Source(id)
    }
}

impl From<SinkId> for DockId {
    fn from(id: SinkId) -> Self {
        Self::Sink(id)
    }
}

impl fmt::Display for DockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(id) => id.fmt(f),
            Self::Sink(id) => id.fmt(f),
        }
    }
}
