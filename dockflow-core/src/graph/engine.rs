//! The Dataflow Engine
//!
//! [`FlowGraph`] owns every node and dock in arenas keyed by small ids and
//! exposes the whole operation surface: topology edits, connection
//! management, value writes, and subscriptions.
//!
//! # How Propagation Works
//!
//! Propagation is not queued or batched:
//!
//! 1. `set_value` stores the payload, fires the source's own `changed`
//!    subscribers, then delivers to every connected sink in the order the
//!    edges were established.
//!
//! 2. Each delivery stores the value into the sink's cell and fires the
//!    sink's subscribers inline. A subscriber may itself call `set_value`
//!    on a derived source, recursing further through the graph.
//!
//! 3. Every call runs to completion before the next sink is notified, and
//!    the whole cascade completes before the original `set_value` returns.
//!
//! Because connections are validated against node-level reachability before
//! they are committed, the graph is acyclic at all times and the recursion
//! terminates: every recursive path strictly advances along arcs of a
//! finite DAG.
//!
//! # Re-entrancy
//!
//! Structural mutation (connect, disconnect, dock or node removal) from
//! inside an in-flight propagation would pull the graph out from under the
//! walk that is delivering it. The engine tracks propagation depth and
//! rejects such calls with [`FlowError::ReentrantMutation`]; value writes,
//! reads, labels, and subscriptions remain legal from inside callbacks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::dock::subscriber::{ChangedFn, InvalidatedFn};
use crate::dock::{DockId, SinkDock, SinkId, SourceDock, SourceId, SubscriptionId};
use crate::error::FlowError;
use crate::value::{Value, ValueType};

use super::connections::ConnectionGraph;
use super::node::{Node, NodeId};

/// Marks a propagation in flight for the lifetime of one delivery walk.
///
/// The depth lives in a shared cell rather than a plain field so the guard
/// restores it even if a subscriber panics mid-cascade.
struct PropagationGuard {
    depth: Rc<Cell<u32>>,
}

impl PropagationGuard {
    fn enter(depth: &Rc<Cell<u32>>) -> Self {
        depth.set(depth.get() + 1);
        Self {
            depth: Rc::clone(depth),
        }
    }
}

impl Drop for PropagationGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// A typed dataflow graph: nodes owning docks, directed source → sink
/// edges, and synchronous change propagation.
///
/// All state lives here; the rest of the crate holds ids into these arenas.
pub struct FlowGraph {
    nodes: IndexMap<NodeId, Node>,
    sources: IndexMap<SourceId, SourceDock>,
    sinks: IndexMap<SinkId, SinkDock>,
    connections: ConnectionGraph,
    next_node: u32,
    next_source: u32,
    next_sink: u32,
    next_subscription: u64,
    propagating: Rc<Cell<u32>>,
}

impl FlowGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            sources: IndexMap::new(),
            sinks: IndexMap::new(),
            connections: ConnectionGraph::new(),
            next_node: 0,
            next_source: 0,
            next_sink: 0,
            next_subscription: 0,
            propagating: Rc::new(Cell::new(0)),
        }
    }

    // ------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------

    /// Add an empty node.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Node::new(id));
        debug!(node = %id, "node added");
        id
    }

    /// Destroy a node, severing every edge touching its docks first so no
    /// other dock is ever left referencing a released one. Downstream sinks
    /// observe the severed edges as invalidations.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), FlowError> {
        self.ensure_structural()?;
        let (source_ids, sink_ids) = {
            let entry = self.nodes.get(&node).ok_or(FlowError::UnknownNode(node))?;
            (
                entry.sources.iter().copied().collect::<Vec<_>>(),
                entry.sinks.iter().copied().collect::<Vec<_>>(),
            )
        };

        for source in &source_ids {
            let fanout: Vec<SinkId> = self
                .sources
                .get(source)
                .map(|dock| dock.sinks.iter().copied().collect())
                .unwrap_or_default();
            for sink in fanout {
                self.sever(*source, sink);
            }
        }
        for sink in &sink_ids {
            if let Some(upstream) = self.sinks.get(sink).and_then(SinkDock::upstream) {
                self.sever(upstream, *sink);
            }
        }

        for source in source_ids {
            self.sources.shift_remove(&source);
        }
        for sink in sink_ids {
            self.sinks.shift_remove(&sink);
        }
        self.connections.remove_node(node);
        self.nodes.shift_remove(&node);
        debug!(%node, "node removed");
        Ok(())
    }

    /// Add a source dock to a node.
    pub fn add_source(
        &mut self,
        node: NodeId,
        ty: ValueType,
        label: impl Into<String>,
    ) -> Result<SourceId, FlowError> {
        if !self.nodes.contains_key(&node) {
            return Err(FlowError::UnknownNode(node));
        }
        let id = SourceId::new(self.next_source);
        self.next_source += 1;
        self.sources.insert(id, SourceDock::new(id, node, ty, label));
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.sources.insert(id);
        }
        debug!(%node, source = %id, %ty, "source added");
        Ok(id)
    }

    /// Add a sink dock to a node.
    pub fn add_sink(
        &mut self,
        node: NodeId,
        ty: ValueType,
        label: impl Into<String>,
    ) -> Result<SinkId, FlowError> {
        if !self.nodes.contains_key(&node) {
            return Err(FlowError::UnknownNode(node));
        }
        let id = SinkId::new(self.next_sink);
        self.next_sink += 1;
        self.sinks.insert(id, SinkDock::new(id, node, ty, label));
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.sinks.insert(id);
        }
        debug!(%node, sink = %id, %ty, "sink added");
        Ok(id)
    }

    /// Remove a source dock, disconnecting all of its sinks first.
    pub fn remove_source(&mut self, source: SourceId) -> Result<(), FlowError> {
        self.ensure_structural()?;
        let owner = self
            .sources
            .get(&source)
            .ok_or(FlowError::UnknownDock(DockId::Source(source)))?
            .owner();
        let fanout: Vec<SinkId> = self
            .sources
            .get(&source)
            .map(|dock| dock.sinks.iter().copied().collect())
            .unwrap_or_default();
        for sink in fanout {
            self.sever(source, sink);
        }
        if let Some(entry) = self.nodes.get_mut(&owner) {
            entry.sources.shift_remove(&source);
        }
        self.sources.shift_remove(&source);
        debug!(%source, "source removed");
        Ok(())
    }

    /// Remove a sink dock, disconnecting it from its upstream first.
    pub fn remove_sink(&mut self, sink: SinkId) -> Result<(), FlowError> {
        self.ensure_structural()?;
        let owner = self
            .sinks
            .get(&sink)
            .ok_or(FlowError::UnknownDock(DockId::Sink(sink)))?
            .owner();
        if let Some(upstream) = self.sinks.get(&sink).and_then(SinkDock::upstream) {
            self.sever(upstream, sink);
        }
        if let Some(entry) = self.nodes.get_mut(&owner) {
            entry.sinks.shift_remove(&sink);
        }
        self.sinks.shift_remove(&sink);
        debug!(%sink, "sink removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect a source to a sink.
    ///
    /// Validation happens before any state changes, so a rejected connect
    /// leaves no partial edge behind:
    ///
    /// - [`FlowError::TypeMismatch`] when the dock types differ.
    /// - [`FlowError::CycleDetected`] when the sink's owner can already
    ///   reach the source's owner through existing edges.
    ///
    /// Connecting an already-connected pair is a no-op. A sink holding a
    /// different upstream is re-pointed: the old edge is severed (with the
    /// usual invalidation) before the new one is committed. If the source
    /// currently holds a valid value, the new sink receives it immediately
    /// so a late joiner is not left stale.
    pub fn connect(&mut self, source: SourceId, sink: SinkId) -> Result<(), FlowError> {
        self.ensure_structural()?;
        let (source_owner, source_ty) = {
            let dock = self
                .sources
                .get(&source)
                .ok_or(FlowError::UnknownDock(DockId::Source(source)))?;
            (dock.owner(), dock.value_type())
        };
        let (sink_owner, sink_ty, current_upstream) = {
            let dock = self
                .sinks
                .get(&sink)
                .ok_or(FlowError::UnknownDock(DockId::Sink(sink)))?;
            (dock.owner(), dock.value_type(), dock.upstream())
        };

        if source_ty != sink_ty {
            return Err(FlowError::TypeMismatch {
                expected: sink_ty,
                got: source_ty,
            });
        }
        if current_upstream == Some(source) {
            return Ok(());
        }
        if self.connections.reaches(sink_owner, source_owner) {
            return Err(FlowError::CycleDetected {
                source_node: source_owner,
                sink_node: sink_owner,
            });
        }

        if let Some(previous) = current_upstream {
            self.sever(previous, sink);
        }
        if let Some(dock) = self.sources.get_mut(&source) {
            dock.sinks.insert(sink);
        }
        if let Some(dock) = self.sinks.get_mut(&sink) {
            dock.upstream = Some(source);
        }
        self.connections.record(source_owner, sink_owner);
        debug!(%source, %sink, "edge connected");

        let initial = self.sources.get(&source).and_then(|dock| dock.value().cloned());
        if let Some(value) = initial {
            let _guard = PropagationGuard::enter(&self.propagating);
            self.deliver_changed(sink, &value);
        }
        Ok(())
    }

    /// Disconnect a source from a sink. The detached sink transitions to
    /// invalid and its `invalidated` subscribers fire; a disconnected sink
    /// never keeps reporting a stale last-known value. Disconnecting a pair
    /// that is not connected is a no-op.
    pub fn disconnect(&mut self, source: SourceId, sink: SinkId) -> Result<(), FlowError> {
        self.ensure_structural()?;
        if !self.sources.contains_key(&source) {
            return Err(FlowError::UnknownDock(DockId::Source(source)));
        }
        let upstream = self
            .sinks
            .get(&sink)
            .ok_or(FlowError::UnknownDock(DockId::Sink(sink)))?
            .upstream();
        if upstream == Some(source) {
            self.sever(source, sink);
        }
        Ok(())
    }

    /// Disconnect a sink from whatever source feeds it. No-op when already
    /// disconnected.
    pub fn unset_source(&mut self, sink: SinkId) -> Result<(), FlowError> {
        self.ensure_structural()?;
        let upstream = self
            .sinks
            .get(&sink)
            .ok_or(FlowError::UnknownDock(DockId::Sink(sink)))?
            .upstream();
        if let Some(source) = upstream {
            self.sever(source, sink);
        }
        Ok(())
    }

    /// Whether a live edge exists between two docks, checked symmetrically:
    /// the answer is the same whichever side the question is asked from.
    /// Two docks of the same kind are never connected.
    pub fn connected(
        &self,
        a: impl Into<DockId>,
        b: impl Into<DockId>,
    ) -> Result<bool, FlowError> {
        let a = a.into();
        let b = b.into();
        self.ensure_dock(a)?;
        self.ensure_dock(b)?;
        Ok(match (a, b) {
            (DockId::Source(source), DockId::Sink(sink))
            | (DockId::Sink(sink), DockId::Source(source)) => self
                .sources
                .get(&source)
                .map_or(false, |dock| dock.sinks.contains(&sink)),
            _ => false,
        })
    }

    // ------------------------------------------------------------------
    // Values and propagation
    // ------------------------------------------------------------------

    /// Store a value into a source and propagate it.
    ///
    /// Fires the source's own `changed` subscribers, then delivers to every
    /// connected sink in edge-establishment order. Each delivery runs to
    /// completion, including any cascading writes the sink's node logic
    /// performs, before the next sink is notified.
    pub fn set_value(
        &mut self,
        source: SourceId,
        value: impl Into<Value>,
    ) -> Result<(), FlowError> {
        let value = value.into();
        let dock = self
            .sources
            .get_mut(&source)
            .ok_or(FlowError::UnknownDock(DockId::Source(source)))?;
        dock.cell.set(value.clone())?;
        let fanout: Vec<SinkId> = dock.sinks.iter().copied().collect();
        trace!(%source, fanout = fanout.len(), "value set");

        let _guard = PropagationGuard::enter(&self.propagating);
        self.fire_changed(DockId::Source(source), &value);
        for sink in fanout {
            self.deliver_changed(sink, &value);
        }
        Ok(())
    }

    /// Invalidate a source and propagate the invalidation along its edges
    /// in order. Invalidating an already-invalid source is a silent no-op.
    pub fn invalidate(&mut self, source: SourceId) -> Result<(), FlowError> {
        let dock = self
            .sources
            .get_mut(&source)
            .ok_or(FlowError::UnknownDock(DockId::Source(source)))?;
        if !dock.cell.invalidate() {
            return Ok(());
        }
        let fanout: Vec<SinkId> = dock.sinks.iter().copied().collect();
        trace!(%source, fanout = fanout.len(), "source invalidated");

        let _guard = PropagationGuard::enter(&self.propagating);
        self.fire_invalidated(DockId::Source(source));
        for sink in fanout {
            self.deliver_invalidated(sink);
        }
        Ok(())
    }

    /// The value a sink currently mirrors.
    ///
    /// Fails with [`FlowError::InvalidValue`] when the sink has no
    /// upstream, the upstream never propagated, or the last propagation was
    /// an invalidation.
    pub fn get_value(&self, sink: SinkId) -> Result<&Value, FlowError> {
        self.sinks
            .get(&sink)
            .ok_or(FlowError::UnknownDock(DockId::Sink(sink)))?
            .cell
            .get()
    }

    /// The value a source currently publishes.
    pub fn source_value(&self, source: SourceId) -> Result<&Value, FlowError> {
        self.sources
            .get(&source)
            .ok_or(FlowError::UnknownDock(DockId::Source(source)))?
            .cell
            .get()
    }

    /// Whether a dock currently holds a valid value.
    pub fn is_valid(&self, dock: impl Into<DockId>) -> Result<bool, FlowError> {
        let dock = dock.into();
        match dock {
            DockId::Source(id) => self
                .sources
                .get(&id)
                .map(SourceDock::is_valid)
                .ok_or(FlowError::UnknownDock(dock)),
            DockId::Sink(id) => self
                .sinks
                .get(&id)
                .map(SinkDock::is_valid)
                .ok_or(FlowError::UnknownDock(dock)),
        }
    }

    // ------------------------------------------------------------------
    // Metadata and subscriptions
    // ------------------------------------------------------------------

    /// A dock's display label.
    pub fn label(&self, dock: impl Into<DockId>) -> Result<&str, FlowError> {
        let dock = dock.into();
        match dock {
            DockId::Source(id) => self
                .sources
                .get(&id)
                .map(SourceDock::label)
                .ok_or(FlowError::UnknownDock(dock)),
            DockId::Sink(id) => self
                .sinks
                .get(&id)
                .map(SinkDock::label)
                .ok_or(FlowError::UnknownDock(dock)),
        }
    }

    /// Set a dock's display label. Pure metadata, no propagation effect.
    pub fn set_label(
        &mut self,
        dock: impl Into<DockId>,
        label: impl Into<String>,
    ) -> Result<(), FlowError> {
        let dock = dock.into();
        match dock {
            DockId::Source(id) => {
                self.sources
                    .get_mut(&id)
                    .ok_or(FlowError::UnknownDock(dock))?
                    .set_label(label);
            }
            DockId::Sink(id) => {
                self.sinks
                    .get_mut(&id)
                    .ok_or(FlowError::UnknownDock(dock))?
                    .set_label(label);
            }
        }
        Ok(())
    }

    /// A node's display title.
    pub fn node_title(&self, node: NodeId) -> Result<&str, FlowError> {
        self.nodes
            .get(&node)
            .map(Node::title)
            .ok_or(FlowError::UnknownNode(node))
    }

    /// Set a node's display title.
    pub fn set_node_title(
        &mut self,
        node: NodeId,
        title: impl Into<String>,
    ) -> Result<(), FlowError> {
        self.nodes
            .get_mut(&node)
            .ok_or(FlowError::UnknownNode(node))?
            .set_title(title);
        Ok(())
    }

    /// Register a `changed` observer on a dock. Observers fire in
    /// registration order.
    pub fn on_changed<F>(
        &mut self,
        dock: impl Into<DockId>,
        callback: F,
    ) -> Result<SubscriptionId, FlowError>
    where
        F: FnMut(&mut FlowGraph, DockId, &Value) + 'static,
    {
        let dock = dock.into();
        self.ensure_dock(dock)?;
        let id = SubscriptionId::new(self.next_subscription);
        self.next_subscription += 1;
        let callback: Rc<RefCell<ChangedFn>> = Rc::new(RefCell::new(callback));
        match dock {
            DockId::Source(source) => {
                if let Some(entry) = self.sources.get_mut(&source) {
                    entry.changed.insert(id, callback);
                }
            }
            DockId::Sink(sink) => {
                if let Some(entry) = self.sinks.get_mut(&sink) {
                    entry.changed.insert(id, callback);
                }
            }
        }
        Ok(id)
    }

    /// Register an `invalidated` observer on a dock.
    pub fn on_invalidated<F>(
        &mut self,
        dock: impl Into<DockId>,
        callback: F,
    ) -> Result<SubscriptionId, FlowError>
    where
        F: FnMut(&mut FlowGraph, DockId) + 'static,
    {
        let dock = dock.into();
        self.ensure_dock(dock)?;
        let id = SubscriptionId::new(self.next_subscription);
        self.next_subscription += 1;
        let callback: Rc<RefCell<InvalidatedFn>> = Rc::new(RefCell::new(callback));
        match dock {
            DockId::Source(source) => {
                if let Some(entry) = self.sources.get_mut(&source) {
                    entry.invalidated.insert(id, callback);
                }
            }
            DockId::Sink(sink) => {
                if let Some(entry) = self.sinks.get_mut(&sink) {
                    entry.invalidated.insert(id, callback);
                }
            }
        }
        Ok(id)
    }

    /// Detach an observer so it is never invoked into destroyed state.
    /// Detaching an already-removed subscription is a no-op.
    pub fn unsubscribe(
        &mut self,
        dock: impl Into<DockId>,
        subscription: SubscriptionId,
    ) -> Result<(), FlowError> {
        let dock = dock.into();
        match dock {
            DockId::Source(id) => {
                let entry = self
                    .sources
                    .get_mut(&id)
                    .ok_or(FlowError::UnknownDock(dock))?;
                if !entry.changed.remove(subscription) {
                    entry.invalidated.remove(subscription);
                }
            }
            DockId::Sink(id) => {
                let entry = self
                    .sinks
                    .get_mut(&id)
                    .ok_or(FlowError::UnknownDock(dock))?;
                if !entry.changed.remove(subscription) {
                    entry.invalidated.remove(subscription);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Read access to a node.
    pub fn node(&self, id: NodeId) -> Result<&Node, FlowError> {
        self.nodes.get(&id).ok_or(FlowError::UnknownNode(id))
    }

    /// Read access to a source dock.
    pub fn source(&self, id: SourceId) -> Result<&SourceDock, FlowError> {
        self.sources
            .get(&id)
            .ok_or(FlowError::UnknownDock(DockId::Source(id)))
    }

    /// Read access to a sink dock.
    pub fn sink(&self, id: SinkId) -> Result<&SinkDock, FlowError> {
        self.sinks
            .get(&id)
            .ok_or(FlowError::UnknownDock(DockId::Sink(id)))
    }

    /// The node owning a dock.
    pub fn dock_owner(&self, dock: impl Into<DockId>) -> Result<NodeId, FlowError> {
        let dock = dock.into();
        match dock {
            DockId::Source(id) => self
                .sources
                .get(&id)
                .map(SourceDock::owner)
                .ok_or(FlowError::UnknownDock(dock)),
            DockId::Sink(id) => self
                .sinks
                .get(&id)
                .map(SinkDock::owner)
                .ok_or(FlowError::UnknownDock(dock)),
        }
    }

    /// The type a dock was created with.
    pub fn dock_type(&self, dock: impl Into<DockId>) -> Result<ValueType, FlowError> {
        let dock = dock.into();
        match dock {
            DockId::Source(id) => self
                .sources
                .get(&id)
                .map(SourceDock::value_type)
                .ok_or(FlowError::UnknownDock(dock)),
            DockId::Sink(id) => self
                .sinks
                .get(&id)
                .map(SinkDock::value_type)
                .ok_or(FlowError::UnknownDock(dock)),
        }
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_structural(&self) -> Result<(), FlowError> {
        if self.propagating.get() > 0 {
            return Err(FlowError::ReentrantMutation);
        }
        Ok(())
    }

    fn ensure_dock(&self, dock: DockId) -> Result<(), FlowError> {
        let known = match dock {
            DockId::Source(id) => self.sources.contains_key(&id),
            DockId::Sink(id) => self.sinks.contains_key(&id),
        };
        if known {
            Ok(())
        } else {
            Err(FlowError::UnknownDock(dock))
        }
    }

    /// Remove one committed edge from both sides and invalidate the
    /// detached sink. Callers have already passed the structural check; the
    /// invalidation itself runs under a propagation guard.
    fn sever(&mut self, source: SourceId, sink: SinkId) {
        let removed = self
            .sources
            .get_mut(&source)
            .map_or(false, |dock| dock.sinks.shift_remove(&sink));
        if !removed {
            return;
        }
        let source_owner = self.sources.get(&source).map(SourceDock::owner);
        let sink_owner = self.sinks.get(&sink).map(SinkDock::owner);
        if let Some(dock) = self.sinks.get_mut(&sink) {
            dock.upstream = None;
        }
        if let (Some(from), Some(to)) = (source_owner, sink_owner) {
            self.connections.release(from, to);
        }
        debug!(%source, %sink, "edge disconnected");

        let _guard = PropagationGuard::enter(&self.propagating);
        self.deliver_invalidated(sink);
    }

    /// Store a delivered value into a sink and fire its subscribers.
    fn deliver_changed(&mut self, sink: SinkId, value: &Value) {
        let Some(dock) = self.sinks.get_mut(&sink) else {
            return;
        };
        dock.cell.store(value.clone());
        trace!(%sink, "changed delivered");
        self.fire_changed(DockId::Sink(sink), value);
    }

    /// Clear a sink's mirrored value and fire its subscribers. A sink that
    /// was already invalid fires nothing.
    fn deliver_invalidated(&mut self, sink: SinkId) {
        let was_valid = self
            .sinks
            .get_mut(&sink)
            .map_or(false, |dock| dock.cell.invalidate());
        if was_valid {
            trace!(%sink, "invalidated delivered");
            self.fire_invalidated(DockId::Sink(sink));
        }
    }

    fn fire_changed(&mut self, dock: DockId, value: &Value) {
        let callbacks = match dock {
            DockId::Source(id) => self.sources.get(&id).map(|d| d.changed.snapshot()),
            DockId::Sink(id) => self.sinks.get(&id).map(|d| d.changed.snapshot()),
        };
        let Some(callbacks) = callbacks else {
            return;
        };
        for callback in callbacks {
            // A handler that re-enters its own dock's notification would
            // re-borrow itself; the RefCell turns that into a panic instead
            // of unbounded recursion.
            (&mut *callback.borrow_mut())(self, dock, value);
        }
    }

    fn fire_invalidated(&mut self, dock: DockId) {
        let callbacks = match dock {
            DockId::Source(id) => self.sources.get(&id).map(|d| d.invalidated.snapshot()),
            DockId::Sink(id) => self.sinks.get(&id).map(|d| d.invalidated.snapshot()),
        };
        let Some(callbacks) = callbacks else {
            return;
        };
        for callback in callbacks {
            (&mut *callback.borrow_mut())(self, dock);
        }
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
