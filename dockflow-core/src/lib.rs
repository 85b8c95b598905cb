//! Dockflow Core
//!
//! This crate provides the typed dataflow engine behind the Dockflow node
//! editor. It implements:
//!
//! - Typed docks (sources and sinks) owned by nodes
//! - Connection validation: type equality and node-level cycle prevention
//! - Synchronous propagation of value changes and invalidation
//! - Ordered, removable `changed`/`invalidated` subscriptions
//!
//! The canvas, layout, and widget layer live elsewhere; they drive this
//! engine through [`FlowGraph`] and render what it reports. The engine is
//! single-threaded: every operation runs to completion before returning,
//! and a whole cascade of dependent updates finishes inside the original
//! `set_value` call.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `value`: value types, payloads, and the validity state machine
//! - `dock`: sources, sinks, ids, and subscription machinery
//! - `graph`: nodes, the node-level connection graph, and the engine
//! - `error`: the error taxonomy surfaced by every fallible operation
//!
//! # Example
//!
//! ```rust,ignore
//! use dockflow_core::{FlowGraph, Value, ValueType};
//!
//! let mut graph = FlowGraph::new();
//!
//! let producer = graph.add_node();
//! let consumer = graph.add_node();
//! let out = graph.add_source(producer, ValueType::Int, "out")?;
//! let input = graph.add_sink(consumer, ValueType::Int, "in")?;
//!
//! graph.connect(out, input)?;
//! graph.set_value(out, Value::Int(1337))?;
//!
//! assert_eq!(graph.get_value(input)?, &Value::Int(1337));
//! ```

pub mod dock;
pub mod error;
pub mod graph;
pub mod value;

pub use dock::{ChangedFn, DockId, InvalidatedFn, SinkDock, SinkId, SourceDock, SourceId, SubscriptionId};
pub use error::FlowError;
pub use graph::{ConnectionGraph, FlowGraph, Node, NodeId};
pub use value::{OpaqueValue, Value, ValueCell, ValueType};
