//! Error Types
//!
//! Every fallible engine operation surfaces one of these variants
//! synchronously to its caller. Nothing is swallowed or retried inside the
//! engine, and invalidation is deliberately *not* represented here: an
//! invalid dock is a normal propagated state, and only reading from one
//! raises [`FlowError::InvalidValue`].

use thiserror::Error;

use crate::dock::DockId;
use crate::graph::NodeId;
use crate::value::ValueType;

/// Errors raised by the dataflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    /// A connection was attempted between docks of differing value types.
    ///
    /// Also raised when a value of the wrong kind is written into a typed
    /// dock. The graph is left unchanged.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The type the dock was created with.
        expected: ValueType,
        /// The type that was offered.
        got: ValueType,
    },

    /// A connection was attempted that would close a directed cycle at node
    /// granularity. The graph is left unchanged.
    #[error("connecting {source_node} to {sink_node} would close a cycle")]
    CycleDetected {
        /// Node owning the source side of the rejected edge.
        source_node: NodeId,
        /// Node owning the sink side of the rejected edge.
        sink_node: NodeId,
    },

    /// A value was read from a dock that does not currently hold one.
    #[error("no valid value available")]
    InvalidValue,

    /// A structural change (connect, disconnect, dock or node lifecycle) was
    /// attempted while a propagation is in flight.
    #[error("structural change attempted while a propagation is in flight")]
    ReentrantMutation,

    /// An operation referenced a node id that is not present in the graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// An operation referenced a dock id that is not present in the graph.
    #[error("unknown dock {0}")]
    UnknownDock(DockId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dock::SourceId;

    #[test]
    fn display_messages_name_the_offenders() {
        let err = FlowError::TypeMismatch {
            expected: ValueType::Int,
            got: ValueType::Text,
        };
        assert_eq!(err.to_string(), "type mismatch: expected int, got text");

        let err = FlowError::UnknownDock(DockId::Source(SourceId::new(7)));
        assert_eq!(err.to_string(), "unknown dock source#7");
    }
}
