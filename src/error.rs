//! Hard failures surfaced to callers.
//!
//! Recoverable outcomes (ambiguous fragments, parse timeouts, unresolved type
//! conflicts) are returned as values next to the result instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// The filter tree nests groups deeper than the configured bound.
    #[error("filter nesting depth {depth} exceeds the maximum of {max}")]
    NestingTooDeep { depth: usize, max: usize },

    /// An external table references a connection that has no attach alias.
    #[error("table '{table}' references connection '{connection_id}' which has no attach alias")]
    UnknownConnectionAlias { table: String, connection_id: String },

    #[error("condition {id} is incomplete: {reason}")]
    InvalidCondition { id: String, reason: String },
}
