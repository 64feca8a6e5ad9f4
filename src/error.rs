use std::io;

use thiserror::Error;

use crate::document::NodeId;

/// Errors raised while building transform options from loose input
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown timezone: {0}")]
    UnknownZone(String),
}

/// Errors raised by document construction and JSON export
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("node {0} does not exist in this document")]
    DanglingNode(NodeId),

    #[error("node {0} is not a map")]
    NotAMap(NodeId),

    #[error("node {0} is not a sequence")]
    NotASequence(NodeId),

    /// Plain JSON has no way to express a reference back to an ancestor
    #[error("cycle through node {0} cannot be exported as JSON")]
    Cycle(NodeId),

    #[error("document nests {depth} levels deep, more than the {limit} serde can take; use write_json")]
    TooDeep { depth: usize, limit: usize },

    #[error("failed to write JSON: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DocumentError>;
