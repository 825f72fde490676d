use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The control plane could not be reached or rejected the credentials.
    #[error("cannot connect to cluster {cluster}: {reason}")]
    Connection { cluster: String, reason: String },

    /// Node listing failed, so no snapshot can be built.
    #[error("cannot list nodes of cluster {cluster}: {reason}")]
    List { cluster: String, reason: String },

    /// One node's pods or one entity's events could not be fetched.
    #[error("partial fetch failure for {entity}: {reason}")]
    PartialFetch { entity: String, reason: String },

    #[error("cannot aggregate resources of {subject}: {reason}")]
    ResourceAggregation { subject: String, reason: String },

    #[error("history store error: {0}")]
    Store(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}
