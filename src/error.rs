//! Error type shared by every part of the peer pool.

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The cluster client could not be constructed (credentials, config).
    #[error("failed to create cluster client: {0}")]
    Client(#[source] kube::Error),

    /// A list or watch request was rejected by the control plane.
    #[error("control plane request failed: {0}")]
    Api(#[from] kube::Error),

    /// The resume token is older than the control plane retains (HTTP 410).
    #[error("watch expired, re-list required: {0}")]
    Expired(String),

    /// The watch stream reported an error other than expiry.
    #[error("watch stream error: {0}")]
    Watch(String),

    #[error("timed out after {0:?} waiting for caches to sync")]
    SyncTimeout(Duration),

    #[error("unknown value for watch mechanism: {0}")]
    UnknownMechanism(String),

    #[error("object has no name, cannot compute its key")]
    MissingName,

    #[error("cannot {op} a pool in state {state}")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("failed to load configuration: {0}")]
    Config(String),
}
