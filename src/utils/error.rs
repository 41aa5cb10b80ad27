//! The `error` module defines the error types used within `livefeed`.
//!
//! None of these ever reach a write-path caller: the hub and the scheduler
//! log them and clean up locally. They exist so each failure site can say
//! precisely what went wrong.

use thiserror::Error;

use crate::hub::{ConnectionId, TopicId};

/// Failures raised by the snapshot store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("stored record could not be decoded: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures inside the topic broadcast hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// The topic id was missing or not a positive integer.
    #[error("invalid topic id: {0:?}")]
    InvalidTopic(String),

    /// A single subscriber could not be reached. Isolated to that connection.
    #[error("failed to send to connection {connection_id}")]
    SendFailure { connection_id: ConnectionId },

    #[error("failed to fetch snapshot for topic {topic_id}: {source}")]
    SnapshotFetch {
        topic_id: TopicId,
        #[source]
        source: StoreError,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Credential verification failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token has no subject")]
    MissingSubject,
}

/// Failure of one refresh job run.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("derived view rebuild failed: {0}")]
    Rebuild(#[from] StoreError),
}
