//! 💀 Errors: the four ways a bulk submission can go sideways before it even gets
//! the chance to partially fail.
//!
//! 🧠 Knowledge graph:
//! - `BulkError::EmptyBatch`: nothing queued. Flush-on-threshold loops match on this.
//! - `BulkError::Encoding`: an operation refused to render. Nothing was sent.
//! - `BulkError::Transport`: the round trip failed. The queue is untouched.
//! - `BulkError::Decode`: bytes came back but they were not a bulk response. Queue untouched.
//!
//! ⚠️ A failed *item* is NOT in here. Item failures are data, not errors. They live in
//! `BulkResponse::failed()`. A batch can return `Ok` with every single item on fire. 🦆

use thiserror::Error;

/// 📡 Everything that can go wrong while talking to the cluster.
///
/// Produced by [`crate::transport::Transport`] implementations and handed back to the
/// caller verbatim. The batch does not interpret it. The batch just keeps the queue.
#[derive(Debug, Error)]
pub enum TransportError {
    /// 🔌 The HTTP client could not complete the exchange (connect, timeout, TLS, DNS...).
    #[error("💀 the request never completed a round trip: {0}")]
    Request(#[from] reqwest::Error),

    /// 🚫 The cluster answered, but with a non-2xx status for the request as a whole.
    #[error("💀 the cluster answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 🧭 Base URL + path + params did not add up to a URL.
    #[error("💀 could not build a request url from '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// 🫁 gzip said no. Rare. Deeply unsettling when it happens.
    #[error("💀 failed to compress the request body: {0}")]
    Compression(#[from] std::io::Error),
}

/// 💀 The bulk error taxonomy.
#[derive(Debug, Error)]
pub enum BulkError {
    /// 🕳️ `submit` was called with zero pending operations. The transport was not called.
    #[error("💀 no bulk actions to commit: the batch is empty")]
    EmptyBatch,

    /// 🧱 An operation could not be rendered into wire lines.
    #[error("💀 failed to encode `{field}` of a bulk operation: {reason}")]
    Encoding { field: &'static str, reason: String },

    /// 📡 The network exchange failed. Pending operations are preserved.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 🧩 The response body was not a bulk response. Pending operations are preserved.
    #[error("💀 failed to decode the bulk response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl BulkError {
    pub(crate) fn encoding(field: &'static str, reason: impl ToString) -> Self {
        BulkError::Encoding {
            field,
            reason: reason.to_string(),
        }
    }
}
