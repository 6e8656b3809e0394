//! Adapter error taxonomy.

use thiserror::Error;

/// Errors surfaced by the communication adapters.
#[derive(Debug, Error)]
pub enum CommError {
    /// All client slots are taken.
    #[error("client limit reached")]
    ClientLimit,

    /// No client with this id is connected.
    #[error("client {0} is not connected")]
    UnknownClient(usize),

    /// A transport send failed; only the affected client is impacted.
    #[error("send failed: {0}")]
    Send(String),

    /// Transport-level setup failure (bind, advertise).
    #[error("transport error: {0}")]
    Transport(String),
}
