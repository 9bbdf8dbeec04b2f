//! Error types for durable queues

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Storage does not exist and creation was disallowed
    #[error("Queue storage not found at {}", .0.display())]
    NotFound(PathBuf),

    /// A write, flush or commit failed; the affected entry may or may not be on disk
    #[error("Persistence failure: {0}")]
    Persistence(#[source] proven_store::Error),

    /// Stored bytes do not decode to the queue's value type
    #[error("Failed to decode slot {slot}: {reason}")]
    Decode { slot: u64, reason: String },

    #[error("Failed to encode value: {0}")]
    Encode(String),

    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Queue is closed")]
    AlreadyClosed,

    #[error("Clear incomplete: {}", failures.join("; "))]
    ClearIncomplete { failures: Vec<String> },
}

impl From<proven_store::Error> for Error {
    fn from(e: proven_store::Error) -> Self {
        match e {
            proven_store::Error::NotFound(path) => Error::NotFound(path),
            other => Error::Persistence(other),
        }
    }
}

impl Error {
    /// Map a codec failure hit while encoding a value for `offer`
    pub(crate) fn from_encode(e: proven_codec::Error) -> Self {
        match e {
            proven_codec::Error::PayloadTooLarge { size, limit } => {
                Error::PayloadTooLarge { size, limit }
            }
            proven_codec::Error::Encode(reason) | proven_codec::Error::Decode(reason) => {
                Error::Encode(reason)
            }
        }
    }

    /// Map a codec failure hit while decoding the entry at `slot`
    pub(crate) fn from_decode(slot: u64, e: proven_codec::Error) -> Self {
        match e {
            proven_codec::Error::Decode(reason) => Error::Decode { slot, reason },
            other => Error::Decode {
                slot,
                reason: other.to_string(),
            },
        }
    }
}
