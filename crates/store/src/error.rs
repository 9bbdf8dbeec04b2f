//! Error types for slot stores

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Storage at {} is already open in this process", .0.display())]
    AlreadyOpen(PathBuf),

    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("LMDB error: {0}")]
    Lmdb(#[source] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt key: {0}")]
    CorruptKey(String),

    #[error("Destroy incomplete: {}", failures.join("; "))]
    DestroyIncomplete { failures: Vec<String> },
}

impl From<heed::Error> for Error {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Io(io) => Error::Io(io),
            other => Error::Lmdb(other),
        }
    }
}
