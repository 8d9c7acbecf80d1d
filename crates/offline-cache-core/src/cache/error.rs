use std::path::PathBuf;

use thiserror::Error;

use crate::models::Method;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache not found: {0}")]
    UnknownCache(String),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(Method),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
