use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type. Every error aborts the enclosing statement;
/// the only error ever handled locally is `InsufficientSpace`, which the
/// insert sink recovers from by rotating to a fresh page.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupted storage: {0}")]
    CorruptedStorage(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("record of {record} bytes does not fit in {free} free bytes")]
    InsufficientSpace { record: usize, free: usize },

    #[error("row has {got} values but schema has {want} columns")]
    SchemaMismatch { want: usize, got: usize },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("table already exists: {}", .0.display())]
    TableAlreadyExists(PathBuf),

    #[error("malformed statement: {0}")]
    MalformedStatement(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
