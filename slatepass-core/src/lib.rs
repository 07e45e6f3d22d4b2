//! SlatePass core library
//!
//! Deterministic password derivation, a compact bit-packed record format,
//! and reconciliation of the persisted state between a local and a remote
//! store, served to a browser extension through a request/response service.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod daemon;
pub mod platform;
pub mod storage;

pub use codec::{CodecError, CodecResult, FieldType, ParamRecord, RecordField, RecordKey, RecordParams, Value};
pub use config::ServiceConfig;
pub use crypto::{
    derive, derive_random, Charset, DerivationScheme, DeriveError, DeriveResult, Derived,
    MasterSecret, RandomPassword,
};
pub use daemon::{PassService, Request, Response};
pub use platform::{ensure_data_dir, get_config_dir, get_data_dir};
pub use storage::{
    BlobStore, FileStore, MemoryStore, Reconciler, Settings, StorageBlob, StorageError,
    StorageResult, SyncOutcome,
};

use thiserror::Error;

/// Result type for SlatePass operations
pub type Result<T> = std::result::Result<T, SlatePassError>;

/// General error type for SlatePass operations
#[derive(Error, Debug)]
pub enum SlatePassError {
    #[error("Codec error: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("Derivation error: {0}")]
    Derive(#[from] crypto::DeriveError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
