//! Persistent state and its reconciliation.
//!
//! State lives in two [`StorageBlob`]s, one local and one remote, each with
//! four text slots (`s` settings, `u` UI state, `h` history, `t` timestamp).
//! The copy with the newer timestamp wins as a whole; slots are never merged.

pub mod backend;
pub mod conflict;
pub mod history;
pub mod reconciler;
pub mod settings;

pub use backend::{BlobStore, FileStore, MemoryStore};
pub use conflict::{ConflictResolver, Resolution};
pub use history::History;
pub use reconciler::{LoadReport, Reconciler, SyncOutcome};
pub use settings::{SettingField, SettingKey, Settings};

use crate::codec::{pack, unpack, CodecError, FieldType, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading or writing state
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::StorageUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
/// Alias used by callers outside this module
pub type StorageResult<T> = Result<T>;

/// One copy of the persisted state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBlob {
    #[serde(rename = "s", default)]
    pub settings: String,
    #[serde(rename = "u", default)]
    pub ui_state: String,
    /// Comma-joined packed records, most recent first
    #[serde(rename = "h", default)]
    pub history: String,
    #[serde(rename = "t", default)]
    pub timestamp: String,
}

impl StorageBlob {
    /// Decoded timestamp slot; absent or corrupt reads as 0
    pub fn timestamp_ms(&self) -> i64 {
        unpack_timestamp(&self.timestamp)
    }

    /// Apply the slots present in `patch`
    pub fn apply(&mut self, patch: &BlobPatch) {
        if let Some(s) = &patch.settings {
            self.settings = s.clone();
        }
        if let Some(u) = &patch.ui_state {
            self.ui_state = u.clone();
        }
        if let Some(h) = &patch.history {
            self.history = h.clone();
        }
        if let Some(t) = &patch.timestamp {
            self.timestamp = t.clone();
        }
    }
}

/// A partial write: only `Some` slots are stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobPatch {
    pub settings: Option<String>,
    pub ui_state: Option<String>,
    pub history: Option<String>,
    pub timestamp: Option<String>,
}

impl BlobPatch {
    /// Patch that writes every slot of `blob`
    pub fn full(blob: &StorageBlob) -> Self {
        Self {
            settings: Some(blob.settings.clone()),
            ui_state: Some(blob.ui_state.clone()),
            history: Some(blob.history.clone()),
            timestamp: Some(blob.timestamp.clone()),
        }
    }

    /// Slots of `current` that differ from `snapshot`
    pub fn diff(current: &StorageBlob, snapshot: &StorageBlob) -> Self {
        let changed = |a: &String, b: &String| (a != b).then(|| a.clone());
        Self {
            settings: changed(&current.settings, &snapshot.settings),
            ui_state: changed(&current.ui_state, &snapshot.ui_state),
            history: changed(&current.history, &snapshot.history),
            timestamp: changed(&current.timestamp, &snapshot.timestamp),
        }
    }

    /// Fold a later patch into this one
    pub fn merge(&mut self, later: BlobPatch) {
        if later.settings.is_some() {
            self.settings = later.settings;
        }
        if later.ui_state.is_some() {
            self.ui_state = later.ui_state;
        }
        if later.history.is_some() {
            self.history = later.history;
        }
        if later.timestamp.is_some() {
            self.timestamp = later.timestamp;
        }
    }

    pub fn slot_count(&self) -> usize {
        [
            self.settings.is_some(),
            self.ui_state.is_some(),
            self.history.is_some(),
            self.timestamp.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_count() == 0
    }
}

/// Pack a millisecond timestamp for the `t` slot
pub fn pack_timestamp(timestamp_ms: i64) -> Result<String> {
    Ok(pack(
        &[FieldType::Timestamp],
        &[Value::Timestamp(timestamp_ms)],
    )?)
}

/// Decode the `t` slot. Empty or undecodable text reads as 0.
pub fn unpack_timestamp(packed: &str) -> i64 {
    if packed.is_empty() {
        return 0;
    }
    unpack(&[FieldType::Timestamp], packed)
        .ok()
        .and_then(|values| values.first().and_then(Value::as_i64))
        .unwrap_or(0)
}
