//! Owner of the in-memory state and its two persisted copies.
//!
//! Every mutation rewrites the local store at once with a fresh timestamp.
//! The remote store only changes during [`Reconciler::sync_pass`], which
//! pushes the slots that differ from the last known remote snapshot.

use super::{
    pack_timestamp, BlobPatch, BlobStore, ConflictResolver, History, Resolution, Result,
    SettingField, Settings, StorageBlob,
};
use crate::codec::{ParamRecord, RecordField, RecordKey, RecordParams};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What [`Reconciler::load`] found and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub resolution: Resolution,
    pub local_timestamp: i64,
    pub remote_timestamp: i64,
    /// History entries dropped because they failed to decode
    pub skipped_history: usize,
    /// Remote content was copied into local
    pub copied_remote: bool,
    /// Remote was cleared because cloud sync is off
    pub cleared_remote: bool,
}

/// Result of one periodic reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Differing slots were written to remote
    Pushed { slots: usize },
    /// Remote already matched local
    UpToDate,
    /// Cloud sync is turned off
    Disabled,
    /// Remote rejected the write; retried next pass
    Deferred,
}

pub struct Reconciler {
    local: Arc<dyn BlobStore>,
    remote: Arc<dyn BlobStore>,
    settings: Settings,
    ui_state: ParamRecord,
    history: History,
    /// What local holds, or will hold once `pending_local` lands
    local_data: StorageBlob,
    /// What remote held after the last successful exchange
    remote_snapshot: StorageBlob,
    pending_local: Option<BlobPatch>,
    last_timestamp: i64,
}

impl Reconciler {
    /// Read both stores and adopt the newer one.
    ///
    /// Unreadable stores count as empty. Only codec failures while writing
    /// back are returned as errors.
    pub fn load(local: Arc<dyn BlobStore>, remote: Arc<dyn BlobStore>) -> Result<(Self, LoadReport)> {
        let local_blob = read_or_empty(local.as_ref(), "local");
        let remote_blob = read_or_empty(remote.as_ref(), "remote");

        let local_timestamp = local_blob.timestamp_ms();
        let remote_timestamp = remote_blob.timestamp_ms();
        let resolution = ConflictResolver::resolve(local_timestamp, remote_timestamp);

        let settings = Settings::default();
        let mut reconciler = Self {
            local,
            remote,
            history: History::new(settings.history_cap()),
            settings,
            ui_state: ParamRecord::with_defaults()?,
            local_data: if local_timestamp > 0 { local_blob.clone() } else { StorageBlob::default() },
            remote_snapshot: if remote_timestamp > 0 { remote_blob.clone() } else { StorageBlob::default() },
            pending_local: None,
            last_timestamp: local_timestamp.max(remote_timestamp),
        };

        let adopted = match resolution {
            Resolution::KeepLocal => &local_blob,
            Resolution::AcceptRemote => &remote_blob,
        };
        let skipped_history = reconciler.adopt(adopted);

        let mut report = LoadReport {
            resolution,
            local_timestamp,
            remote_timestamp,
            skipped_history,
            copied_remote: false,
            cleared_remote: false,
        };

        if resolution == Resolution::AcceptRemote {
            if reconciler.settings.cloud_sync {
                reconciler.local_data = remote_blob.clone();
                reconciler.write_local(BlobPatch::full(&remote_blob));
            } else {
                reconciler.save_all()?;
                match reconciler.remote.clear() {
                    Ok(()) => {
                        reconciler.remote_snapshot = StorageBlob::default();
                        report.cleared_remote = true;
                    }
                    Err(e) => warn!("Failed to clear remote store: {}", e),
                }
            }
            report.copied_remote = true;
        }

        info!(
            "Loaded storage: {:?} (local {} / remote {}), {} history entries",
            resolution,
            local_timestamp,
            remote_timestamp,
            reconciler.history.len()
        );

        Ok((reconciler, report))
    }

    fn adopt(&mut self, blob: &StorageBlob) -> usize {
        if !blob.settings.is_empty() {
            match Settings::unpack(&blob.settings) {
                Ok(settings) => self.settings = settings,
                Err(e) => warn!("Ignoring unreadable settings: {}", e),
            }
        }
        if let Err(e) = self.ui_state.unpack_into(&blob.ui_state) {
            warn!("Ignoring unreadable UI state: {}", e);
        }
        let (history, skipped) = History::load(&blob.history, self.settings.history_cap());
        self.history = history;
        skipped
    }

    /// Next local timestamp; never repeats and never goes backwards
    fn next_timestamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn write_local(&mut self, patch: BlobPatch) {
        let patch = match self.pending_local.take() {
            Some(mut pending) => {
                pending.merge(patch);
                pending
            }
            None => patch,
        };

        if let Err(e) = self.local.write(&patch) {
            warn!("Local store write failed, will retry: {}", e);
            self.pending_local = Some(patch);
        }
    }

    fn persist(&mut self, mut patch: BlobPatch) -> Result<()> {
        patch.timestamp = Some(pack_timestamp(self.next_timestamp())?);
        self.local_data.apply(&patch);
        self.write_local(patch);
        Ok(())
    }

    /// UI state as persisted in the `u` slot.
    ///
    /// Parameters fall back to defaults unless they are remembered, and the
    /// master secret is blanked unless it is remembered.
    pub fn pack_ui_state(&self) -> Result<String> {
        let current = self.ui_state.params();
        let mut stored = current.clone();

        if !self.settings.remember_last_parameters {
            let defaults = RecordParams::defaults_at(current.timestamp);
            stored = RecordParams {
                pw: stored.pw,
                ..defaults
            };
        }
        if !self.settings.remember_master_password {
            stored.pw.clear();
        }

        Ok(ParamRecord::new(stored)?.packed_string())
    }

    /// Rewrite the settings and UI state slots
    pub fn save_settings(&mut self) -> Result<()> {
        let patch = BlobPatch {
            settings: Some(self.settings.pack()?),
            ui_state: Some(self.pack_ui_state()?),
            ..Default::default()
        };
        self.persist(patch)
    }

    /// Rewrite the history slot
    pub fn save_history(&mut self) -> Result<()> {
        let patch = BlobPatch {
            history: Some(self.history.pack()),
            ..Default::default()
        };
        self.persist(patch)
    }

    fn save_all(&mut self) -> Result<()> {
        let patch = BlobPatch {
            settings: Some(self.settings.pack()?),
            ui_state: Some(self.pack_ui_state()?),
            history: Some(self.history.pack()),
            timestamp: None,
        };
        self.persist(patch)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_setting(&mut self, field: SettingField) -> Result<()> {
        self.settings.set(field);
        if self.history.set_cap(self.settings.history_cap()) {
            self.save_history()?;
        }
        self.save_settings()
    }

    pub fn ui_state(&self) -> &RecordParams {
        self.ui_state.params()
    }

    pub fn ui_field(&self, key: RecordKey) -> RecordField {
        self.ui_state.params().field(key)
    }

    pub fn set_ui_field(&mut self, field: RecordField) -> Result<()> {
        self.ui_state.set(field)?;
        self.save_settings()
    }

    /// Put one UI field back to its default value
    pub fn reset_ui_field(&mut self, key: RecordKey) -> Result<()> {
        let default = RecordParams::defaults_at(0).field(key);
        self.set_ui_field(default)
    }

    pub fn clear_ui_state(&mut self) -> Result<()> {
        self.ui_state = ParamRecord::with_defaults()?;
        self.save_settings()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Returns whether an entry was removed
    pub fn delete_history(&mut self, index: usize, timestamp: Option<i64>) -> Result<bool> {
        if self.history.delete(index, timestamp).is_none() {
            return Ok(false);
        }
        self.save_history()?;
        Ok(true)
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        self.save_history()
    }

    /// Apply the first history entry with this salt to the UI state
    pub fn search_history(&mut self, salt: &str) -> Result<bool> {
        let Some(found) = self.history.find_by_salt(salt).map(|r| r.params().clone()) else {
            return Ok(false);
        };
        self.ui_state.apply_params(&found)?;
        self.save_settings()?;
        Ok(true)
    }

    /// Add a history entry for a human-triggered generation.
    ///
    /// Returns whether an entry was added. Nothing is added when neither the
    /// parameters nor passwords of this kind are remembered.
    pub fn record_generation(&mut self, params: &RecordParams, password: &str, random: bool) -> Result<bool> {
        let remember_password = if random {
            self.settings.remember_random_into_history
        } else {
            self.settings.remember_fixed_into_history
        };
        let remember_parameters = self.settings.remember_parameters_into_history;
        if !remember_password && !remember_parameters {
            return Ok(false);
        }

        let timestamp = self.next_timestamp();
        let mut record = ParamRecord::new(RecordParams::defaults_at(timestamp))?;
        if remember_parameters {
            record.apply_params(params)?;
        }
        if remember_password {
            record.set(RecordField::Pw(password.to_string()))?;
        }

        self.history.add(record);
        self.save_history()?;
        Ok(true)
    }

    /// Retry pending local writes, then push differing slots to remote
    pub fn sync_pass(&mut self) -> SyncOutcome {
        if let Some(pending) = self.pending_local.take() {
            match self.local.write(&pending) {
                Ok(()) => debug!("Pending local write landed"),
                Err(e) => {
                    warn!("Local store still unavailable: {}", e);
                    self.pending_local = Some(pending);
                }
            }
        }

        if !self.settings.cloud_sync {
            return SyncOutcome::Disabled;
        }

        let patch = BlobPatch::diff(&self.local_data, &self.remote_snapshot);
        if patch.is_empty() {
            debug!("Remote store up to date");
            return SyncOutcome::UpToDate;
        }

        match self.remote.write(&patch) {
            Ok(()) => {
                self.remote_snapshot = self.local_data.clone();
                let slots = patch.slot_count();
                debug!("Pushed {} slots to remote store", slots);
                SyncOutcome::Pushed { slots }
            }
            Err(e) => {
                warn!("Remote store write failed, will retry: {}", e);
                SyncOutcome::Deferred
            }
        }
    }

    /// Local writes that have not landed yet
    pub fn has_pending_local(&self) -> bool {
        self.pending_local.is_some()
    }
}

fn read_or_empty(store: &dyn BlobStore, name: &str) -> StorageBlob {
    store.read().unwrap_or_else(|e| {
        warn!("Treating unreadable {} store as empty: {}", name, e);
        StorageBlob::default()
    })
}
