//! The long-running service behind the native-messaging host.
//!
//! [`PassService::start`] loads storage and spawns two tasks: a periodic
//! reconciliation pass and a sweeper that resets expired UI fields.
//! [`PassService::shutdown`] stops both and runs a final pass.
//!
//! Store I/O runs on the blocking pool while the reconciler lock is held.

use super::expiry::{ttl_from_secs, ExpiryQueue};
use super::protocol::{GenerationMode, Request, Response, ResponseData};
use crate::codec::RecordKey;
use crate::config::ServiceConfig;
use crate::crypto::{derive_from_params, random_from_params, MasterSecret};
use crate::storage::{BlobStore, FileStore, Reconciler, SyncOutcome};
use crate::{Result, SlatePassError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, OwnedMutexGuard};
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type ReconcilerGuard = OwnedMutexGuard<Reconciler>;

struct Shared {
    reconciler: Arc<Mutex<Reconciler>>,
    expiry: Mutex<ExpiryQueue<RecordKey>>,
    expiry_changed: Notify,
}

impl Shared {
    async fn lock(&self) -> ReconcilerGuard {
        self.reconciler.clone().lock_owned().await
    }
}

/// Run `work` on the blocking pool and hand the guard back
async fn blocking<T, E, F>(mut guard: ReconcilerGuard, work: F) -> Result<(ReconcilerGuard, T)>
where
    F: FnOnce(&mut Reconciler) -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<SlatePassError> + Send + 'static,
{
    let (guard, outcome) = task::spawn_blocking(move || {
        let outcome = work(&mut guard);
        (guard, outcome)
    })
    .await
    .map_err(|e| SlatePassError::Task(e.to_string()))?;
    Ok((guard, outcome.map_err(Into::into)?))
}

async fn sync_pass(shared: &Shared) -> SyncOutcome {
    let guard = shared.lock().await;
    match blocking(guard, |r| Ok::<_, SlatePassError>(r.sync_pass())).await {
        Ok((_, outcome)) => outcome,
        Err(e) => {
            warn!("Sync pass did not complete: {}", e);
            SyncOutcome::Deferred
        }
    }
}

/// Service state shared by request handling and the background tasks
pub struct PassService {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PassService {
    /// Load storage and start the background tasks
    pub async fn start(
        config: &ServiceConfig,
        local: Arc<dyn BlobStore>,
        remote: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        config.validate()?;

        let (reconciler, report) = task::spawn_blocking(move || Reconciler::load(local, remote))
            .await
            .map_err(|e| SlatePassError::Task(e.to_string()))??;
        if report.skipped_history > 0 {
            warn!("Dropped {} unreadable history entries", report.skipped_history);
        }

        let shared = Arc::new(Shared {
            reconciler: Arc::new(Mutex::new(reconciler)),
            expiry: Mutex::new(ExpiryQueue::new()),
            expiry_changed: Notify::new(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(sync_loop(
                shared.clone(),
                config.sync_interval(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(expiry_loop(shared.clone(), shutdown_rx)),
        ];

        info!(
            "Service started (sync every {}s)",
            config.sync_interval_secs
        );

        Ok(Self {
            shared,
            shutdown_tx,
            tasks,
        })
    }

    /// Start with the file stores named in `config`
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let local: Arc<dyn BlobStore> = Arc::new(FileStore::new(&config.local_store));
        let remote: Arc<dyn BlobStore> = Arc::new(FileStore::new(&config.remote_store));
        Self::start(config, local, remote).await
    }

    /// Handle one request. Failures come back as error responses.
    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(data) => Response::ok(data),
            Err(e) => {
                warn!("Request failed: {}", e);
                Response::from(e)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<ResponseData> {
        let data = match request {
            Request::CheckInitStatus => ResponseData::InitStatus { initialized: true },
            Request::Heartbeat => ResponseData::Ack,
            Request::GetState { key } => {
                let reconciler = self.shared.lock().await;
                match key {
                    Some(key) => ResponseData::UiField {
                        field: reconciler.ui_field(key),
                    },
                    None => ResponseData::UiState {
                        state: reconciler.ui_state().clone(),
                    },
                }
            }
            Request::SetState { field, ttl_secs } => {
                let key = field.key();
                let guard = self.shared.lock().await;

                // the master secret falls back to the configured forget delay
                let ttl_secs = ttl_secs.or_else(|| {
                    (key == RecordKey::Pw)
                        .then(|| i64::from(guard.settings().forget_secret_after_secs))
                });
                let ttl = ttl_secs.and_then(ttl_from_secs);

                let (_guard, ()) = blocking(guard, move |r| r.set_ui_field(field)).await?;
                self.shared
                    .expiry
                    .lock()
                    .await
                    .schedule(key, ttl, Instant::now());
                self.shared.expiry_changed.notify_one();
                ResponseData::Ack
            }
            Request::ClearAllStates => {
                let guard = self.shared.lock().await;
                let (_guard, ()) = blocking(guard, |r| r.clear_ui_state()).await?;
                self.shared.expiry.lock().await.clear();
                self.shared.expiry_changed.notify_one();
                ResponseData::Ack
            }
            Request::GetSettings { key } => {
                let reconciler = self.shared.lock().await;
                match key {
                    Some(key) => ResponseData::Setting {
                        field: reconciler.settings().get(key),
                    },
                    None => ResponseData::Settings {
                        settings: reconciler.settings().clone(),
                    },
                }
            }
            Request::SetSettings { field } => {
                blocking(self.shared.lock().await, move |r| r.set_setting(field)).await?;
                ResponseData::Ack
            }
            Request::SaveSettings => {
                blocking(self.shared.lock().await, |r| r.save_settings()).await?;
                ResponseData::Ack
            }
            Request::GetHistory => ResponseData::History {
                items: self.shared.lock().await.history().list(),
            },
            Request::DeleteHistory { index, timestamp } => {
                let (_, deleted) = blocking(self.shared.lock().await, move |r| {
                    r.delete_history(index, timestamp)
                })
                .await?;
                ResponseData::Deleted { deleted }
            }
            Request::ClearHistory => {
                blocking(self.shared.lock().await, |r| r.clear_history()).await?;
                ResponseData::Ack
            }
            Request::SearchHistory { salt } => {
                let (_, found) =
                    blocking(self.shared.lock().await, move |r| r.search_history(&salt)).await?;
                ResponseData::Search { found }
            }
            Request::GeneratePassword { mode } => self.generate(mode).await?,
        };
        Ok(data)
    }

    /// Deterministic when the UI state holds a master secret, random otherwise
    async fn generate(&self, mode: GenerationMode) -> Result<ResponseData> {
        let params = self.shared.lock().await.ui_state().clone();

        let (password, fingerprint, random) = if params.pw.is_empty() {
            let generated = random_from_params(&params)?;
            (generated.password, generated.tag.to_string(), true)
        } else {
            let secret = MasterSecret::from(params.pw.clone());
            let request = params.clone();
            let derived = task::spawn_blocking(move || derive_from_params(secret.expose(), &request))
                .await
                .map_err(|e| SlatePassError::Task(e.to_string()))??;
            (derived.password, derived.fingerprint, false)
        };

        let recorded = if mode.is_human() {
            let recorded_password = password.clone();
            let (_, recorded) = blocking(self.shared.lock().await, move |r| {
                r.record_generation(&params, &recorded_password, random)
            })
            .await?;
            recorded
        } else {
            false
        };

        Ok(ResponseData::Password {
            password,
            fingerprint,
            need_copy: mode == GenerationMode::HumanCopy,
            recorded,
        })
    }

    /// Run one reconciliation pass now
    pub async fn sync_now(&self) -> SyncOutcome {
        sync_pass(&self.shared).await
    }

    /// Stop the background tasks and flush pending writes
    pub async fn shutdown(mut self) -> SyncOutcome {
        let _ = self.shutdown_tx.send(true);
        for handle in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        let outcome = self.sync_now().await;
        info!("Service stopped, final sync: {:?}", outcome);
        outcome
    }
}

async fn sync_loop(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = sync_pass(&shared).await;
                debug!("Sync pass: {:?}", outcome);
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn expiry_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let next = shared.expiry.lock().await.next_deadline();
        let wait = async move {
            match next {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = wait => {}
            _ = shared.expiry_changed.notified() => continue,
            _ = shutdown.changed() => break,
        }

        let guard = shared.lock().await;
        let expired = shared.expiry.lock().await.pop_expired(Instant::now());
        if expired.is_empty() {
            continue;
        }

        let reset = blocking(guard, move |r| {
            for key in expired {
                debug!("UI field {:?} expired", key);
                if let Err(e) = r.reset_ui_field(key) {
                    warn!("Failed to reset expired field {:?}: {}", key, e);
                }
            }
            Ok::<_, SlatePassError>(())
        })
        .await;
        if let Err(e) = reset {
            warn!("Expiry sweep did not complete: {}", e);
        }
    }
}
