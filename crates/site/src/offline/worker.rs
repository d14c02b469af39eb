//! The cache worker: an actor task owning the cache lifecycle and command loop.
//!
//! The worker installs (opens both caches and precaches the site shell),
//! activates (drops caches from other versions), then serves commands until it
//! is terminated or every handle is dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use atelier_core::{CacheStatus, WorkerCommand, WorkerEvent};

use super::bulk::BulkCacheRun;
use super::fetch::{FetchRequest, Fetcher};
use super::proxy_url::AssetProxy;
use super::{CacheNames, OfflineError, resolve_url};
use crate::config::SiteConfig;
use crate::db::{CacheStorage, RepositoryError};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Waiting,
    Activated,
    Terminated,
}

impl WorkerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Activated => "activated",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker settings derived from the site configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin relative URLs are resolved against.
    pub origin: Url,
    pub names: CacheNames,
    /// Site shell URLs stored during install.
    pub precache: Vec<String>,
    /// Activate as soon as install finishes.
    pub skip_waiting: bool,
    pub proxy: AssetProxy,
}

impl WorkerConfig {
    #[must_use]
    pub fn from_site(config: &SiteConfig) -> Self {
        Self {
            origin: config.base_url.clone(),
            names: CacheNames::for_version(&config.offline.cache_version),
            precache: config.offline.precache.clone(),
            skip_waiting: config.offline.skip_waiting,
            proxy: AssetProxy::new(config.offline.cdn_host.clone()),
        }
    }
}

enum Message {
    Command {
        command: WorkerCommand,
        reply: Option<oneshot::Sender<Result<CacheStatus, RepositoryError>>>,
    },
    Activate,
    Terminate,
}

/// Handle to a running cache worker.
///
/// Cheap to clone. The worker stops when it is terminated or the last handle
/// is dropped.
#[derive(Clone)]
pub struct WorkerHandle {
    messages: mpsc::Sender<Message>,
    events: broadcast::Sender<WorkerEvent>,
    state: watch::Receiver<WorkerState>,
    config: Arc<WorkerConfig>,
}

impl WorkerHandle {
    /// Post a command without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::WorkerStopped` if the worker has stopped.
    pub async fn post(&self, command: WorkerCommand) -> Result<(), OfflineError> {
        self.send(Message::Command {
            command,
            reply: None,
        })
        .await
    }

    /// Ask the worker for cache usage (`GET_CACHE_STATUS` with a reply channel).
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::WorkerStopped` if the worker stops before
    /// answering, or `OfflineError::Storage` if reading the caches fails.
    pub async fn cache_status(&self) -> Result<CacheStatus, OfflineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Command {
            command: WorkerCommand::GetCacheStatus,
            reply: Some(tx),
        })
        .await?;
        Ok(rx.await.map_err(|_| OfflineError::WorkerStopped)??)
    }

    /// Activate a worker that is waiting.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::WorkerStopped` if the worker has stopped.
    pub async fn activate(&self) -> Result<(), OfflineError> {
        self.send(Message::Activate).await
    }

    /// Stop the worker. Cache storage is kept.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::WorkerStopped` if the worker has already stopped.
    pub async fn terminate(&self) -> Result<(), OfflineError> {
        self.send(Message::Terminate).await
    }

    /// Receive every event broadcast from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver for lifecycle changes.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    /// Wait until the worker reaches `target` (or terminates).
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::WorkerStopped` if the worker stops first.
    pub async fn wait_for(&self, target: WorkerState) -> Result<(), OfflineError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s == target || *s == WorkerState::Terminated)
            .await
            .map_err(|_| OfflineError::WorkerStopped)?;
        if *reached == target {
            Ok(())
        } else {
            Err(OfflineError::WorkerStopped)
        }
    }

    /// Worker settings.
    #[must_use]
    pub fn config(&self) -> &Arc<WorkerConfig> {
        &self.config
    }

    async fn send(&self, message: Message) -> Result<(), OfflineError> {
        self.messages
            .send(message)
            .await
            .map_err(|_| OfflineError::WorkerStopped)
    }
}

/// Held by the one bulk run in flight; releases the run slot on drop.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(slot: &Arc<AtomicBool>) -> Option<Self> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(slot)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The actor behind a [`WorkerHandle`].
pub struct OfflineWorker<F> {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    fetcher: Arc<F>,
    events: broadcast::Sender<WorkerEvent>,
    state: watch::Sender<WorkerState>,
    running: Arc<AtomicBool>,
    run_task: Option<JoinHandle<()>>,
}

impl<F: Fetcher> OfflineWorker<F> {
    /// Start a worker task and return its handle.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(config: WorkerConfig, storage: CacheStorage, fetcher: Arc<F>) -> WorkerHandle {
        let (messages_tx, messages_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(WorkerState::Installing);
        let config = Arc::new(config);

        let worker = Self {
            config: Arc::clone(&config),
            storage,
            fetcher,
            events: events.clone(),
            state: state_tx,
            running: Arc::new(AtomicBool::new(false)),
            run_task: None,
        };
        tokio::spawn(worker.run(messages_rx));

        WorkerHandle {
            messages: messages_tx,
            events,
            state: state_rx,
            config,
        }
    }

    async fn run(mut self, mut messages: mpsc::Receiver<Message>) {
        self.install().await;

        if self.config.skip_waiting {
            self.activate().await;
        } else {
            self.set_state(WorkerState::Waiting);
        }

        while let Some(message) = messages.recv().await {
            match message {
                Message::Command { command, reply } => self.handle_command(command, reply).await,
                Message::Activate => {
                    if *self.state.borrow() == WorkerState::Waiting {
                        self.activate().await;
                    }
                }
                Message::Terminate => break,
            }
        }

        if let Some(task) = self.run_task.take() {
            task.abort();
        }
        self.set_state(WorkerState::Terminated);
        info!("Cache worker terminated");
    }

    async fn install(&self) {
        for name in [&self.config.names.pages, &self.config.names.media] {
            if let Err(e) = self.storage.open(name).await {
                warn!(cache = %name, error = %e, "Failed to open cache");
            }
        }

        for raw in &self.config.precache {
            if let Err(e) = self.precache(raw).await {
                warn!(url = %raw, error = %e, "Failed to precache shell URL");
            }
        }
        info!(precached = self.config.precache.len(), "Cache worker installed");
    }

    async fn precache(&self, raw: &str) -> Result<(), OfflineError> {
        let url = resolve_url(&self.config.origin, raw)?;
        let response = self.fetcher.fetch(&FetchRequest::get(url.clone())).await?;
        if response.is_cacheable() {
            self.storage
                .put(&self.config.names.pages, url.as_str(), &response)
                .await?;
        } else {
            debug!(url = %url, status = %response.status, "Skipping uncacheable shell URL");
        }
        Ok(())
    }

    /// Delete caches from other versions and take control of requests.
    async fn activate(&self) {
        match self.storage.names().await {
            Ok(names) => {
                for name in names.iter().filter(|n| !self.config.names.is_current(n)) {
                    match self.storage.delete(name).await {
                        Ok(_) => info!(cache = %name, "Deleted stale cache"),
                        Err(e) => warn!(cache = %name, error = %e, "Failed to delete stale cache"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list caches during activation"),
        }
        self.set_state(WorkerState::Activated);
        info!("Cache worker activated");
    }

    async fn handle_command(
        &mut self,
        command: WorkerCommand,
        reply: Option<oneshot::Sender<Result<CacheStatus, RepositoryError>>>,
    ) {
        match command {
            WorkerCommand::CacheMedia {
                urls,
                portfolio_slug,
                portfolio_data,
            } => {
                let Some(guard) = RunGuard::acquire(&self.running) else {
                    warn!(portfolio_slug = %portfolio_slug, "Rejected caching request: a run is in progress");
                    let _ = self.events.send(WorkerEvent::CacheRejected {
                        portfolio_slug,
                        reason: "another portfolio is being cached".to_string(),
                    });
                    return;
                };

                let config = Arc::clone(&self.config);
                let storage = self.storage.clone();
                let fetcher = Arc::clone(&self.fetcher);
                let events = self.events.clone();

                self.run_task = Some(tokio::spawn(async move {
                    let _guard = guard;
                    BulkCacheRun::new(&config, &storage, fetcher.as_ref(), &events)
                        .run(&urls, &portfolio_slug, portfolio_data)
                        .await;
                }));
            }
            WorkerCommand::GetCacheStatus => {
                let status = self.storage.status().await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(status);
                    }
                    None => debug!("GET_CACHE_STATUS without a reply channel"),
                }
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }
}
