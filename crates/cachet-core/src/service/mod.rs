// ── Backend ──
//
// Owns the runtime settings, the HTTP transport and the merge processor.
// Request I/O runs on spawned tasks; every result, success or failure, is
// funnelled through one merge processor task that applies it to the model
// cache and answers the caller. Cache mutation and change bus delivery
// driven by requests therefore happen on a single task.

mod endpoint;

pub use endpoint::{RequestService, ServiceMap};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use secrecy::SecretString;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use cachet_api::{HttpTransport, TransportConfig};

use crate::cache::ModelCache;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::settings::Settings;

const MERGE_CHANNEL_SIZE: usize = 64;

/// Work applied on the merge processor.
pub(crate) type MergeJob = Box<dyn FnOnce(&ModelCache) -> Merged + Send>;

/// What a merge job did, plus the reply to deliver once it is settled.
pub(crate) struct Merged {
    changed: bool,
    reply: Box<dyn FnOnce() + Send>,
}

impl Merged {
    pub(crate) fn new(changed: bool, reply: impl FnOnce() + Send + 'static) -> Self {
        Self {
            changed,
            reply: Box::new(reply),
        }
    }
}

/// Tuning for the merge processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendOptions {
    /// Save the whole cache after every merge that changed it. The save is
    /// awaited before the next merge is applied.
    pub persist_after_merge: bool,
}

/// Entry point for issuing requests.
///
/// Cheaply cloneable. Call [`start`](Self::start) from inside a Tokio
/// runtime before issuing requests.
#[derive(Clone)]
pub struct Backend {
    inner: Arc<BackendInner>,
}

struct BackendInner {
    settings: ArcSwap<Settings>,
    cache: Arc<ModelCache>,
    http: HttpTransport,
    options: BackendOptions,
    merge_tx: Mutex<mpsc::Sender<MergeJob>>,
    merge_rx: Mutex<Option<mpsc::Receiver<MergeJob>>>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Backend {
    /// Create a backend with the default transport and options.
    pub fn new(cache: Arc<ModelCache>, settings: Settings) -> Result<Self, CoreError> {
        Self::with_config(cache, settings, &TransportConfig::default(), BackendOptions::default())
    }

    pub fn with_config(
        cache: Arc<ModelCache>,
        settings: Settings,
        transport: &TransportConfig,
        options: BackendOptions,
    ) -> Result<Self, CoreError> {
        let http = HttpTransport::new(transport)?;
        let (merge_tx, merge_rx) = mpsc::channel(MERGE_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(BackendInner {
                settings: ArcSwap::from_pointee(settings),
                cache,
                http,
                options,
                merge_tx: Mutex::new(merge_tx),
                merge_rx: Mutex::new(Some(merge_rx)),
                cancel: Mutex::new(CancellationToken::new()),
                task: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        })
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.inner.cache
    }

    pub fn options(&self) -> BackendOptions {
        self.inner.options
    }

    /// Request surface for entity type `E`.
    pub fn service<E: Entity>(&self) -> RequestService<E> {
        RequestService::new(self.clone())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the merge processor. Calling it again while running is a no-op.
    pub async fn start(&self) {
        let Some(rx) = self.inner.merge_rx.lock().await.take() else {
            debug!("merge processor already running");
            return;
        };
        let cancel = self.inner.cancel.lock().await.clone();
        let cache = Arc::clone(&self.inner.cache);
        let handle = tokio::spawn(merge_processor_task(cache, self.inner.options, rx, cancel));

        *self.inner.task.lock().await = Some(handle);
        self.inner.running.store(true, Ordering::Release);
        info!("backend started");
    }

    /// Stop the merge processor after it has applied every queued merge.
    ///
    /// Requests still in flight are answered with `NotRunning`. The backend
    /// may be started again afterwards.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }

        {
            let mut cancel = self.inner.cancel.lock().await;
            cancel.cancel();
            *cancel = CancellationToken::new();
        }

        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }

        // The old receiver was consumed by the processor; start() needs a new one.
        let (tx, rx) = mpsc::channel(MERGE_CHANNEL_SIZE);
        *self.inner.merge_tx.lock().await = tx;
        *self.inner.merge_rx.lock().await = Some(rx);

        info!("backend stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Arc<Settings> {
        self.inner.settings.load_full()
    }

    /// Replace the settings. Requests already issued keep their snapshot.
    pub fn update_settings(&self, f: impl Fn(&mut Settings)) {
        self.inner.settings.rcu(|current| {
            let mut next = Settings::clone(current);
            f(&mut next);
            next
        });
    }

    pub fn set_base_url(&self, url: Url) {
        debug!(%url, "base address changed");
        self.update_settings(|s| s.base_url = Some(url.clone()));
    }

    pub fn set_token(&self, token: Option<SecretString>) {
        self.update_settings(|s| s.token.clone_from(&token));
    }

    pub fn set_testing(&self, testing: bool) {
        debug!(testing, "testing mode changed");
        self.update_settings(|s| s.testing = testing);
    }

    // ── Internals ────────────────────────────────────────────────────

    pub(crate) fn http(&self) -> &HttpTransport {
        &self.inner.http
    }

    /// Sender for merge jobs, or `NotRunning` before `start`.
    pub(crate) async fn merge_sender(&self) -> Result<mpsc::Sender<MergeJob>, CoreError> {
        if !self.is_running() {
            return Err(CoreError::NotRunning);
        }
        Ok(self.inner.merge_tx.lock().await.clone())
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("settings", &self.settings())
            .field("options", &self.inner.options)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Apply merge jobs one at a time until cancelled, then drain what is
/// already queued.
async fn merge_processor_task(
    cache: Arc<ModelCache>,
    options: BackendOptions,
    mut rx: mpsc::Receiver<MergeJob>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                apply(&cache, options, job).await;
            }
        }
    }

    rx.close();
    while let Ok(job) = rx.try_recv() {
        apply(&cache, options, job).await;
    }
    debug!("merge processor stopped");
}

/// Run one job, persist if asked to, then answer the caller.
async fn apply(cache: &Arc<ModelCache>, options: BackendOptions, job: MergeJob) {
    let merged = job(cache.as_ref());

    if merged.changed && options.persist_after_merge {
        let cache = Arc::clone(cache);
        match tokio::task::spawn_blocking(move || cache.save()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "save after merge failed"),
            Err(e) => warn!(error = %e, "save after merge did not complete"),
        }
    }

    (merged.reply)();
}
