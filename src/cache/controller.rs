//! Asset cache controller: install, activate and per-request fetch strategy.
//!
//! The controller owns the cache store. It precaches a fixed manifest into a
//! generation-named cache on install, deletes every other generation on
//! activation, and then answers intercepted requests:
//!
//! - navigations are network first, falling back to the runtime cache, the
//!   cached shell page and finally a synthetic offline page;
//! - same-origin sub-resources are cache first, populating the runtime cache;
//! - font provider requests are cache first, populating the precache;
//! - the form relay endpoint and other cross-origin traffic pass through.
//!
//! It holds no submission data. A background sync only notifies registered
//! page sessions that a replay should be attempted.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::try_join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::strategy::{RequestClass, classify, is_image};
use super::{CacheStore, fallback};
use crate::config::{AppConfig, CacheConfig, SiteConfig};
use crate::error::{Error, Result};
use crate::net::{Network, Request, Response};

/// Lifecycle of one controller generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, install not started.
    Parsed,
    /// Precaching the manifest.
    Installing,
    /// Precache complete, waiting to activate.
    Installed,
    /// Deleting superseded generations.
    Activating,
    /// Serving requests for claimed sessions.
    Activated,
    /// Install failed; this generation never serves.
    Redundant,
}

/// Commands sent from a page session to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate an installed generation without waiting for sessions to close.
    SkipWaiting,
    /// Delete every cache generation unconditionally.
    ClearCache,
}

/// Notifications sent from the controller to page sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Connectivity was granted for background sync; replay the queue.
    ReplayQueue,
}

/// Outcome of intercepting a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
    /// Not handled; the caller performs the default network request.
    Passthrough,
    /// Answered by the controller.
    Respond(Response),
}

impl FetchResponse {
    /// Returns the response if the controller answered.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Passthrough => None,
            Self::Respond(resp) => Some(resp),
        }
    }
}

struct ClientHandle {
    tx: mpsc::UnboundedSender<ClientMessage>,
    controlled: bool,
}

/// Manages the versioned asset caches for one site.
pub struct AssetCacheController<C: CacheStore, N: Network> {
    cache: C,
    network: N,
    site: SiteConfig,
    config: CacheConfig,
    sync_tag: String,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients: Mutex<Vec<ClientHandle>>,
}

impl<C: CacheStore, N: Network> AssetCacheController<C, N> {
    /// Creates a controller for the generation named in `config.cache`.
    #[must_use]
    pub fn new(cache: C, network: N, config: &AppConfig) -> Self {
        Self {
            cache,
            network,
            site: config.site.clone(),
            config: config.cache.clone(),
            sync_tag: config.queue.sync_tag.clone(),
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Returns the underlying cache store.
    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map_or(WorkerState::Redundant, |state| *state)
    }

    fn set_state(&self, next: WorkerState) {
        if let Ok(mut state) = self.state.lock() {
            log::debug!("Cache controller {:?} -> {next:?}", *state);
            *state = next;
        }
    }

    /// Whether the controller asked to take over without waiting.
    #[must_use]
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Resolves a manifest entry against the site origin.
    fn resolve(&self, entry: &str) -> Result<String> {
        if Url::parse(entry).is_ok() {
            return Ok(entry.to_string());
        }
        Url::parse(&self.site.origin)
            .and_then(|origin| origin.join(entry))
            .map(String::from)
            .map_err(|e| Error::Config(format!("cannot resolve {entry:?} against origin: {e}")))
    }

    fn shell_key(&self) -> Option<String> {
        self.resolve(&self.config.shell_path)
            .ok()
            .map(|url| Request::get(url).cache_key())
    }

    /// Precaches every manifest entry into the current generation.
    ///
    /// All entries are fetched before anything is stored, so a failure leaves
    /// no partial generation behind. On failure the controller becomes
    /// [`WorkerState::Redundant`] and the previous generation keeps serving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precache`] naming the first entry that failed.
    pub async fn install(&self) -> Result<()> {
        self.set_state(WorkerState::Installing);
        let name = self.config.precache_name();
        log::info!(
            "Installing cache {name} ({} assets)",
            self.config.precache.len()
        );

        let fetched = try_join_all(self.config.precache.iter().map(|entry| async move {
            let url = self
                .resolve(entry)
                .map_err(|e| precache_error(entry, &e.to_string()))?;
            let request = Request::get(&url);
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| precache_error(&url, &e.to_string()))?;
            if !response.ok() {
                return Err(precache_error(
                    &url,
                    &format!("HTTP {} {}", response.status, response.status_text),
                ));
            }
            Ok((request.cache_key(), response))
        }))
        .await;

        let entries = match fetched {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Install of {name} aborted: {e}");
                self.set_state(WorkerState::Redundant);
                return Err(e);
            }
        };

        let stored = async {
            self.cache.open(&name).await?;
            for (key, response) in entries {
                self.cache.put(&name, &key, response).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        if let Err(e) = stored {
            log::error!("Install of {name} aborted while storing: {e}");
            if let Err(cleanup) = self.cache.delete(&name).await {
                log::error!("Failed to remove partial cache {name}: {cleanup}");
            }
            self.set_state(WorkerState::Redundant);
            return Err(precache_error(&name, &e.to_string()));
        }

        self.skip_waiting.store(true, Ordering::SeqCst);
        self.set_state(WorkerState::Installed);
        log::info!("Cache {name} installed");
        Ok(())
    }

    /// Deletes every generation other than the current precache and the
    /// runtime cache, then claims all registered sessions.
    ///
    /// Does nothing if already activated.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has not been installed or the cache
    /// store cannot be enumerated or cleaned up. A failed cleanup leaves the
    /// controller [`WorkerState::Installed`] so activation can be retried.
    pub async fn activate(&self) -> Result<()> {
        match self.state() {
            WorkerState::Activated => return Ok(()),
            WorkerState::Installed => {}
            other => {
                return Err(Error::Cache(format!(
                    "cannot activate from state {other:?}"
                )));
            }
        }
        self.set_state(WorkerState::Activating);

        let current = self.config.precache_name();
        let runtime = self.config.runtime_name();

        let names = match self.cache.cache_names().await {
            Ok(names) => names,
            Err(e) => {
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };
        for name in names.iter().filter(|n| **n != current && **n != runtime) {
            log::info!("Deleting superseded cache {name}");
            if let Err(e) = self.cache.delete(name).await {
                log::error!("Failed to delete cache {name}, staying installed: {e}");
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        }

        let claimed = self.claim_clients();
        self.set_state(WorkerState::Activated);
        log::info!("Cache {current} activated, claimed {claimed} session(s)");
        Ok(())
    }

    /// Installs then activates, the way a fresh deploy takes over.
    ///
    /// # Errors
    ///
    /// Propagates install and activation errors.
    pub async fn start(&self) -> Result<()> {
        self.install().await?;
        self.activate().await
    }

    /// Takes over after a restart: reuses the current generation when every
    /// manifest entry is already stored, otherwise installs it, then
    /// activates. An incomplete generation is deleted and installed afresh.
    ///
    /// # Errors
    ///
    /// Propagates cache store, install and activation errors.
    pub async fn resume(&self) -> Result<()> {
        let name = self.config.precache_name();
        if !self.cache.cache_names().await?.contains(&name) {
            return self.start().await;
        }
        if self.generation_complete(&name).await? {
            log::info!("Cache {name} already installed");
            self.set_state(WorkerState::Installed);
            return self.activate().await;
        }
        log::warn!("Cache {name} is incomplete, reinstalling");
        if let Err(e) = self.cache.delete(&name).await {
            log::error!("Failed to remove partial cache {name}: {e}");
        }
        self.start().await
    }

    /// Whether the named cache holds every manifest entry.
    async fn generation_complete(&self, name: &str) -> Result<bool> {
        for entry in &self.config.precache {
            let key = Request::get(self.resolve(entry)?).cache_key();
            if self.cache.lookup(name, &key).await?.is_none() {
                log::debug!("Cache {name} is missing {key}");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Looks up a site path in the live generations without touching the
    /// network. Returns `None` for paths that cannot be resolved.
    pub async fn cached_asset(&self, path: &str) -> Option<Response> {
        let url = self.resolve(path).ok()?;
        self.lookup_live(&Request::get(url).cache_key()).await
    }

    fn claim_clients(&self) -> usize {
        self.clients.lock().map_or(0, |mut clients| {
            clients.retain(|c| !c.tx.is_closed());
            for client in clients.iter_mut() {
                client.controlled = true;
            }
            clients.len()
        })
    }

    /// Registers a page session and returns its message channel.
    ///
    /// Sessions opened after activation are controlled immediately.
    pub fn register_client(&self) -> mpsc::UnboundedReceiver<ClientMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let controlled = self.state() == WorkerState::Activated;
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(ClientHandle { tx, controlled });
        }
        rx
    }

    /// Number of live sessions this controller controls.
    #[must_use]
    pub fn controlled_clients(&self) -> usize {
        self.clients.lock().map_or(0, |clients| {
            clients
                .iter()
                .filter(|c| c.controlled && !c.tx.is_closed())
                .count()
        })
    }

    /// Handles a command from a page session.
    ///
    /// # Errors
    ///
    /// Propagates activation or purge errors.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                if self.state() == WorkerState::Installed {
                    self.activate().await?;
                }
                Ok(())
            }
            ControlMessage::ClearCache => self.purge_all().await.map(|_| ()),
        }
    }

    /// Deletes every cache generation. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the caches cannot be enumerated or deleted.
    pub async fn purge_all(&self) -> Result<usize> {
        let names = self.cache.cache_names().await?;
        let mut deleted = 0;
        for name in &names {
            if self.cache.delete(name).await? {
                deleted += 1;
            }
        }
        log::info!("Purged {deleted} cache(s)");
        Ok(deleted)
    }

    /// Handles a background sync grant. For the registered replay tag, every
    /// live session is told to replay its queue; returns how many were told.
    pub fn on_sync(&self, tag: &str) -> usize {
        if tag != self.sync_tag {
            log::debug!("Ignoring sync for unknown tag {tag:?}");
            return 0;
        }
        self.clients.lock().map_or(0, |mut clients| {
            clients.retain(|c| c.tx.send(ClientMessage::ReplayQueue).is_ok());
            log::info!("Background sync: asked {} session(s) to replay", clients.len());
            clients.len()
        })
    }

    /// Intercepts a request.
    ///
    /// Cache store errors are logged and treated as misses; they never fail
    /// the request.
    pub async fn handle_fetch(&self, request: &Request) -> FetchResponse {
        if self.state() != WorkerState::Activated {
            return FetchResponse::Passthrough;
        }

        let class = classify(request, &self.site);
        log::debug!("{} classified as {class:?}", request.url);
        match class {
            RequestClass::FormEndpoint | RequestClass::NonGet | RequestClass::CrossOrigin => {
                FetchResponse::Passthrough
            }
            RequestClass::Font => FetchResponse::Respond(self.font(request).await),
            RequestClass::Navigation => FetchResponse::Respond(self.navigation(request).await),
            RequestClass::Asset => FetchResponse::Respond(self.asset(request).await),
        }
    }

    async fn lookup(&self, name: &str, key: &str) -> Option<Response> {
        match self.cache.lookup(name, key).await {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!("Cache lookup in {name} failed for {key}: {e}");
                None
            }
        }
    }

    /// Looks up `key` in the live generations: precache first, then runtime.
    async fn lookup_live(&self, key: &str) -> Option<Response> {
        if let Some(hit) = self.lookup(&self.config.precache_name(), key).await {
            return Some(hit);
        }
        self.lookup(&self.config.runtime_name(), key).await
    }

    async fn store(&self, name: &str, key: &str, response: Response) {
        if let Err(e) = self.cache.put(name, key, response).await {
            log::warn!("Failed to cache {key} in {name}: {e}");
        }
    }

    async fn font(&self, request: &Request) -> Response {
        let key = request.cache_key();
        if let Some(hit) = self.lookup_live(&key).await {
            return hit;
        }
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.store(&self.config.precache_name(), &key, response.clone())
                        .await;
                }
                response
            }
            Err(e) => {
                log::debug!("Font {} unavailable: {e}", request.url);
                fallback::unavailable()
            }
        }
    }

    async fn navigation(&self, request: &Request) -> Response {
        let key = request.cache_key();
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.store(&self.config.runtime_name(), &key, response.clone())
                        .await;
                }
                return response;
            }
            Err(e) => log::debug!("Navigation to {} failed, trying cache: {e}", request.url),
        }

        if let Some(hit) = self.lookup(&self.config.runtime_name(), &key).await {
            return hit;
        }
        if let Some(shell_key) = self.shell_key()
            && let Some(shell) = self.lookup_live(&shell_key).await
        {
            return shell;
        }
        fallback::offline_page()
    }

    async fn asset(&self, request: &Request) -> Response {
        let key = request.cache_key();
        if let Some(hit) = self.lookup_live(&key).await {
            return hit;
        }
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.store(&self.config.runtime_name(), &key, response.clone())
                        .await;
                }
                response
            }
            Err(e) => {
                log::debug!("Asset {} unavailable: {e}", request.url);
                if is_image(request) {
                    fallback::placeholder_image()
                } else {
                    fallback::unavailable()
                }
            }
        }
    }
}

fn precache_error(url: &str, reason: &str) -> Error {
    Error::Precache {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
