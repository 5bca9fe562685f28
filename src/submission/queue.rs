//! The submission queue: deliver now, or persist and replay later.
//!
//! A submission that fails while the client reports itself offline is
//! appended to an ordered queue and the whole queue is written to durable
//! storage. When connectivity returns the queue is replayed strictly in
//! insertion order, one delivery at a time with a fixed pause between them.
//! Delivered entries are removed and the retained set is persisted after
//! every resolved attempt; nothing is changed while a delivery is pending.
//!
//! Delivery is at-least-once: a success whose acknowledgement is lost before
//! the queue is persisted is delivered again on the next replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::rate_limit::RateLimiter;
use super::session::SessionContext;
use super::validate::{normalize_language, validate};
use super::{DeliveryError, FormValues, PendingSubmission, SubmitError, SubmitOutcome};
use crate::cache::ClientMessage;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::Result;
use crate::net::{Network, Response};
use crate::storage::{PENDING_SUBMISSIONS_CORRUPT_KEY, PENDING_SUBMISSIONS_KEY, Storage};

/// Summary of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Deliveries attempted.
    pub attempted: usize,
    /// Submissions delivered and removed from the queue.
    pub delivered: usize,
    /// Submissions still queued afterwards.
    pub remaining: usize,
}

#[derive(Deserialize)]
struct RelayErrorBody {
    #[serde(default)]
    errors: Vec<RelayError>,
}

#[derive(Deserialize)]
struct RelayError {
    message: String,
}

/// Clears the replay flag when a replay pass ends, however it ends.
struct ReplayGuard<'a>(&'a AtomicBool);

impl<'a> ReplayGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the pending submissions of one page session.
///
/// Construct once per process with [`SubmissionQueue::open`], which loads any
/// queue persisted by a previous run. Call [`SubmissionQueue::flush`] before
/// shutting down; [`run_replay_listener`] does so when cancelled.
pub struct SubmissionQueue<S: Storage, N: Network, K: Clock> {
    storage: S,
    network: N,
    clock: K,
    endpoint: String,
    default_language: String,
    form_id: String,
    replay_delay: Duration,
    limiter: RateLimiter,
    session: SessionContext,
    pending: Mutex<Vec<PendingSubmission>>,
    persist_lock: tokio::sync::Mutex<()>,
    replaying: AtomicBool,
}

impl<S: Storage, N: Network, K: Clock> SubmissionQueue<S, N, K> {
    /// Creates the queue and loads the persisted submissions.
    ///
    /// Entries that no longer decode are skipped one by one. Whenever anything
    /// is skipped, the raw stored value is first copied to
    /// [`PENDING_SUBMISSIONS_CORRUPT_KEY`] so the next write cannot destroy
    /// it. Unreadable storage is logged and the queue starts empty for this
    /// session.
    pub async fn open(storage: S, network: N, clock: K, config: &AppConfig) -> Self {
        let pending = match storage.get(PENDING_SUBMISSIONS_KEY).await {
            Ok(Some(json)) => {
                let (pending, skipped) = decode_queue(&json);
                if skipped > 0 {
                    log::warn!(
                        "Skipped {skipped} unreadable queued submission(s), raw queue kept under {PENDING_SUBMISSIONS_CORRUPT_KEY}"
                    );
                    if let Err(e) = storage.set(PENDING_SUBMISSIONS_CORRUPT_KEY, &json).await {
                        log::warn!("Could not preserve unreadable submission queue: {e}");
                    }
                }
                pending
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Submission queue storage unavailable, using memory only: {e}");
                Vec::new()
            }
        };
        if !pending.is_empty() {
            log::info!("Loaded {} queued submission(s)", pending.len());
        }

        Self {
            storage,
            network,
            clock,
            endpoint: config.site.form_endpoint.clone(),
            default_language: config.site.default_language.clone(),
            form_id: config.queue.form_id.clone(),
            replay_delay: config.queue.replay_delay(),
            limiter: RateLimiter::new(
                config.queue.rate_limit_max_attempts,
                config.queue.rate_limit_window(),
            ),
            session: SessionContext::default(),
            pending: Mutex::new(pending),
            persist_lock: tokio::sync::Mutex::new(()),
            replaying: AtomicBool::new(false),
        }
    }

    /// Replaces the session context (e.g. to share session-scoped storage).
    #[must_use]
    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    fn with_pending<R>(&self, f: impl FnOnce(&mut Vec<PendingSubmission>) -> R) -> R {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut pending)
    }

    /// Snapshot of the queued submissions in replay order.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingSubmission> {
        self.with_pending(|p| p.clone())
    }

    /// Number of queued submissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_pending(|p| p.len())
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates, rate-limits and delivers a form submission.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::Validation`] if any field is invalid. Nothing is sent,
    ///   stored or counted against the rate limit.
    /// - [`DeliveryError::RateLimited`] if the form exceeded its attempts.
    /// - [`DeliveryError::Rejected`] if the relay refused the submission.
    /// - [`DeliveryError::Network`] if delivery failed while online.
    ///
    /// A delivery failure while offline is not an error: the submission is
    /// queued and [`SubmitOutcome::Queued`] is returned.
    pub async fn submit(&self, values: &FormValues) -> std::result::Result<SubmitOutcome, SubmitError> {
        let form = validate(values)?;

        let now = self.clock.now();
        let decision = self.limiter.check(&self.form_id, now);
        if !decision.allowed {
            log::info!(
                "Rate limit hit for {}, retry in {}s",
                self.form_id,
                decision.wait_time.as_secs()
            );
            return Err(DeliveryError::RateLimited {
                wait: decision.wait_time,
            }
            .into());
        }

        let submission = PendingSubmission {
            id: Uuid::new_v4(),
            name: form.name,
            email: form.email,
            phone: form.phone,
            product: form.product,
            message: form.message,
            created_at: now,
            csrf_token: self.session.csrf_token(now).await,
            session_id: self.session.session_id().to_string(),
            language: normalize_language(values.language.as_deref())
                .unwrap_or_else(|| self.default_language.clone()),
        };

        match self.deliver(&submission).await {
            Ok(()) => {
                log::info!("Submission {} delivered", submission.id);
                Ok(SubmitOutcome::Delivered)
            }
            Err(DeliveryError::Network(reason)) if !self.network.is_online() => {
                log::info!("Offline ({reason}), queueing submission {}", submission.id);
                self.enqueue(submission).await;
                Ok(SubmitOutcome::Queued)
            }
            Err(e) => {
                log::warn!("Submission {} failed: {e}", submission.id);
                Err(e.into())
            }
        }
    }

    /// Appends a submission and persists the whole queue.
    ///
    /// The in-memory append happens before any suspension. If storage fails
    /// the submission stays queued in memory for this session only.
    pub async fn enqueue(&self, submission: PendingSubmission) {
        self.with_pending(|p| p.push(submission));
        if let Err(e) = self.persist().await {
            log::warn!("Submission queue kept in memory only: {e}");
        }
    }

    /// Writes the current queue to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be encoded or stored.
    pub async fn flush(&self) -> Result<()> {
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        // Serialize snapshot+write pairs so an older snapshot never lands last.
        let _guard = self.persist_lock.lock().await;
        let json = serde_json::to_string(&self.pending())?;
        self.storage.set(PENDING_SUBMISSIONS_KEY, &json).await
    }

    /// Removes every queued submission and its persisted copy.
    pub async fn clear(&self) {
        let _guard = self.persist_lock.lock().await;
        let dropped = self.with_pending(|p| std::mem::take(p).len());
        if let Err(e) = self.storage.remove(PENDING_SUBMISSIONS_KEY).await {
            log::warn!("Could not remove persisted submission queue: {e}");
        }
        log::info!("Cleared {dropped} queued submission(s)");
    }

    async fn deliver(&self, submission: &PendingSubmission) -> std::result::Result<(), DeliveryError> {
        let response = self
            .network
            .post_form(&self.endpoint, &submission.form_fields())
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        if response.ok() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: response.status,
                messages: relay_errors(&response),
            })
        }
    }

    /// Replays the queue in FIFO order, one submission at a time.
    ///
    /// Stops early if the network reports offline again. A pass started while
    /// another is running returns an empty report.
    pub async fn on_connectivity_restored(&self) -> ReplayReport {
        let Some(_guard) = ReplayGuard::acquire(&self.replaying) else {
            log::debug!("Replay already running");
            return ReplayReport::default();
        };

        let snapshot = self.pending();
        let mut report = ReplayReport::default();
        if snapshot.is_empty() {
            return report;
        }
        log::info!("Replaying {} queued submission(s)", snapshot.len());

        for (index, submission) in snapshot.iter().enumerate() {
            if index > 0 {
                self.clock.sleep(self.replay_delay).await;
            }
            if !self.network.is_online() {
                log::info!(
                    "Connectivity lost, {} submission(s) stay queued",
                    snapshot.len() - index
                );
                break;
            }

            report.attempted += 1;
            match self.deliver(submission).await {
                Ok(()) => {
                    self.with_pending(|p| p.retain(|q| q.id != submission.id));
                    if let Err(e) = self.persist().await {
                        log::warn!("Submission queue kept in memory only: {e}");
                    }
                    report.delivered += 1;
                }
                Err(e) => log::warn!("Queued submission {} not delivered: {e}", submission.id),
            }
        }

        report.remaining = self.len();
        log::info!(
            "Replay delivered {} of {} attempted, {} remaining",
            report.delivered,
            report.attempted,
            report.remaining
        );
        report
    }
}

/// Decodes a persisted queue entry by entry. Returns the readable entries in
/// order and how many were skipped; a value that is not a JSON array counts
/// as one skipped entry.
fn decode_queue(json: &str) -> (Vec<PendingSubmission>, usize) {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(json) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Submission queue is not a JSON array: {e}");
            return (Vec::new(), 1);
        }
    };

    let total = entries.len();
    let pending: Vec<PendingSubmission> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            serde_json::from_value(entry)
                .map_err(|e| log::warn!("Skipping queued submission #{index}: {e}"))
                .ok()
        })
        .collect();
    let skipped = total - pending.len();
    (pending, skipped)
}

/// Messages from the relay's `errors` array, or the status text.
fn relay_errors(response: &Response) -> Vec<String> {
    let messages: Vec<String> = serde_json::from_slice::<RelayErrorBody>(&response.body)
        .map(|body| body.errors.into_iter().map(|e| e.message).collect())
        .unwrap_or_default();
    if messages.is_empty() {
        let text = if response.status_text.is_empty() {
            format!("HTTP {}", response.status)
        } else {
            response.status_text.clone()
        };
        vec![text]
    } else {
        messages
    }
}

/// Drives replays for a page session until `token` is cancelled.
///
/// Replays when `connectivity` turns true and whenever the cache controller
/// sends [`ClientMessage::ReplayQueue`]. If the session starts online with a
/// non-empty queue, it replays once immediately. The queue is flushed on exit.
pub async fn run_replay_listener<S: Storage, N: Network, K: Clock>(
    queue: Arc<SubmissionQueue<S, N, K>>,
    mut connectivity: watch::Receiver<bool>,
    mut worker: mpsc::UnboundedReceiver<ClientMessage>,
    token: CancellationToken,
) {
    if *connectivity.borrow_and_update() && !queue.is_empty() {
        queue.on_connectivity_restored().await;
    }

    let mut watching = true;
    let mut listening = true;
    while watching || listening {
        tokio::select! {
            () = token.cancelled() => break,
            changed = connectivity.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                if *connectivity.borrow_and_update() {
                    log::info!("Connectivity restored");
                    queue.on_connectivity_restored().await;
                }
            }
            message = worker.recv(), if listening => match message {
                Some(ClientMessage::ReplayQueue) => {
                    queue.on_connectivity_restored().await;
                }
                None => listening = false,
            },
        }
    }

    if let Err(e) = queue.flush().await {
        log::warn!("Could not flush submission queue on shutdown: {e}");
    }
}
