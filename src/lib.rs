//! vuanh-offline - offline support for the Vũ Anh marketing site.
//!
//! Two cooperating pieces keep the site usable without a connection:
//!
//! - [`AssetCacheController`] owns versioned caches of the site's assets and
//!   answers intercepted requests with a per-request strategy (cache-first,
//!   network-first, or pass-through) and synthetic offline fallbacks.
//! - [`SubmissionQueue`] validates contact form submissions, delivers them to
//!   the form relay, and queues them durably when offline, replaying them in
//!   order once connectivity returns.
//!
//! Every side effect goes through a capability trait ([`Network`],
//! [`Storage`], [`Clock`], [`CacheStore`]) so both pieces run against
//! in-memory doubles in tests.
//!
//! # Example
//!
//! ```no_run
//! use vuanh_offline::{
//!     AppConfig, AssetCacheController, DiskCacheStore, FileStorage, FormValues,
//!     ReqwestNetwork, SubmissionQueue, SystemClock,
//! };
//!
//! # async fn example() -> vuanh_offline::Result<()> {
//! let config = AppConfig::load()?;
//! let network = std::sync::Arc::new(ReqwestNetwork::default());
//!
//! let controller = AssetCacheController::new(
//!     DiskCacheStore::new(config.storage.cache_dir()),
//!     network.clone(),
//!     &config,
//! );
//! controller.resume().await?;
//!
//! let queue = SubmissionQueue::open(
//!     FileStorage::new(config.storage.kv_dir()),
//!     network,
//!     SystemClock,
//!     &config,
//! )
//! .await;
//! let outcome = queue.submit(&FormValues::default()).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod i18n;
pub mod net;
pub mod storage;
pub mod submission;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use cache::{AssetCacheController, CacheStore, DiskCacheStore, FetchResponse, MemoryCacheStore, WorkerState};
pub use clock::{Clock, SystemClock};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use i18n::{Catalog, Severity, StatusMessage, Translator};
pub use net::{Network, Request, ReqwestNetwork, Response};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use submission::{
    DeliveryError, FormValues, PendingSubmission, ReplayReport, SubmissionQueue, SubmitError,
    SubmitOutcome, normalize_language, run_replay_listener,
};
