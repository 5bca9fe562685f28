//! Contact form submissions: validation, delivery and the offline queue.

mod queue;
mod rate_limit;
mod session;
mod validate;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use queue::{ReplayReport, SubmissionQueue, run_replay_listener};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use session::{CSRF_TOKEN_TTL, SessionContext};
pub use validate::{
    EMAIL_MAX, LANGUAGE_MAX, MAX_INPUT_LENGTH, MESSAGE_MAX, MESSAGE_MIN, NAME_MAX, PHONE_MAX,
    SanitizedForm, check_spam, is_valid_email, is_valid_phone, normalize_language, sanitize,
    validate,
};

/// Raw values as typed into the contact form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormValues {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub product: String,
    pub message: String,
    /// Interface language; the site default applies when absent.
    #[serde(default)]
    pub language: Option<String>,
}

/// A form field, used to attribute validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Email,
    Phone,
    Product,
    Message,
}

impl Field {
    /// Form field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Product => "product",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submission persisted while awaiting delivery.
///
/// Fields never change after creation; the entry is only ever removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    /// Identity used to remove exactly this entry once delivered.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub product: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub csrf_token: String,
    pub session_id: String,
    pub language: String,
}

impl PendingSubmission {
    /// Multipart fields posted to the form relay.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("name".to_string(), self.name.clone()),
            ("email".to_string(), self.email.clone()),
            ("phone".to_string(), self.phone.clone().unwrap_or_default()),
            ("product".to_string(), self.product.clone()),
            ("message".to_string(), self.message.clone()),
            ("_language".to_string(), self.language.clone()),
            (
                "_timestamp".to_string(),
                self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ]
    }
}

/// User-fixable input problems. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    /// Every field that failed.
    pub fields: Vec<Field>,
    /// Human-readable explanation.
    pub reason: String,
}

/// Delivery failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The relay answered with a non-2xx status.
    #[error("submission rejected ({status}): {}", .messages.join("; "))]
    Rejected {
        /// HTTP status returned by the relay.
        status: u16,
        /// Messages from the relay's `errors` array, or the status text.
        messages: Vec<String>,
    },
    /// The request failed while the client reported itself online.
    #[error("delivery failed: {0}")]
    Network(String),
    /// Too many attempts from this form inside the window.
    #[error("too many attempts, retry in {}s", .wait.as_secs())]
    RateLimited {
        /// Time until the next attempt is allowed.
        wait: Duration,
    },
}

/// Why `submit` did not deliver or queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// What happened to an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered to the relay.
    Delivered,
    /// Offline: persisted for replay when connectivity returns.
    Queued,
}
