//! Sanitization and validation of contact form input.
//!
//! This is the single validation policy for the form: every raw value is
//! sanitized, then checked field by field, then screened for spam.

use std::sync::LazyLock;

use regex::Regex;

use super::{Field, FormValues, ValidationError};

/// Hard cap applied by the sanitizer to any raw value, in characters.
pub const MAX_INPUT_LENGTH: usize = 10_000;
pub const NAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 254;
pub const PHONE_MAX: usize = 20;
pub const PRODUCT_MAX: usize = 100;
pub const MESSAGE_MIN: usize = 10;
pub const MESSAGE_MAX: usize = 5000;
pub const LANGUAGE_MAX: usize = 35;

/// A run of this many identical characters is treated as spam.
const REPEATED_RUN: usize = 10;
/// More links than this in one message is treated as spam.
const MAX_URLS: usize = 2;

const SPAM_KEYWORDS: &[&str] = &[
    "viagra",
    "cialis",
    "casino",
    "lottery",
    "crypto giveaway",
    "bitcoin investment",
    "free money",
    "click here",
    "buy now",
    "make money fast",
    "work from home",
    "weight loss",
    "seo services",
    "backlinks",
];

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<[^>]*>").expect("valid regex"));

static SCRIPT_URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(javascript|vbscript|data)\s*:").expect("valid regex"));

static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").expect("valid regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9\s().-]+$").expect("valid regex"));

static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://|www\.").expect("valid regex"));

/// Strips markup, script URIs, inline event handlers and control characters,
/// trims, and caps the result at [`MAX_INPUT_LENGTH`] characters.
///
/// Newlines and tabs survive so multi-line messages keep their shape.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, "");
    let without_uris = SCRIPT_URI_RE.replace_all(&without_tags, "");
    let without_handlers = EVENT_HANDLER_RE.replace_all(&without_uris, "");

    let cleaned: String = without_handlers
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .filter(|&c| c != '<' && c != '>')
        .collect();

    cleaned.trim().chars().take(MAX_INPUT_LENGTH).collect()
}

/// Sanitizes a submitted language tag such as `vi` or `en-US`.
///
/// Returns `None` when absent or when the sanitized value is not a plain
/// language tag, so the caller can substitute its default.
#[must_use]
pub fn normalize_language(raw: Option<&str>) -> Option<String> {
    let tag = sanitize(raw?);
    (tag.len() <= LANGUAGE_MAX && LANGUAGE_RE.is_match(&tag)).then_some(tag)
}

/// Whether `email` is a well-formed address of at most [`EMAIL_MAX`] characters.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().count() > EMAIL_MAX || !EMAIL_RE.is_match(email) {
        return false;
    }
    let Some((local, _)) = email.split_once('@') else {
        return false;
    };
    !local.starts_with('.') && !local.ends_with('.') && !email.contains("..")
}

/// Whether `phone` contains only digits and separators, within [`PHONE_MAX`].
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    phone.chars().count() <= PHONE_MAX
        && PHONE_RE.is_match(phone)
        && phone.chars().any(|c| c.is_ascii_digit())
}

/// Screens text for spam. Returns a reason when it looks like spam.
#[must_use]
pub fn check_spam(text: &str) -> Option<&'static str> {
    if has_repeated_run(text, REPEATED_RUN) {
        return Some("contains long runs of repeated characters");
    }
    if URL_RE.find_iter(text).count() > MAX_URLS {
        return Some("contains too many links");
    }
    let lower = text.to_lowercase();
    if SPAM_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some("contains blocked keywords");
    }
    None
}

fn has_repeated_run(text: &str, limit: usize) -> bool {
    let mut prev = None;
    let mut run = 0;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        if Some(c) == prev {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run >= limit {
            return true;
        }
    }
    false
}

/// Form values after sanitization and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedForm {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub product: String,
    pub message: String,
}

/// Sanitizes and validates every field, collecting all failures.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming every failing field with a combined
/// reason. Spam screening only runs once the fields themselves are valid.
pub fn validate(values: &FormValues) -> Result<SanitizedForm, ValidationError> {
    let form = SanitizedForm {
        name: sanitize(&values.name),
        email: sanitize(&values.email),
        phone: Some(sanitize(&values.phone)).filter(|p| !p.is_empty()),
        product: sanitize(&values.product).chars().take(PRODUCT_MAX).collect(),
        message: sanitize(&values.message),
    };

    let mut failures: Vec<(Field, String)> = Vec::new();

    let name_len = form.name.chars().count();
    if name_len == 0 {
        failures.push((Field::Name, "name is required".to_string()));
    } else if name_len > NAME_MAX {
        failures.push((Field::Name, format!("name must be at most {NAME_MAX} characters")));
    }

    if form.email.is_empty() {
        failures.push((Field::Email, "email is required".to_string()));
    } else if !is_valid_email(&form.email) {
        failures.push((Field::Email, "email address is not valid".to_string()));
    }

    if let Some(phone) = &form.phone
        && !is_valid_phone(phone)
    {
        failures.push((Field::Phone, "phone number is not valid".to_string()));
    }

    let message_len = form.message.chars().count();
    if message_len < MESSAGE_MIN {
        failures.push((
            Field::Message,
            format!("message must be at least {MESSAGE_MIN} characters"),
        ));
    } else if message_len > MESSAGE_MAX {
        failures.push((
            Field::Message,
            format!("message must be at most {MESSAGE_MAX} characters"),
        ));
    }

    if failures.is_empty() {
        if let Some(reason) = check_spam(&form.message) {
            failures.push((Field::Message, format!("message {reason}")));
        } else if let Some(reason) = check_spam(&form.name) {
            failures.push((Field::Name, format!("name {reason}")));
        }
    }

    if failures.is_empty() {
        Ok(form)
    } else {
        let (fields, reasons): (Vec<_>, Vec<_>) = failures.into_iter().unzip();
        Err(ValidationError {
            fields,
            reason: reasons.join("; "),
        })
    }
}
