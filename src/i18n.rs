//! String lookup and user-facing status messages.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::submission::{DeliveryError, SubmitError, SubmitOutcome};

/// How long a status message stays on screen.
pub const STATUS_DISMISS_AFTER: Duration = Duration::from_secs(5);

/// Looks up display strings by dotted key path.
pub trait Translator: Send + Sync {
    /// Resolves `key_path` and substitutes `{name}` placeholders from
    /// `params`. Returns the key path itself when nothing matches.
    fn t(&self, key_path: &str, params: &[(&str, &str)]) -> String;
}

/// Per-language string tables with fallback to a default language.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: HashMap<String, Value>,
    default_language: String,
    language: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin("vi")
    }
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new(default_language: impl Into<String>) -> Self {
        let default_language = default_language.into();
        Self {
            tables: HashMap::new(),
            language: default_language.clone(),
            default_language,
        }
    }

    /// Catalog preloaded with the site's form strings in Vietnamese and
    /// English.
    #[must_use]
    pub fn builtin(default_language: impl Into<String>) -> Self {
        let mut catalog = Self::new(default_language);
        catalog.insert("vi", builtin_vi());
        catalog.insert("en", builtin_en());
        catalog
    }

    /// Adds or replaces the table for `language`.
    pub fn insert(&mut self, language: impl Into<String>, table: Value) {
        self.tables.insert(language.into(), table);
    }

    /// Parses a JSON table, such as a site's `/locales/<lang>.json`, and
    /// merges it over the existing table for `language`. Keys present in
    /// `json` win; every other string is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a JSON object.
    pub fn insert_json(&mut self, language: impl Into<String>, json: &str) -> Result<()> {
        let table: Value = serde_json::from_str(json)?;
        if !table.is_object() {
            return Err(Error::Config("translation table must be a JSON object".to_string()));
        }
        merge(self.tables.entry(language.into()).or_insert(Value::Null), table);
        Ok(())
    }

    /// Switches the active language. Unknown languages fall back per lookup.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// The active language.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    fn lookup(&self, language: &str, key_path: &str) -> Option<&str> {
        key_path
            .split('.')
            .try_fold(self.tables.get(language)?, |node, part| node.get(part))?
            .as_str()
    }
}

impl Translator for Catalog {
    fn t(&self, key_path: &str, params: &[(&str, &str)]) -> String {
        let template = self
            .lookup(&self.language, key_path)
            .or_else(|| self.lookup(&self.default_language, key_path));
        let Some(template) = template else {
            log::debug!("Missing translation for {key_path} ({})", self.language);
            return key_path.to_string();
        };
        params
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }
}

fn merge(into: &mut Value, from: Value) {
    match (into, from) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                merge(into.entry(key).or_insert(Value::Null), value);
            }
        }
        (into, from) => *into = from,
    }
}

fn builtin_vi() -> Value {
    json!({
        "form": {
            "success": "Cảm ơn bạn! Chúng tôi sẽ liên hệ lại sớm.",
            "queued": "Bạn đang ngoại tuyến. Yêu cầu đã được lưu và sẽ tự động gửi khi có mạng.",
            "error": {
                "validation": "Vui lòng kiểm tra lại: {fields}",
                "rate_limited": "Bạn gửi quá nhiều lần. Vui lòng thử lại sau {seconds} giây.",
                "rejected": "Không thể gửi yêu cầu: {details}",
                "network": "Lỗi kết nối. Vui lòng thử lại."
            },
            "fields": {
                "name": "Họ tên",
                "email": "Email",
                "phone": "Số điện thoại",
                "product": "Dịch vụ",
                "message": "Nội dung"
            }
        }
    })
}

fn builtin_en() -> Value {
    json!({
        "form": {
            "success": "Thank you! We will get back to you soon.",
            "queued": "You are offline. Your request was saved and will be sent automatically when you reconnect.",
            "error": {
                "validation": "Please check: {fields}",
                "rate_limited": "Too many attempts. Please try again in {seconds} seconds.",
                "rejected": "Could not send your request: {details}",
                "network": "Connection error. Please try again."
            },
            "fields": {
                "name": "Name",
                "email": "Email",
                "phone": "Phone",
                "product": "Service",
                "message": "Message"
            }
        }
    })
}

/// Visual class of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Success,
    Warning,
}

impl Severity {
    /// CSS-style class name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Success => "success",
            Self::Warning => "warning",
        }
    }
}

/// A single-line message shown after a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub severity: Severity,
    pub text: String,
    pub dismiss_after: Duration,
}

impl StatusMessage {
    /// Creates a message with the standard dismiss delay.
    #[must_use]
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            dismiss_after: STATUS_DISMISS_AFTER,
        }
    }

    /// Describes the result of `SubmissionQueue::submit`.
    #[must_use]
    pub fn from_submission(
        result: &std::result::Result<SubmitOutcome, SubmitError>,
        translator: &impl Translator,
    ) -> Self {
        match result {
            Ok(SubmitOutcome::Delivered) => {
                Self::new(Severity::Success, translator.t("form.success", &[]))
            }
            Ok(SubmitOutcome::Queued) => {
                Self::new(Severity::Warning, translator.t("form.queued", &[]))
            }
            Err(SubmitError::Validation(e)) => {
                let fields = e
                    .fields
                    .iter()
                    .map(|f| translator.t(&format!("form.fields.{f}"), &[]))
                    .collect::<Vec<_>>()
                    .join(", ");
                Self::new(
                    Severity::Error,
                    translator.t("form.error.validation", &[("fields", &fields)]),
                )
            }
            Err(SubmitError::Delivery(DeliveryError::RateLimited { wait })) => {
                let seconds = wait.as_secs().max(1).to_string();
                Self::new(
                    Severity::Warning,
                    translator.t("form.error.rate_limited", &[("seconds", &seconds)]),
                )
            }
            Err(SubmitError::Delivery(DeliveryError::Rejected { messages, .. })) => {
                let details = messages.join("; ");
                Self::new(
                    Severity::Error,
                    translator.t("form.error.rejected", &[("details", &details)]),
                )
            }
            Err(SubmitError::Delivery(DeliveryError::Network(_))) => {
                Self::new(Severity::Error, translator.t("form.error.network", &[]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{Field, ValidationError};

    #[test]
    fn looks_up_dotted_paths() {
        let catalog = Catalog::builtin("vi").with_language("en");
        assert_eq!(catalog.t("form.fields.phone", &[]), "Phone");
        assert_eq!(catalog.language(), "en");
    }

    #[test]
    fn substitutes_params() {
        let catalog = Catalog::builtin("vi").with_language("en");
        assert_eq!(
            catalog.t("form.error.rate_limited", &[("seconds", "42")]),
            "Too many attempts. Please try again in 42 seconds."
        );
    }

    #[test]
    fn falls_back_to_default_language_then_key() {
        let mut catalog = Catalog::new("vi").with_language("en");
        catalog.insert("vi", json!({ "a": { "b": "xin chào" } }));
        catalog.insert("en", json!({ "a": {} }));

        assert_eq!(catalog.t("a.b", &[]), "xin chào");
        assert_eq!(catalog.t("a.missing", &[]), "a.missing");
        // A non-string node is not a translation.
        assert_eq!(catalog.t("a", &[]), "a");
    }

    #[test]
    fn unknown_language_uses_default() {
        let catalog = Catalog::builtin("vi").with_language("fr");
        assert_eq!(catalog.t("form.fields.name", &[]), "Họ tên");
    }

    #[test]
    fn insert_json_rejects_non_objects() {
        let mut catalog = Catalog::new("vi");
        assert!(catalog.insert_json("en", "[1, 2]").is_err());
        assert!(catalog.insert_json("en", "not json").is_err());
        catalog
            .insert_json("en", r#"{"greeting": "Hello {name}"}"#)
            .unwrap();
        let catalog = catalog.with_language("en");
        assert_eq!(catalog.t("greeting", &[("name", "Lan")]), "Hello Lan");
    }

    #[test]
    fn site_strings_override_builtins_key_by_key() {
        let mut catalog = Catalog::builtin("vi");
        catalog
            .insert_json(
                "en",
                r#"{"form": {"success": "Thanks, talk soon!", "fields": {"product": "Package"}}, "nav": {"home": "Home"}}"#,
            )
            .unwrap();
        let catalog = catalog.with_language("en");

        assert_eq!(catalog.t("form.success", &[]), "Thanks, talk soon!");
        assert_eq!(catalog.t("form.fields.product", &[]), "Package");
        assert_eq!(catalog.t("form.fields.phone", &[]), "Phone");
        assert_eq!(catalog.t("form.error.network", &[]), "Connection error. Please try again.");
        assert_eq!(catalog.t("nav.home", &[]), "Home");
    }

    #[test]
    fn status_for_outcomes() {
        let catalog = Catalog::builtin("vi").with_language("en");

        let ok = StatusMessage::from_submission(&Ok(SubmitOutcome::Delivered), &catalog);
        assert_eq!(ok.severity, Severity::Success);
        assert_eq!(ok.dismiss_after, Duration::from_secs(5));

        let queued = StatusMessage::from_submission(&Ok(SubmitOutcome::Queued), &catalog);
        assert_eq!(queued.severity, Severity::Warning);
        assert!(queued.text.contains("offline"));
    }

    #[test]
    fn status_for_errors() {
        let catalog = Catalog::builtin("vi").with_language("en");

        let invalid = Err(SubmitError::Validation(ValidationError {
            fields: vec![Field::Email, Field::Message],
            reason: "invalid".to_string(),
        }));
        let msg = StatusMessage::from_submission(&invalid, &catalog);
        assert_eq!(msg.severity, Severity::Error);
        assert_eq!(msg.text, "Please check: Email, Message");

        let limited = Err(SubmitError::Delivery(DeliveryError::RateLimited {
            wait: Duration::from_secs(260),
        }));
        let msg = StatusMessage::from_submission(&limited, &catalog);
        assert_eq!(msg.severity, Severity::Warning);
        assert!(msg.text.contains("260"));

        let rejected = Err(SubmitError::Delivery(DeliveryError::Rejected {
            status: 422,
            messages: vec!["Email is invalid".to_string()],
        }));
        let msg = StatusMessage::from_submission(&rejected, &catalog);
        assert_eq!(msg.text, "Could not send your request: Email is invalid");
        assert_eq!(msg.severity.as_str(), "error");
    }
}
