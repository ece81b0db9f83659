//! Contact form submissions

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::document::Document;
use crate::storage::store::{now_millis, Store};

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"))
}

/// A contact form submission
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub message: String,
}

impl ContactRequest {
    /// Type tag of contact request documents
    pub const TAG: &'static str = "contact-request";

    /// Check that every field is filled in and the email looks like one
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("email", &self.email),
            ("message", &self.message),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidContactRequest {
                    field,
                    reason: "is required",
                });
            }
        }

        if !email_regex().is_match(self.email.trim()) {
            return Err(Error::InvalidContactRequest {
                field: "email",
                reason: "is not a valid email address",
            });
        }
        Ok(())
    }

    /// Build an unsaved document stamped with `timestamp` (epoch ms)
    pub fn to_document(&self, timestamp: i64) -> Document {
        let mut doc = Document::new(Self::TAG);
        doc.set("name", self.name.trim())
            .set("phone", self.phone.trim())
            .set("email", self.email.trim())
            .set("message", self.message.trim())
            .set("timestamp", timestamp);
        doc
    }
}

/// Validate and store a contact request, returning its id
pub async fn submit_contact_request(store: &Store, request: &ContactRequest) -> Result<String> {
    request.validate()?;
    let id = store.put(request.to_document(now_millis())).await?;
    tracing::info!("Recorded contact request {}", id);
    Ok(id)
}
