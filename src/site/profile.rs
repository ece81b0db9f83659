//! The business profile singleton

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::document::{Document, TYPE_KEY};
use crate::storage::store::Store;

/// Business contact details shown on the site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusinessProfile {
    pub name: String,
    pub tagline: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub hours: String,
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            name: "Fast Fix Tech Repair".to_string(),
            tagline: "Fast & Reliable Phone & Laptop Repairs".to_string(),
            address: "123 Main Street, Anytown, USA".to_string(),
            phone: "(555) 123-4567".to_string(),
            email: "contact@fastfixtech.com".to_string(),
            hours: "Mon-Fri: 9am-7pm, Sat: 10am-5pm, Sun: Closed".to_string(),
        }
    }
}

impl BusinessProfile {
    /// Type tag of profile documents
    pub const TAG: &'static str = "business-info";

    /// Read a profile from a stored document
    ///
    /// Missing or non-string fields keep the value from `fallback`.
    pub fn from_document(doc: &Document, fallback: &BusinessProfile) -> Self {
        let pick = |key: &str, default: &str| doc.get_str(key).unwrap_or(default).to_string();
        Self {
            name: pick("name", &fallback.name),
            tagline: pick("tagline", &fallback.tagline),
            address: pick("address", &fallback.address),
            phone: pick("phone", &fallback.phone),
            email: pick("email", &fallback.email),
            hours: pick("hours", &fallback.hours),
        }
    }

    /// Build an unsaved document for this profile
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new(Self::TAG);
        doc.set("name", self.name.as_str())
            .set("tagline", self.tagline.as_str())
            .set("address", self.address.as_str())
            .set("phone", self.phone.as_str())
            .set("email", self.email.as_str())
            .set("hours", self.hours.as_str());
        doc
    }
}

/// The stored profile, if one exists
///
/// Should more than one ever be present, the earliest written wins.
pub fn load_profile(store: &Store, fallback: &BusinessProfile) -> Result<Option<BusinessProfile>> {
    let docs = store.query_by_field(TYPE_KEY, BusinessProfile::TAG)?;
    Ok(docs
        .first()
        .map(|doc| BusinessProfile::from_document(doc, fallback)))
}

/// The stored profile, or `default` as an unpersisted view
pub fn get_or_default(store: &Store, default: &BusinessProfile) -> Result<BusinessProfile> {
    Ok(load_profile(store, default)?.unwrap_or_else(|| default.clone()))
}

/// Persist `default` as the profile unless one already exists
///
/// Returns the id of the canonical profile and whether this call created
/// it. Concurrent callers all receive the same id.
pub async fn ensure_profile(store: &Store, default: &BusinessProfile) -> Result<(String, bool)> {
    let (id, created) = store
        .put_if_absent(TYPE_KEY, BusinessProfile::TAG, default.to_document())
        .await?;
    if created {
        tracing::info!("Created business profile {}", id);
    }
    Ok((id, created))
}
