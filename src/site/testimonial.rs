//! Generated customer testimonials

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::generation::{GenerationService, Pipeline};
use crate::live::{LiveQuery, LiveQueryEngine};
use crate::schema::{FieldKind, ResultSchema};
use crate::storage::document::{Document, TYPE_KEY};
use crate::storage::store::Store;

/// A customer testimonial
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Testimonial {
    pub id: String,
    pub name: String,
    pub service: String,
    pub text: String,
    /// Generation time, epoch milliseconds
    pub timestamp: Option<i64>,
}

impl Testimonial {
    /// Type tag of testimonial documents
    pub const TAG: &'static str = "testimonial";

    pub fn from_document(doc: &Document) -> Self {
        let text = |key: &str| doc.get_str(key).unwrap_or_default().to_string();
        Self {
            id: doc.id_str().to_string(),
            name: text("name"),
            service: text("service"),
            text: text("text"),
            timestamp: doc.get("timestamp").and_then(|v| v.as_i64()),
        }
    }
}

/// Shape requested from the generation service
pub fn testimonial_schema() -> ResultSchema {
    ResultSchema::new("testimonials")
        .described_field("name", FieldKind::String, "Customer first name and last initial")
        .described_field("service", FieldKind::String, "What was repaired")
        .described_field("text", FieldKind::String, "The customer's experience")
}

fn testimonial_prompt(count: usize) -> String {
    format!(
        "Generate {} realistic customer testimonials for a tech repair shop. \
         Each testimonial should include the customer name, what was repaired, \
         and their positive experience.",
        count
    )
}

/// Generate `count` testimonials and persist them as one batch
///
/// `cancel` abandons the request while the service is still working.
pub async fn generate_testimonials<S: GenerationService>(
    pipeline: &Pipeline<S>,
    count: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Testimonial>> {
    let prompt = testimonial_prompt(count);
    let docs = pipeline
        .generate_into_with_cancel(&prompt, &testimonial_schema(), Testimonial::TAG, cancel)
        .await?;
    Ok(docs.iter().map(Testimonial::from_document).collect())
}

/// All stored testimonials in insertion order
pub fn list_testimonials(store: &Store) -> Result<Vec<Testimonial>> {
    let docs = store.query_by_field(TYPE_KEY, Testimonial::TAG)?;
    Ok(docs.iter().map(Testimonial::from_document).collect())
}

/// Subscribe to the testimonial list
pub fn subscribe_testimonials(engine: &LiveQueryEngine) -> Result<(Vec<Testimonial>, LiveQuery)> {
    let (docs, handle) = engine.subscribe(TYPE_KEY, Testimonial::TAG)?;
    Ok((docs.iter().map(Testimonial::from_document).collect(), handle))
}
