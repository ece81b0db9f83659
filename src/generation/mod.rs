//! Structured generation
//!
//! A generation service is a black box: it receives a prompt plus a JSON
//! Schema and answers with text that should contain structured data. The
//! [`Pipeline`] turns that text into validated documents:
//!
//! 1. call the service (bounded by a timeout, cancellable)
//! 2. parse the payload as JSON
//! 3. validate it against a [`ResultSchema`](crate::schema::ResultSchema)
//! 4. persist every item as one all-or-nothing batch
//!
//! No step retries; the caller decides whether to try again.

mod http;
mod pipeline;

pub use http::HttpGenerationService;
pub use pipeline::{parse_payload, Pipeline};

use std::future::Future;

use crate::error::Result;

/// A request for structured output
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Natural-language instruction
    pub prompt: String,
    /// Name for the output schema, e.g. `testimonials`
    pub schema_name: String,
    /// JSON Schema the output must follow
    pub schema: serde_json::Value,
}

/// An external service producing structured text
///
/// Failures should be reported as [`Error::GenerationService`](crate::Error::GenerationService).
pub trait GenerationService: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>> + Send;
}
