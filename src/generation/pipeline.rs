//! The generate → parse → validate → persist pipeline

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{GenerationRequest, GenerationService};
use crate::error::{Error, Result};
use crate::schema::ResultSchema;
use crate::storage::document::{Document, Fields, Value};
use crate::storage::store::{now_millis, Store};

/// Field stamped on every generated document (epoch milliseconds)
pub const TIMESTAMP_FIELD: &str = "timestamp";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Structured generation pipeline writing into a store
pub struct Pipeline<S> {
    service: S,
    store: Arc<Store>,
    timeout: Duration,
}

impl<S: GenerationService> Pipeline<S> {
    pub fn new(service: S, store: Arc<Store>) -> Self {
        Self {
            service,
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound each service call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call the service, then parse and validate its payload. Nothing is persisted.
    pub async fn generate(&self, prompt: &str, schema: &ResultSchema) -> Result<Vec<Fields>> {
        let payload = self.call_service(prompt, schema).await?;
        parse_and_validate(&payload, schema)
    }

    /// Generate items and persist each as a document of type `doc_type`
    ///
    /// Returns the persisted documents in insertion order. Either every item
    /// is persisted or none is.
    pub async fn generate_into(
        &self,
        prompt: &str,
        schema: &ResultSchema,
        doc_type: &str,
    ) -> Result<Vec<Document>> {
        self.generate_into_with_cancel(prompt, schema, doc_type, &CancellationToken::new())
            .await
    }

    /// Like [`Pipeline::generate_into`], abandoning the call if `cancel` fires
    /// before the service answers
    ///
    /// Once the payload has arrived, cancellation is no longer observed and
    /// the batch runs to completion even if this future is dropped.
    pub async fn generate_into_with_cancel(
        &self,
        prompt: &str,
        schema: &ResultSchema,
        doc_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Generation for {} cancelled", doc_type);
                return Err(Error::Cancelled);
            }
            result = self.call_service(prompt, schema) => result?,
        };

        let items = parse_and_validate(&payload, schema)?;
        let timestamp = now_millis();
        let docs: Vec<Document> = items
            .into_iter()
            .map(|mut fields| {
                fields.insert(TIMESTAMP_FIELD.to_string(), Value::Int(timestamp));
                Document::from_fields(doc_type, fields)
            })
            .collect();

        let store = Arc::clone(&self.store);
        let ids = tokio::spawn(async move { store.put_batch(docs).await })
            .await
            .map_err(|e| Error::storage(format!("persistence task failed: {}", e)))??;
        tracing::info!("Persisted {} generated {} document(s)", ids.len(), doc_type);

        let mut persisted = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(doc) = self.store.get(id)? {
                persisted.push(doc);
            }
        }
        Ok(persisted)
    }

    async fn call_service(&self, prompt: &str, schema: &ResultSchema) -> Result<String> {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            schema_name: schema.root.clone(),
            schema: schema.to_json_schema(),
        };

        tracing::debug!("Requesting {} from generation service", schema.root);
        match tokio::time::timeout(self.timeout, self.service.generate(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::GenerationService {
                message: format!("no response within {}s", self.timeout.as_secs_f64()),
            }),
        }
    }
}

/// Parse a service payload as JSON, unwrapping a markdown code fence if present
pub fn parse_payload(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => {
            // Single-line fence: the payload follows the backticks and an optional tag
            let after_lang = match fenced.split_once('\n') {
                Some((_, rest)) => rest,
                None => fenced.trim_start_matches("json"),
            };
            after_lang.trim().trim_end_matches("```")
        }
        None => trimmed,
    };

    serde_json::from_str(body).map_err(|e| Error::Parse {
        message: e.to_string(),
    })
}

fn parse_and_validate(payload: &str, schema: &ResultSchema) -> Result<Vec<Fields>> {
    let parsed = parse_payload(payload)?;
    let items = schema.validate(&parsed).map_err(|e| {
        tracing::warn!("Generated payload rejected: {}", e);
        Error::from(e)
    })?;
    tracing::debug!("Validated {} item(s) against {}", items.len(), schema.root);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use crate::storage::store::StoreOptions;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns canned payloads and records requests
    struct ScriptedService {
        payload: Result<String>,
        delay: Duration,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedService {
        fn replying(payload: &str) -> Self {
            Self {
                payload: Ok(payload.to_string()),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                payload: Err(Error::GenerationService {
                    message: message.to_string(),
                }),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn slow(payload: &str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::replying(payload)
            }
        }
    }

    impl GenerationService for ScriptedService {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            tokio::time::sleep(self.delay).await;
            match &self.payload {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::GenerationService {
                    message: e.to_string(),
                }),
            }
        }
    }

    fn schema() -> ResultSchema {
        ResultSchema::new("testimonials")
            .field("name", FieldKind::String)
            .field("service", FieldKind::String)
            .field("text", FieldKind::String)
    }

    async fn store(tmp: &TempDir) -> Arc<Store> {
        let options = StoreOptions {
            history: false,
            ..Default::default()
        };
        Arc::new(Store::open(tmp.path(), options).await.unwrap())
    }

    #[test]
    fn test_parse_payload_plain_and_fenced() {
        assert!(parse_payload(r#"[{"a": 1}]"#).unwrap().is_array());
        let fenced = "```json\n{\"testimonials\": []}\n```";
        assert!(parse_payload(fenced).unwrap().is_object());
        assert!(parse_payload(r#"```[{"a": 1}]```"#).unwrap().is_array());
        assert!(parse_payload(r#"```json {"testimonials": []}```"#).unwrap().is_object());
        assert!(matches!(parse_payload("not json"), Err(Error::Parse { .. })));
    }

    #[tokio::test]
    async fn test_generate_persists_with_timestamp() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let service = ScriptedService::replying(
            r#"{"testimonials": [{"name": "Ana", "service": "Battery", "text": "Quick"},
                                 {"name": "Raj", "service": "Screen", "text": "Perfect"}]}"#,
        );
        let pipeline = Pipeline::new(service, store.clone());

        let docs = pipeline.generate_into("write two", &schema(), "testimonial").await.unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.get(TIMESTAMP_FIELD).is_some()));
        assert_eq!(store.query_by_field("type", "testimonial").unwrap(), docs);

        let requests = pipeline.service.requests.lock().unwrap();
        assert_eq!(requests[0].schema_name, "testimonials");
        assert_eq!(requests[0].schema, schema().to_json_schema());
    }

    #[tokio::test]
    async fn test_generate_does_not_persist() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let service = ScriptedService::replying(r#"[{"name": "A", "service": "B", "text": "C"}]"#);
        let pipeline = Pipeline::new(service, store.clone());

        let items = pipeline.generate("one", &schema()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_failures_persist_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        let cases = [
            (ScriptedService::failing("HTTP 503"), "service"),
            (ScriptedService::replying("Sure! Here you go"), "parse"),
            (ScriptedService::replying(r#"[{"name": "A", "text": "C"}]"#), "validation"),
        ];
        for (service, expected) in cases {
            let pipeline = Pipeline::new(service, store.clone());
            let err = pipeline.generate_into("x", &schema(), "testimonial").await.unwrap_err();
            let kind = match err {
                Error::GenerationService { .. } => "service",
                Error::Parse { .. } => "parse",
                Error::Validation { .. } => "validation",
                other => panic!("unexpected error: {}", other),
            };
            assert_eq!(kind, expected);
        }
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_timeout_is_service_error() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let service = ScriptedService::slow("[]", Duration::from_secs(5));
        let pipeline = Pipeline::new(service, store.clone()).with_timeout(Duration::from_millis(50));

        let err = pipeline.generate_into("x", &schema(), "testimonial").await.unwrap_err();
        assert!(matches!(err, Error::GenerationService { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_response() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let service = ScriptedService::slow(
            r#"[{"name": "A", "service": "B", "text": "C"}]"#,
            Duration::from_secs(5),
        );
        let pipeline = Pipeline::new(service, store.clone());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = pipeline
            .generate_into_with_cancel("x", &schema(), "testimonial", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_unwritable_store_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        std::fs::write(tmp.path().join("collections/testimonial"), "").unwrap();

        let service = ScriptedService::replying(
            r#"[{"name": "A", "service": "B", "text": "C"}, {"name": "D", "service": "E", "text": "F"}]"#,
        );
        let pipeline = Pipeline::new(service, store.clone());

        let err = pipeline.generate_into("x", &schema(), "testimonial").await.unwrap_err();
        assert!(err.is_storage());
        assert!(store.is_empty().unwrap());
    }
}
