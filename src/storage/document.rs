//! Document representation
//!
//! A Document is a tagged record: envelope fields (`id`, `type`,
//! `created_at`) assigned or fixed by the store, plus variant fields held in
//! YAML frontmatter. Documents not yet written have no `id` or `created_at`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Envelope key for the document id
pub const ID_KEY: &str = "id";
/// Envelope key for the type tag
pub const TYPE_KEY: &str = "type";
/// Envelope key for the creation timestamp (epoch milliseconds)
pub const CREATED_AT_KEY: &str = "created_at";
/// Store-private insertion sequence
pub(crate) const SEQ_KEY: &str = "_seq";

/// Keys that can never be used as variant fields
pub const RESERVED_KEYS: &[&str] = &[ID_KEY, TYPE_KEY, CREATED_AT_KEY, SEQ_KEY];

/// A document in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier, assigned by the store on first write
    pub id: Option<String>,

    /// Type tag, immutable once written
    #[serde(rename = "type")]
    pub doc_type: String,

    /// Creation time in epoch milliseconds, assigned by the store
    pub created_at: Option<i64>,

    /// Variant fields
    pub fields: Fields,

    /// Metadata about the document
    #[serde(skip)]
    pub meta: DocumentMeta,
}

/// Field values that can be stored in frontmatter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a JSON value for display and export
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => {
                let map: serde_json::Map<String, serde_json::Value> = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(map)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A map of field names to values
pub type Fields = HashMap<String, Value>;

/// Metadata about a document (not part of equality)
#[derive(Debug, Clone, Default)]
pub struct DocumentMeta {
    /// Insertion sequence assigned by the store
    pub seq: u64,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.doc_type == other.doc_type
            && self.created_at == other.created_at
            && self.fields == other.fields
    }
}

impl Document {
    /// Create a new, unsaved document of the given type
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            id: None,
            doc_type: doc_type.into(),
            created_at: None,
            fields: Fields::new(),
            meta: DocumentMeta::default(),
        }
    }

    /// Create a document with a caller-chosen ID
    pub fn with_id(id: impl Into<String>, doc_type: impl Into<String>) -> Self {
        let mut doc = Self::new(doc_type);
        doc.id = Some(id.into());
        doc
    }

    /// Create a document from already-validated fields
    pub fn from_fields(doc_type: impl Into<String>, fields: Fields) -> Self {
        let mut doc = Self::new(doc_type);
        doc.fields = fields;
        doc
    }

    /// Set a field value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a variant field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a string field, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The id, or an empty string for unsaved documents
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// Resolve a field by name, including the envelope fields
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            ID_KEY => self.id.clone().map(Value::String),
            TYPE_KEY => Some(Value::String(self.doc_type.clone())),
            CREATED_AT_KEY => self.created_at.map(Value::Int),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Check whether `field` resolves to exactly `value`
    pub fn matches(&self, field: &str, value: &Value) -> bool {
        match field {
            ID_KEY => self.id.as_deref() == value.as_str(),
            TYPE_KEY => value.as_str() == Some(self.doc_type.as_str()),
            _ => self.field(field).as_ref() == Some(value),
        }
    }

    /// The first variant field that collides with an envelope key
    pub fn reserved_field(&self) -> Option<&str> {
        RESERVED_KEYS
            .iter()
            .copied()
            .find(|key| self.fields.contains_key(*key))
    }

    /// Parse a stored document from markdown content
    pub fn parse(content: &str) -> Result<Self> {
        let mut fields = super::frontmatter::parse(content)?;

        let id = match fields.remove(ID_KEY) {
            Some(Value::String(s)) => s,
            Some(Value::Int(i)) => i.to_string(),
            _ => return Err(Error::storage("stored document has no 'id' in frontmatter")),
        };
        let doc_type = match fields.remove(TYPE_KEY) {
            Some(Value::String(s)) => s,
            _ => {
                return Err(Error::storage(format!(
                    "stored document '{}' has no 'type' in frontmatter",
                    id
                )))
            }
        };
        let created_at = fields.remove(CREATED_AT_KEY).and_then(|v| v.as_i64());
        let seq = fields
            .remove(SEQ_KEY)
            .and_then(|v| v.as_i64())
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(0);

        Ok(Self {
            id: Some(id),
            doc_type,
            created_at,
            fields,
            meta: DocumentMeta { seq },
        })
    }

    /// Render the document to markdown with envelope and fields in frontmatter
    pub fn render(&self) -> Result<String> {
        let envelope = [
            (ID_KEY, Value::String(self.id_str().to_string())),
            (TYPE_KEY, Value::String(self.doc_type.clone())),
            (CREATED_AT_KEY, self.created_at.map(Value::Int).unwrap_or(Value::Null)),
            (SEQ_KEY, Value::Int(self.meta.seq as i64)),
        ];
        super::frontmatter::render(&envelope, &self.fields).map_err(|e| Error::Serialize {
            id: self.id_str().to_string(),
            message: e.to_string(),
        })
    }

    /// Export as a flat JSON object (envelope plus fields)
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(id) = &self.id {
            obj.insert(ID_KEY.to_string(), serde_json::Value::String(id.clone()));
        }
        obj.insert(TYPE_KEY.to_string(), serde_json::Value::String(self.doc_type.clone()));
        if let Some(created_at) = self.created_at {
            obj.insert(CREATED_AT_KEY.to_string(), created_at.into());
        }
        for (key, value) in &self.fields {
            obj.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(obj)
    }
}
