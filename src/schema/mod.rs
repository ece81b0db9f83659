//! Result schemas for structured generation
//!
//! A schema declares the shape of each item in a generated result array:
//! an ordered list of field names with primitive kinds. It is used twice:
//!
//! - rendered to JSON Schema and sent with the generation request
//! - checked structurally against the parsed payload before anything is
//!   trusted or persisted
//!
//! Declared fields must be present with the declared kind; extra fields are
//! dropped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::storage::document::{Fields, Value};

/// Primitive kind of a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    /// JSON Schema type name
    pub fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Json) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }
}

/// Definition of a single field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Human-readable description passed to the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declared shape of a generated result array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultSchema {
    /// Property name wrapping the array, e.g. `testimonials`
    pub root: String,
    /// Item fields, in declaration order
    pub fields: Vec<FieldDef>,
}

impl ResultSchema {
    /// Create an empty schema whose array is wrapped under `root`
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field definition
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            description: None,
        });
        self
    }

    /// Add a field definition with a description
    pub fn described_field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            description: Some(description.into()),
        });
        self
    }

    /// Render as a JSON Schema object
    ///
    /// ```text
    /// { type: object, properties: { <root>: { type: array, items: { ... } } }, required: [<root>] }
    /// ```
    pub fn to_json_schema(&self) -> Json {
        let mut properties = Map::new();
        for def in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), Json::String(def.kind.json_type().into()));
            if let Some(description) = &def.description {
                prop.insert("description".into(), Json::String(description.clone()));
            }
            properties.insert(def.name.clone(), Json::Object(prop));
        }
        let required: Vec<&str> = self.fields.iter().map(|d| d.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": {
                self.root.as_str(): {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                        "additionalProperties": false
                    }
                }
            },
            "required": [self.root.as_str()],
            "additionalProperties": false
        })
    }

    /// Validate a parsed payload and extract the declared fields of each item
    ///
    /// The payload may be the bare array or an object with the array under
    /// `root`.
    pub fn validate(&self, payload: &Json) -> Result<Vec<Fields>, ValidationError> {
        let items = match payload {
            Json::Array(items) => items,
            Json::Object(obj) => match obj.get(&self.root) {
                Some(Json::Array(items)) => items,
                Some(_) => return Err(ValidationError::RootNotArray(self.root.clone())),
                None => return Err(ValidationError::MissingRoot(self.root.clone())),
            },
            _ => return Err(ValidationError::NotAnArray),
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.validate_item(index, item))
            .collect()
    }

    fn validate_item(&self, index: usize, item: &Json) -> Result<Fields, ValidationError> {
        let obj = item.as_object().ok_or(ValidationError::ItemNotObject(index))?;

        let mut fields = Fields::new();
        for def in &self.fields {
            let value = obj.get(&def.name).ok_or_else(|| ValidationError::MissingField {
                index,
                field: def.name.clone(),
            })?;
            if !def.kind.accepts(value) {
                return Err(ValidationError::TypeMismatch {
                    index,
                    field: def.name.clone(),
                    expected: def.kind.json_type(),
                    actual: json_type_name(value),
                });
            }
            fields.insert(def.name.clone(), Value::from(value.clone()));
        }
        Ok(fields)
    }
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_f64() => "number",
        Json::Number(_) => "integer",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Validation error
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("expected an array of items")]
    NotAnArray,
    #[error("missing result property '{0}'")]
    MissingRoot(String),
    #[error("result property '{0}' is not an array")]
    RootNotArray(String),
    #[error("item {0} is not an object")]
    ItemNotObject(usize),
    #[error("item {index} is missing required field '{field}'")]
    MissingField { index: usize, field: String },
    #[error("item {index} field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        index: usize,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
}
