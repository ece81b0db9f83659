//! YAML frontmatter parsing and rendering
//!
//! Documents are stored as markdown files whose frontmatter carries the
//! envelope followed by the variant fields:
//!
//! ```markdown
//! ---
//! id: 6f1c...
//! type: testimonial
//! created_at: 1718000000000
//! _seq: 3
//! name: Alice
//! service: Screen repair
//! text: Great!
//! ---
//! ```

use super::document::{Fields, Value};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Parse the YAML frontmatter of a stored document
///
/// Content without frontmatter yields no fields. Anything after the closing
/// `---` is ignored.
pub fn parse(content: &str) -> Result<Fields> {
    let content = content.trim_start();

    let Some(rest) = content.strip_prefix("---") else {
        return Ok(Fields::new());
    };
    let end_pos = rest
        .find("\n---")
        .ok_or_else(|| Error::storage("Unclosed frontmatter: missing closing ---"))?;

    let yaml_value: serde_yaml::Value = serde_yaml::from_str(rest[..end_pos].trim())?;
    yaml_to_fields(yaml_value)
}

/// Convert serde_yaml::Value to our Fields type
fn yaml_to_fields(value: serde_yaml::Value) -> Result<Fields> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut fields = Fields::new();
            for (k, v) in map {
                let key = k
                    .as_str()
                    .ok_or_else(|| Error::storage("Non-string key in frontmatter"))?
                    .to_string();
                fields.insert(key, yaml_value_to_value(v));
            }
            Ok(fields)
        }
        serde_yaml::Value::Null => Ok(Fields::new()),
        _ => Err(Error::storage("Frontmatter must be a YAML mapping")),
    }
}

/// Convert a serde_yaml::Value to our Value type
fn yaml_value_to_value(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Null
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_value_to_value).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let obj: HashMap<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| {
                    k.as_str().map(|key| (key.to_string(), yaml_value_to_value(v)))
                })
                .collect();
            Value::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_value_to_value(tagged.value),
    }
}

/// Convert our Value to serde_yaml::Value
fn value_to_yaml(v: &Value) -> serde_yaml::Value {
    match v {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number(serde_yaml::Number::from(*f)),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(arr) => {
            serde_yaml::Value::Sequence(arr.iter().map(value_to_yaml).collect())
        }
        Value::Object(obj) => {
            let mut keys: Vec<_> = obj.keys().collect();
            keys.sort();
            let map: serde_yaml::Mapping = keys
                .into_iter()
                .map(|k| (serde_yaml::Value::String(k.clone()), value_to_yaml(&obj[k])))
                .collect();
            serde_yaml::Value::Mapping(map)
        }
    }
}

/// Render envelope entries, then fields in key order
pub fn render(
    envelope: &[(&str, Value)],
    fields: &Fields,
) -> std::result::Result<String, serde_yaml::Error> {
    let mut yaml_map = serde_yaml::Mapping::new();
    for (key, value) in envelope {
        yaml_map.insert(serde_yaml::Value::String((*key).to_string()), value_to_yaml(value));
    }

    let mut keys: Vec<_> = fields.keys().collect();
    keys.sort();
    for key in keys {
        yaml_map.insert(serde_yaml::Value::String(key.clone()), value_to_yaml(&fields[key]));
    }

    let yaml_str = serde_yaml::to_string(&serde_yaml::Value::Mapping(yaml_map))?;
    Ok(format!("---\n{}---\n", yaml_str))
}
