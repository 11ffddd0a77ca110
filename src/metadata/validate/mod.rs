// Validation of raw metadata before it is normalized and submitted.
// All violations are collected so a caller can report them in one pass.


use serde::Serialize;
use serde_json::Value;

use super::normalize::parse_timestamp;
use super::{Priority, RawMetadata, RecordKind, STRUCTURED_FIELDS, Zone, fields};

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Validation {
    pub errors: Vec<String>,
}

impl Validation {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    #[inline]
    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Check a raw record of the given kind.
#[inline]
pub fn validate(raw: &RawMetadata, kind: RecordKind) -> Validation {
    let mut validation = Validation::default();

    for field in kind.required_fields() {
        if raw.present(field).is_none() {
            validation.push(format!("Missing required field: {field}"));
        }
    }

    for field in kind.key_fields() {
        match raw.present(field) {
            Some(Value::String(s)) if s.trim().is_empty() => {
                validation.push(format!("Field {field} must not be empty"));
            }
            Some(Value::Array(_) | Value::Object(_)) => {
                validation.push(format!("Field {field} must be a string"));
            }
            _ => {}
        }
    }

    match kind {
        RecordKind::Dataset => check_dataset(raw, &mut validation),
        RecordKind::Relationship => {}
        RecordKind::DomainTag => check_domain_tag(raw, &mut validation),
    }

    validation
}

fn check_dataset(raw: &RawMetadata, validation: &mut Validation) {
    if let Some(columns) = raw.present(fields::COLUMNS_ARRAY) {
        if !columns.is_array() {
            validation.push(format!("Field {} must be a list", fields::COLUMNS_ARRAY));
        }
    }

    if let Some(count) = raw.present(fields::RECORD_COUNT) {
        match count.as_f64() {
            None => validation.push(format!("Field {} must be a number", fields::RECORD_COUNT)),
            Some(n) if n < 0.0 => {
                validation.push(format!("Field {} must not be negative", fields::RECORD_COUNT));
            }
            Some(_) => {}
        }
    }

    for field in STRUCTURED_FIELDS {
        if let Some(message) = raw.present(field).and_then(|value| check_document(field, value)) {
            validation.push(message);
        }
    }

    // Blank and structured zones are already reported above.
    let zone_error = match raw.present(fields::ZONE) {
        Some(Value::String(zone)) if !zone.trim().is_empty() => zone.parse::<Zone>().err(),
        Some(other @ (Value::Number(_) | Value::Bool(_))) => other.to_string().parse::<Zone>().err(),
        _ => None,
    };
    if let Some(message) = zone_error {
        validation.push(message);
    }

    for field in [fields::METADATA_CREATED_AT, fields::DATA_LAST_MODIFIED_AT] {
        if let Some(value) = raw.present(field) {
            if value.as_str().and_then(parse_timestamp).is_none() {
                validation.push(format!("Field {field} must be an ISO-8601 timestamp"));
            }
        }
    }
}

fn check_domain_tag(raw: &RawMetadata, validation: &mut Validation) {
    match raw.present(fields::BUSINESS_PRIORITY) {
        None => {}
        Some(Value::String(priority)) => {
            if let Err(message) = priority.parse::<Priority>() {
                validation.push(message);
            }
        }
        Some(other) => {
            if let Err(message) = other.to_string().parse::<Priority>() {
                validation.push(message);
            }
        }
    }
}

/// Structured documents may be native objects/arrays or JSON text encoding
/// one. Empty values are not checked.
fn check_document(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Object(_) | Value::Array(_) => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(_) | Value::Array(_)) => None,
            Ok(_) => Some(format!("Field {field} must encode a JSON object or array")),
            Err(_) => Some(format!("Field {field} contains invalid JSON")),
        },
        _ => Some(format!("Field {field} must be JSON string or object/array")),
    }
}
