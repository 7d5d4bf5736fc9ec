//! Outbound payload encoding and the scan request schema hint.

use serde_json::Value;

/// Errors from encoding a user-submitted payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses user input as JSON and returns its canonical encoding.
///
/// Object keys come out sorted and insignificant whitespace is dropped,
/// so equal documents always encode to equal bytes.
pub fn encode_payload(input: &str) -> Result<Vec<u8>, PayloadError> {
    if input.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    let value: Value = serde_json::from_str(input)?;
    Ok(serde_json::to_vec(&value)?)
}

/// JSON type expected for a scan request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFieldKind {
    Integer,
    Boolean,
    List,
    Text,
}

impl ScanFieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Text => value.is_string(),
        }
    }
}

/// Fields the server requires in a scan request, with their types.
pub const SCAN_FIELDS: &[(&str, ScanFieldKind)] = &[
    ("SIMILARITY_THRESHOLD", ScanFieldKind::Integer),
    ("CHEATER_REPORT", ScanFieldKind::Boolean),
    ("QUICK_MODE", ScanFieldKind::Boolean),
    ("MAX_THREADS", ScanFieldKind::Integer),
    ("LEGACY", ScanFieldKind::Boolean),
    ("TESTS", ScanFieldKind::Boolean),
    ("EXCEL", ScanFieldKind::Boolean),
    ("owners", ScanFieldKind::List),
    ("repository", ScanFieldKind::Text),
    ("cohort", ScanFieldKind::Text),
    ("course", ScanFieldKind::Text),
];

/// Returns the scan fields that are missing from `value` or have the
/// wrong type. A non-object value mismatches every field.
pub fn mismatched_scan_fields(value: &Value) -> Vec<&'static str> {
    let Some(obj) = value.as_object() else {
        return SCAN_FIELDS.iter().map(|(name, _)| *name).collect();
    };
    SCAN_FIELDS
        .iter()
        .filter(|(name, kind)| !obj.get(*name).is_some_and(|v| kind.matches(v)))
        .map(|(name, _)| *name)
        .collect()
}
