use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One recall event as published upstream. The field set is not fixed, so the
/// document is kept as a free-form JSON object keyed by `recall_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecallRecord(Map<String, Value>);

impl RecallRecord {
    /// Wraps a result document. Returns `None` unless it is an object carrying
    /// a non-empty string `recall_number`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let record = Self(map);
                if record.recall_number().is_some() {
                    Some(record)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// The exact upstream key. Blank values count as missing.
    pub fn recall_number(&self) -> Option<&str> {
        self.field("recall_number").filter(|s| !s.trim().is_empty())
    }

    /// String value of `key`, if present and a string.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn product_description(&self) -> Option<&str> {
        self.field("product_description")
    }

    pub fn reason_for_recall(&self) -> Option<&str> {
        self.field("reason_for_recall")
    }

    pub fn classification(&self) -> Option<&str> {
        self.field("classification")
    }

    pub fn status(&self) -> Option<&str> {
        self.field("status")
    }

    /// Upstream `YYYYMMDD` report date, unparsed.
    pub fn report_date(&self) -> Option<&str> {
        self.field("report_date")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Canonical serialized form used for storage and change detection.
    pub fn to_document(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    pub fn from_document(document: &str) -> serde_json::Result<Self> {
        serde_json::from_str(document)
    }
}

/// Body of an enforcement query: `{"meta": {...}, "results": [...]}`.
#[derive(Debug, Deserialize)]
pub struct EnforcementResponse {
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl EnforcementResponse {
    /// Total matches reported in `meta.results.total`, when present.
    pub fn total(&self) -> Option<u64> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.pointer("/results/total"))
            .and_then(Value::as_u64)
    }
}
