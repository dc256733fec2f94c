//! Typed search attribute translation.
//!
//! The worker ships a loose JSON map; the SDK wants typed updates. Bad
//! entries are skipped with a warning so one stale attribute cannot wedge a
//! workflow — except Datetime parse failures, which fail the whole batch
//! before anything reaches the SDK.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::BridgeError;

/// Server-side index type of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedValueType {
    Bool,
    Float64,
    Int64,
    Keyword,
    KeywordList,
    String,
    Datetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchAttributeOperation {
    Set,
    Unset,
}

/// One entry of the `UpsertWorkflowTypedSearchAttributes` options map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedSearchAttribute {
    #[serde(rename = "type")]
    pub kind: IndexedValueType,
    pub operation: SearchAttributeOperation,
    #[serde(default)]
    pub value: Option<Value>,
}

impl Default for TypedSearchAttribute {
    fn default() -> Self {
        Self {
            kind: IndexedValueType::String,
            operation: SearchAttributeOperation::Set,
            value: None,
        }
    }
}

/// Typed value accepted by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    Float64(f64),
    Int64(i64),
    Keyword(String),
    KeywordList(Vec<String>),
    Text(String),
    Datetime(DateTime<Utc>),
}

/// One update handed to `upsert_typed_search_attributes`.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchAttributeUpdate {
    Set { key: String, value: TypedValue },
    /// Type-specific value-unset marker; any provided value is ignored.
    Unset { key: String, kind: IndexedValueType },
}

/// Translate the worker's loose map into typed updates.
///
/// Mismatched or missing Set values are skipped with a warning; an
/// unparsable Datetime string fails the batch and discards the updates
/// translated so far.
pub fn translate(
    attributes: &BTreeMap<String, TypedSearchAttribute>,
) -> Result<Vec<SearchAttributeUpdate>, BridgeError> {
    let mut updates = Vec::with_capacity(attributes.len());

    for (key, attr) in attributes {
        if attr.operation == SearchAttributeOperation::Unset {
            updates.push(SearchAttributeUpdate::Unset {
                key: key.clone(),
                kind: attr.kind,
            });
            continue;
        }

        let Some(value) = &attr.value else {
            warn!(key = %key, "search attribute set without a value, skipping");
            continue;
        };

        let typed = match (attr.kind, value) {
            (IndexedValueType::Bool, Value::Bool(b)) => TypedValue::Bool(*b),
            (IndexedValueType::Float64, Value::Number(n)) => match n.as_f64() {
                Some(f) => TypedValue::Float64(f),
                None => {
                    warn!(key = %key, %value, "float64 search attribute out of range, skipping");
                    continue;
                }
            },
            (IndexedValueType::Int64, value) => match coerce_int(value) {
                Some(i) => TypedValue::Int64(i),
                None => {
                    warn!(key = %key, %value, "int64 search attribute not numeric, skipping");
                    continue;
                }
            },
            (IndexedValueType::Keyword, Value::String(s)) => TypedValue::Keyword(s.clone()),
            (IndexedValueType::String, Value::String(s)) => TypedValue::Text(s.clone()),
            (IndexedValueType::KeywordList, Value::Array(items)) => {
                // heterogeneous lists keep their string elements
                let keywords: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect();
                TypedValue::KeywordList(keywords)
            }
            (IndexedValueType::Datetime, Value::String(s)) => {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| {
                    BridgeError::Protocol(format!(
                        "search attribute {key}: invalid RFC3339 datetime {s:?}: {e}"
                    ))
                })?;
                TypedValue::Datetime(parsed.with_timezone(&Utc))
            }
            (kind, value) => {
                warn!(key = %key, ?kind, %value, "search attribute value type mismatch, skipping");
                continue;
            }
        };

        updates.push(SearchAttributeUpdate::Set {
            key: key.clone(),
            value: typed,
        });
    }

    Ok(updates)
}

/// Int64 accepts any JSON numeric plus digit strings.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
