//! Canonical keys and duplicate detection.
//!
//! Each record type has a static field tuple whose equality defines "same
//! record". The `exists` pre-check is an optimization only: concurrent
//! workers can race between check and insert, so the store's unique index
//! remains the authoritative guard.

use serde_json::Value;

use crate::error::PipelineError;
use crate::store::Store;

/// The record types the pipeline persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Legislator,
    Expense,
    Amendment,
    Proposition,
    Vote,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Legislator => "legislator",
            RecordType::Expense => "expense",
            RecordType::Amendment => "amendment",
            RecordType::Proposition => "proposition",
            RecordType::Vote => "vote",
        }
    }

    /// The canonical key fields for this type, in order. Static
    /// configuration, never inferred from data.
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            RecordType::Legislator => &["external_id"],
            RecordType::Expense => &[
                "legislator_id",
                "year",
                "month",
                "document_number",
                "net_value",
            ],
            RecordType::Amendment => &["external_id"],
            RecordType::Proposition => &["external_id"],
            RecordType::Vote => &["external_id"],
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record's identity within its type: the key field values joined in
/// declaration order. Compare-only; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the canonical key for a payload, or fails with
/// `MalformedSourceData` when a key field is missing or null.
pub fn canonical_key(record_type: RecordType, payload: &Value) -> Result<CanonicalKey, PipelineError> {
    let mut parts = Vec::new();
    for field in record_type.key_fields() {
        let value = payload.get(*field).filter(|v| !v.is_null()).ok_or_else(|| {
            PipelineError::MalformedSourceData(format!(
                "{} record missing key field {:?}",
                record_type, field
            ))
        })?;
        parts.push(key_part(value));
    }
    Ok(CanonicalKey(parts.join("|")))
}

/// Stable textual form of one key component. Monetary floats render with
/// two decimals so `350.0` and `350.00` collapse.
fn key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:.2}", n.as_f64().unwrap_or(0.0))
            }
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Pre-insert existence check against the persisted store.
pub struct Deduplicator<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> Deduplicator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// True when a record with the same canonical key is already persisted.
    /// Callers treat `true` as "already reconciled, skip".
    pub fn exists(&self, record_type: RecordType, payload: &Value) -> Result<bool, PipelineError> {
        let key = canonical_key(record_type, payload)?;
        Ok(self.store.record_exists(record_type, &key)?)
    }
}
