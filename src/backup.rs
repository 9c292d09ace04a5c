//! Backup Codec
//!
//! Exports every known checklist's persisted state into one portable JSON
//! snapshot and merges such a snapshot back into the record store.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::models::{count_key, total_key};
use crate::store::RecordStore;

/// The only snapshot schema version accepted on import
pub const SNAPSHOT_VERSION: u32 = 1;

const INVALID_FORMAT: &str = "Invalid backup file format.";

/// Full-state export of every known checklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub version: u32,
    pub exported_at: String,
    /// Record store key -> raw persisted value
    pub data: BTreeMap<String, Value>,
}

impl BackupSnapshot {
    /// Pretty JSON with sorted keys, stable for identical store contents
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Outcome of a successful import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Number of record store keys overwritten
    pub keys_written: usize,
}

/// Assemble a snapshot of the current store contents
///
/// Missing or unreadable records export as `{}`, missing counters as `"0"`.
pub fn build_snapshot(store: &impl RecordStore, config: &TrackerConfig, now: DateTime<Utc>) -> BackupSnapshot {
    let mut data = BTreeMap::new();
    for key in config.keys() {
        let record = store
            .get(key)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .filter(is_truthy)
            .unwrap_or_else(|| Value::Object(Map::new()));
        data.insert(key.to_string(), record);

        for counter in [count_key(key), total_key(key)] {
            let value = store.get(&counter).unwrap_or_else(|| "0".to_string());
            data.insert(counter, Value::String(value));
        }
    }

    BackupSnapshot {
        version: SNAPSHOT_VERSION,
        exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        data,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Check version and shape, returning the `data` mapping
fn validate(snapshot: Option<&Value>) -> TrackerResult<&Map<String, Value>> {
    let Some(Value::Object(root)) = snapshot else {
        return Err(TrackerError::Format(INVALID_FORMAT.to_string()));
    };
    // `1` and `1.0` are the same number
    if root.get("version").and_then(Value::as_f64) != Some(f64::from(SNAPSHOT_VERSION)) {
        return Err(TrackerError::Format(INVALID_FORMAT.to_string()));
    }
    match root.get("data") {
        Some(Value::Object(data)) => Ok(data),
        _ => Err(TrackerError::Format(INVALID_FORMAT.to_string())),
    }
}

/// Largest integer a browser number holds exactly
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Decimal text of a number as a browser prints it: `2.0` is `"2"`,
/// `1e21` is `"1e+21"`
fn js_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64().filter(|i| i.unsigned_abs() <= MAX_SAFE_INTEGER) {
        return i.to_string();
    }
    if let Some(u) = n.as_u64().filter(|u| *u <= MAX_SAFE_INTEGER) {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{}", f);
    }
    let text = format!("{:e}", f);
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => text,
    }
}

/// Counter values are stored as the browser's string form of the value
fn counter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => js_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { counter_text(item) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Whether a key is an array index, which browsers enumerate first
fn array_index(key: &str) -> Option<u32> {
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|i| *i != u32::MAX)
}

/// Compact JSON text of a record, as a browser would serialize it after
/// parsing: document key order, index-like keys first, browser numbers
fn js_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_js(value, &mut out);
    out
}

fn write_js(value: &Value, out: &mut String) {
    match value {
        Value::Number(n) => out.push_str(&js_number(n)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_js(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut indexed: Vec<(u32, &String, &Value)> = Vec::new();
            let mut named: Vec<(&String, &Value)> = Vec::new();
            for (key, item) in map {
                match array_index(key) {
                    Some(i) => indexed.push((i, key, item)),
                    None => named.push((key, item)),
                }
            }
            indexed.sort_by_key(|(i, _, _)| *i);
            let ordered = indexed.into_iter().map(|(_, k, v)| (k, v)).chain(named);

            out.push('{');
            for (n, (key, item)) in ordered.enumerate() {
                if n > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_js(item, out);
            }
            out.push('}');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Merge a snapshot into the store
///
/// The whole snapshot is validated before anything is written. Each known
/// key is then overwritten only when `data` carries a non-null value for it;
/// absent fields leave the stored value untouched. A failed write stops the
/// import; keys written before it keep their new values and the error says
/// how many there were.
pub fn apply_snapshot(
    store: &impl RecordStore,
    config: &TrackerConfig,
    snapshot: Option<&Value>,
) -> TrackerResult<ImportReport> {
    let data = validate(snapshot)?;

    let mut writes: Vec<(String, String)> = Vec::new();
    for key in config.keys() {
        if let Some(record) = data.get(key).filter(|v| !v.is_null()) {
            writes.push((key.to_string(), js_stringify(record)));
        }
        for counter in [count_key(key), total_key(key)] {
            if let Some(value) = data.get(&counter).filter(|v| !v.is_null()) {
                writes.push((counter, counter_text(value)));
            }
        }
    }

    for (written, (key, value)) in writes.iter().enumerate() {
        if let Err(err) = store.set(key, value) {
            let reason = match err {
                TrackerError::Storage(msg) => msg,
                other => other.to_string(),
            };
            warn!("Import stopped at {}: {}", key, reason);
            return Err(TrackerError::Storage(format!(
                "import stopped after {} of {} keys: {}",
                written,
                writes.len(),
                reason
            )));
        }
    }
    info!("Imported backup: {} keys written", writes.len());
    Ok(ImportReport {
        keys_written: writes.len(),
    })
}

/// Parse backup file text and merge it into the store
pub fn import_json(store: &impl RecordStore, config: &TrackerConfig, raw: &str) -> TrackerResult<ImportReport> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| TrackerError::Format(format!("{} ({})", INVALID_FORMAT, err)))?;
    apply_snapshot(store, config, Some(&value))
}
