//! Tracker Models
//!
//! Checklist definitions, persisted records and summary counters, plus the
//! key layout they share in the record store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TrackerError, TrackerResult};

/// Key suffix for the last committed selection count
pub const COUNT_SUFFIX: &str = "_count";
/// Key suffix for the checklist's total item count
pub const TOTAL_SUFFIX: &str = "_total";

/// Record store key holding the committed count of a checklist
pub fn count_key(storage_key: &str) -> String {
    format!("{}{}", storage_key, COUNT_SUFFIX)
}

/// Record store key holding the total item count of a checklist
pub fn total_key(storage_key: &str) -> String {
    format!("{}{}", storage_key, TOTAL_SUFFIX)
}

/// One collapsible group of items within a checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    /// Item names in display order
    #[serde(alias = "names")]
    pub items: Vec<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, title: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Static description of one class checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistDefinition {
    pub title: String,
    pub storage_key: String,
    pub categories: Vec<Category>,
}

impl ChecklistDefinition {
    pub fn new(title: impl Into<String>, storage_key: impl Into<String>, categories: Vec<Category>) -> Self {
        Self {
            title: title.into(),
            storage_key: storage_key.into(),
            categories,
        }
    }

    /// Total number of items across all categories
    pub fn total(&self) -> usize {
        self.categories.iter().map(Category::len).sum()
    }

    pub fn category_index(&self, id: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.id == id)
    }
}

/// Persisted selections: category id -> selected item indices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecklistRecord {
    pub selections: BTreeMap<String, Vec<usize>>,
}

impl ChecklistRecord {
    /// Parse a persisted record
    ///
    /// Entries that are not arrays and indices that are not non-negative
    /// integers are skipped. A document that is not a JSON object is a
    /// parse error.
    pub fn parse(raw: &str) -> TrackerResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let object = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(TrackerError::Parse(format!(
                    "expected an object, found {}",
                    json_kind(&other)
                )))
            }
        };

        let mut selections = BTreeMap::new();
        for (id, entry) in object {
            let Value::Array(indices) = entry else { continue };
            let indices = indices
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|i| usize::try_from(i).ok())
                .collect();
            selections.insert(id, indices);
        }
        Ok(Self { selections })
    }

    pub fn to_json(&self) -> String {
        // A map of strings to integer lists always serializes
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn indices(&self, category_id: &str) -> &[usize] {
        self.selections.get(category_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Committed count and total of one checklist, as read from the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounters {
    pub count: Option<i64>,
    pub total: Option<i64>,
}

impl SummaryCounters {
    /// A class is complete once it has items and all of them are committed
    pub fn is_complete(&self) -> bool {
        match (self.count, self.total) {
            (Some(count), Some(total)) => total > 0 && count >= total,
            _ => false,
        }
    }
}

/// Lenient integer parse: optional sign followed by leading digits
///
/// Trailing garbage is ignored; no digits at all yields `None`.
pub fn parse_counter(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits.bytes().take_while(u8::is_ascii_digit).count();
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Colour band of the global counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressTier {
    Low,
    Medium,
    Complete,
}

impl ProgressTier {
    pub fn of(checked: usize, total: usize) -> Self {
        if checked >= total {
            ProgressTier::Complete
        } else if checked * 2 >= total {
            ProgressTier::Medium
        } else {
            ProgressTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressTier::Low => "low",
            ProgressTier::Medium => "medium",
            ProgressTier::Complete => "complete",
        }
    }
}

/// Aggregate state of the "select all" toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectAllState {
    Unchecked,
    Indeterminate,
    Checked,
}

impl SelectAllState {
    pub fn of(checked: usize, total: usize) -> Self {
        if total > 0 && checked == total {
            SelectAllState::Checked
        } else if checked > 0 && checked < total {
            SelectAllState::Indeterminate
        } else {
            SelectAllState::Unchecked
        }
    }
}
