use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FilterShape;

/// Numeric range operand of a `within` filter: a single `[low, high]` pair
/// or several of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Within {
    Range([f64; 2]),
    Ranges(Vec<[f64; 2]>),
}

impl Within {
    pub fn ranges(&self) -> Vec<[f64; 2]> {
        match self {
            Within::Range(range) => vec![*range],
            Within::Ranges(ranges) => ranges.clone(),
        }
    }

    fn from_ranges(mut ranges: Vec<[f64; 2]>) -> Option<Self> {
        ranges.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
        ranges.dedup();
        match ranges.len() {
            0 => None,
            1 => Some(Within::Range(ranges[0])),
            _ => Some(Within::Ranges(ranges)),
        }
    }
}

/// Filters applied to one column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// Allowed values
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_values: Option<Vec<Value>>,

    /// Allowed numeric ranges, `[low, high)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<Within>,
}

impl ColumnFilter {
    pub fn is_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            in_values: Some(values.into_iter().map(Into::into).collect()),
            within: None,
        }
    }

    pub fn within(low: f64, high: f64) -> Self {
        Self {
            in_values: None,
            within: Some(Within::Range([low, high])),
        }
    }

    /// AND `other` into this filter: `in` lists intersect, ranges accumulate.
    ///
    /// This is not a plain deep union of both definitions: concatenating two
    /// `in` lists would widen the selection to either list instead of
    /// requiring both widgets to match.
    pub fn merge(&mut self, other: &ColumnFilter) {
        self.in_values = match (self.in_values.take(), &other.in_values) {
            (Some(current), Some(incoming)) => Some(normalize_values(
                current
                    .into_iter()
                    .filter(|value| incoming.iter().any(|i| values_equal(value, i)))
                    .collect(),
            )),
            (Some(current), None) => Some(normalize_values(current)),
            (None, Some(incoming)) => Some(normalize_values(incoming.clone())),
            (None, None) => None,
        };

        let mut ranges: Vec<[f64; 2]> = self.within.take().map(|w| w.ranges()).unwrap_or_default();
        if let Some(within) = &other.within {
            ranges.extend(within.ranges());
        }
        self.within = Within::from_ranges(ranges);
    }
}

/// Column filters keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnFilters(pub BTreeMap<String, ColumnFilter>);

impl ColumnFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, filter: ColumnFilter) -> Self {
        self.0.insert(column.into(), filter);
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ColumnFilter)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FilterShape for ColumnFilters {
    fn merge(&mut self, other: &Self) {
        for (column, filter) in &other.0 {
            self.0.entry(column.clone()).or_default().merge(filter);
        }
    }
}

/// Value equality with numbers compared numerically (`1` equals `1.0`)
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn normalize_values(mut values: Vec<Value>) -> Vec<Value> {
    values.sort_by(compare_values);
    values.dedup_by(|a, b| values_equal(a, b));
    values
}
