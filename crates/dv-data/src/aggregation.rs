//! Aggregation primitives over raw and pre-aggregated values

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sources::Row;
use crate::{DataViewError, Result};

/// Column holding the number of features folded into a pre-aggregated row
pub const FEATURE_COUNT_COLUMN: &str = "_cdb_feature_count";

/// Name of the synthesized column carrying `operation` over `column` in
/// pre-aggregated rows
pub fn aggregated_column_name(operation: Operation, column: &str) -> String {
    format!("_cdb_agg_{}_{}", operation.name(), column)
}

/// Aggregation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Nearest-rank percentile, 0..=100
    Percentile(u8),
}

impl Operation {
    /// Operation name without the percentile argument
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Count => "count",
            Operation::Sum => "sum",
            Operation::Avg => "avg",
            Operation::Min => "min",
            Operation::Max => "max",
            Operation::Percentile(_) => "percentile",
        }
    }

    /// Aggregate raw values. `None` entries are nulls.
    pub fn aggregate(&self, values: &[Option<f64>]) -> Aggregated {
        if *self == Operation::Count {
            return Aggregated {
                result: Some(values.len() as f64),
                null_count: 0,
            };
        }

        let finite: Vec<f64> = values
            .iter()
            .filter_map(|v| v.filter(|v| v.is_finite()))
            .collect();
        let null_count = values.len() - finite.len();

        let result = match self {
            Operation::Count => Some(values.len() as f64),
            Operation::Sum => Some(finite.iter().sum()),
            Operation::Avg => {
                if finite.is_empty() {
                    None
                } else {
                    Some(finite.iter().sum::<f64>() / finite.len() as f64)
                }
            }
            Operation::Min => finite.iter().copied().reduce(f64::min),
            Operation::Max => finite.iter().copied().reduce(f64::max),
            Operation::Percentile(p) => nearest_rank(finite, *p),
        };

        Aggregated { result, null_count }
    }

    /// Aggregate rows that are themselves aggregations of several features
    pub fn aggregate_features(&self, features: &[AggregatedFeature]) -> Result<Aggregated> {
        let count: f64 = features.iter().map(|f| f.feature_count).sum();
        let sum: f64 = features
            .iter()
            .map(|f| f.aggregated_value * f.feature_count)
            .sum();

        let result = match self {
            Operation::Count => Some(count),
            Operation::Sum => Some(sum),
            Operation::Avg => (count > 0.0).then(|| sum / count),
            Operation::Min => features.iter().map(|f| f.aggregated_value).reduce(f64::min),
            Operation::Max => features.iter().map(|f| f.aggregated_value).reduce(f64::max),
            Operation::Percentile(_) => {
                return Err(DataViewError::UnimplementedAggregation(format!(
                    "{} over pre-aggregated features",
                    self
                )))
            }
        };

        Ok(Aggregated {
            result,
            null_count: 0,
        })
    }
}

fn nearest_rank(mut values: Vec<f64>, percentile: u8) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let index = (percentile as f64 / 100.0 * values.len() as f64).floor() as usize;
    values.get(index.min(values.len() - 1)).copied()
}

impl FromStr for Operation {
    type Err = DataViewError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, argument) = match s.split_once('_') {
            Some((name, argument)) => (name, Some(argument)),
            None => (s, None),
        };

        match name {
            "count" => Ok(Operation::Count),
            "sum" => Ok(Operation::Sum),
            "avg" => Ok(Operation::Avg),
            "min" => Ok(Operation::Min),
            "max" => Ok(Operation::Max),
            "percentile" => parse_percentile(argument).map(Operation::Percentile),
            _ => Err(DataViewError::UnimplementedAggregation(s.to_string())),
        }
    }
}

fn parse_percentile(argument: Option<&str>) -> Result<u8> {
    let value = argument.and_then(|a| a.parse::<f64>().ok()).unwrap_or(f64::NAN);
    if value.is_nan() {
        return Err(DataViewError::InvalidPercentile("NaN".to_string()));
    }
    if value.fract() != 0.0 || !(0.0..=100.0).contains(&value) {
        return Err(DataViewError::InvalidPercentile(value.to_string()));
    }
    Ok(value as u8)
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Percentile(p) => write!(f, "percentile_{}", p),
            other => f.write_str(other.name()),
        }
    }
}

impl TryFrom<String> for Operation {
    type Error = DataViewError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Operation> for String {
    fn from(operation: Operation) -> Self {
        operation.to_string()
    }
}

/// Result of an aggregation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregated {
    /// `None` when there was nothing to aggregate (avg/min/max/percentile of no values)
    pub result: Option<f64>,
    pub null_count: usize,
}

/// Row of a pre-aggregated tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedFeature {
    pub aggregated_value: f64,
    pub feature_count: f64,
}

/// Aggregate raw values with an operation given by name (`avg`, `percentile_90`, ...)
pub fn aggregate_values(values: &[Option<f64>], operation: &str) -> Result<Aggregated> {
    let operation: Operation = operation.parse()?;
    Ok(operation.aggregate(values))
}

/// Aggregate pre-aggregated `(value, count)` pairs with an operation given by name
pub fn aggregate_features(features: &[AggregatedFeature], operation: &str) -> Result<Aggregated> {
    let operation: Operation = operation.parse()?;
    operation.aggregate_features(features)
}

/// Numeric reading of a JSON value; non-numbers read as `None`
pub fn numeric_value(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

/// Whether a row value counts as null (absent or JSON null)
pub fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Category name of a key value
pub fn category_name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => "null".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Values grouped by category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedValues {
    /// Buckets in order of first appearance
    pub groups: IndexMap<String, Vec<Option<f64>>>,
    pub null_count: usize,
}

/// Group the values of `value_column` by the value of `key_column`.
///
/// Every key gets a bucket, even when all of its values are null; null
/// values are counted instead of pushed.
pub fn group_values_by_column(rows: &[Row], value_column: &str, key_column: &str) -> GroupedValues {
    let mut grouped = GroupedValues::default();

    for row in rows {
        let key = category_name(row.get(key_column));
        let bucket = grouped.groups.entry(key).or_default();

        let value = row.get(value_column);
        if is_null(value) {
            grouped.null_count += 1;
        } else {
            bucket.push(numeric_value(value));
        }
    }

    grouped
}
