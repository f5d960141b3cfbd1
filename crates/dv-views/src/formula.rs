//! Formula: one aggregated value over a column

use async_trait::async_trait;
use dv_data::aggregation::{aggregated_column_name, AggregatedFeature, FEATURE_COUNT_COLUMN};
use dv_data::{DataViewError, LocalSource, Operation, RemoteSource, Result, Row};
use serde::Serialize;
use serde_json::Value;

use crate::kind::{DataViewKind, DataViewResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaResult {
    pub result: Option<f64>,
    pub operation: Operation,
    pub null_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formula {
    pub operation: Operation,
}

impl Formula {
    pub fn new(operation: Option<&str>) -> Result<Self> {
        let operation = operation
            .ok_or_else(|| DataViewError::missing("operation"))?
            .parse()?;
        Ok(Self { operation })
    }
}

/// Numeric value of a row entry. Absent and null entries read as `None`;
/// anything else that is not a number is rejected.
fn checked_value(column: &str, value: Option<&Value>) -> Result<Option<f64>> {
    let kind = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => return Ok(n.as_f64()),
        Some(Value::String(_)) => "string",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    };
    let shown = value.map(Value::to_string).unwrap_or_default();

    Err(DataViewError::invalid(
        "column",
        format!("column '{}' holds a {} value ({}), expected a number", column, kind, shown),
    ))
}

/// Pre-aggregated rows carry the feature count and a synthesized value column
fn pre_aggregated(rows: &[Row], aggregated_column: &str) -> Option<Vec<AggregatedFeature>> {
    let first = rows.first()?;
    if first.get(FEATURE_COUNT_COLUMN).map_or(true, Value::is_null) || !first.contains_key(aggregated_column) {
        return None;
    }

    Some(
        rows.iter()
            .filter_map(|row| {
                Some(AggregatedFeature {
                    aggregated_value: row.get(aggregated_column)?.as_f64()?,
                    feature_count: row.get(FEATURE_COUNT_COLUMN)?.as_f64()?,
                })
            })
            .collect(),
    )
}

#[async_trait]
impl DataViewKind for Formula {
    async fn get_local_data(
        &self,
        source: &LocalSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        let aggregated_column = aggregated_column_name(self.operation, column);
        let columns = [
            column.to_string(),
            FEATURE_COUNT_COLUMN.to_string(),
            aggregated_column.clone(),
        ];
        let rows = source.rows(&columns, excluded).await?;

        let aggregated = match pre_aggregated(&rows, &aggregated_column) {
            Some(features) => {
                tracing::debug!("Formula over {} pre-aggregated rows", features.len());
                self.operation.aggregate_features(&features)?
            }
            None => {
                let values = rows
                    .iter()
                    .map(|row| checked_value(column, row.get(column)))
                    .collect::<Result<Vec<_>>>()?;
                self.operation.aggregate(&values)
            }
        };

        Ok(DataViewResult::Formula(FormulaResult {
            result: aggregated.result,
            operation: self.operation,
            null_count: aggregated.null_count,
        }))
    }

    async fn get_remote_data(
        &self,
        source: &RemoteSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        let response = source.formula(column, self.operation, excluded).await?;

        Ok(DataViewResult::Formula(FormulaResult {
            result: response.result,
            operation: self.operation,
            null_count: response.nulls,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_data::{GeoJsonSource, Source, Target};
    use serde_json::json;

    fn local(rows: Value) -> LocalSource {
        let data = GeoJsonSource::from_rows(serde_json::from_value(rows).unwrap());
        LocalSource::new(&Target::Source(Source::GeoJson(data)), false).unwrap()
    }

    #[tokio::test]
    async fn test_avg_skips_nulls() {
        let source = local(json!([
            {"pop": 10}, {"pop": 20}, {"pop": 30}, {"pop": 40},
            {"pop": null}, {}, {"pop": 50}, {"pop": 90}
        ]));
        let formula = Formula::new(Some("avg")).unwrap();

        let result = formula.get_local_data(&source, "pop", &[]).await.unwrap();
        assert_eq!(
            result,
            DataViewResult::Formula(FormulaResult {
                result: Some(40.0),
                operation: Operation::Avg,
                null_count: 2,
            })
        );
    }

    #[tokio::test]
    async fn test_string_value_is_invalid() {
        let source = local(json!([{"pop": 10}, {"pop": "30"}]));
        let formula = Formula::new(Some("sum")).unwrap();

        let err = formula.get_local_data(&source, "pop", &[]).await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, DataViewError::PropertyInvalid { .. }));
        assert!(message.contains("string"));
        assert!(message.contains("\"30\""));
    }

    #[tokio::test]
    async fn test_pre_aggregated_rows() {
        let source = local(json!([
            {"_cdb_feature_count": 2, "_cdb_agg_avg_pop": 10},
            {"_cdb_feature_count": 3, "_cdb_agg_avg_pop": 20}
        ]));
        let formula = Formula::new(Some("avg")).unwrap();

        let DataViewResult::Formula(result) = formula.get_local_data(&source, "pop", &[]).await.unwrap() else {
            panic!("expected a formula result");
        };
        assert_eq!(result.result, Some(16.0));
        assert_eq!(result.null_count, 0);
    }

    #[test]
    fn test_operation_required() {
        assert_eq!(Formula::new(None), Err(DataViewError::missing("operation")));
        assert!(matches!(
            Formula::new(Some("median")),
            Err(DataViewError::UnimplementedAggregation(_))
        ));
    }

    #[test]
    fn test_result_serialization() {
        let result = FormulaResult {
            result: Some(40.0),
            operation: Operation::Percentile(90),
            null_count: 2,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"result": 40.0, "operation": "percentile_90", "nullCount": 2})
        );
    }
}
