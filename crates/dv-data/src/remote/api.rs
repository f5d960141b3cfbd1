//! Maps API boundary: request and response shapes of the remote
//! aggregation service

use std::sync::Arc;

use async_trait::async_trait;
use dv_core::{BBox, Credentials};
use serde::{Deserialize, Serialize};

use crate::aggregation::Operation;
use crate::{DataViewError, Result};

/// Error reported by the Maps API inside a response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorContext {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Responses that may carry backend errors
pub trait ApiResponse {
    fn errors(&self) -> &[ApiErrorContext];
}

/// Turn a response carrying errors into [`DataViewError::MapsApi`]. Only the
/// first reported error is surfaced.
pub fn check_errors<R: ApiResponse>(response: R) -> Result<R> {
    let errors = response.errors();
    match errors.first() {
        Some(first) => {
            if errors.len() > 1 {
                tracing::warn!("Maps API reported {} errors, surfacing the first", errors.len());
            }
            Err(DataViewError::MapsApi {
                error_type: first.error_type.clone(),
                message: first.message.clone(),
            })
        }
        None => Ok(response),
    }
}

/// Dataview configuration sent when instantiating a map
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataViewDefinition {
    Formula {
        column: String,
        operation: Operation,
    },
    Aggregation {
        column: String,
        aggregation: Operation,
        #[serde(rename = "aggregationColumn", skip_serializing_if = "Option::is_none")]
        aggregation_column: Option<String>,
    },
    Histogram {
        column: String,
        bins: u32,
    },
}

/// Map instantiation: the (filtered) source query and one dataview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstantiationRequest {
    pub sql: String,
    pub dataview: DataViewDefinition,
}

/// An instantiated map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapInstance {
    #[serde(rename = "layergroupid")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors_with_context: Vec<ApiErrorContext>,
}

impl ApiResponse for MapInstance {
    fn errors(&self) -> &[ApiErrorContext] {
        &self.errors_with_context
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRequest {
    pub column: String,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    pub column: String,
    pub aggregation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramRequest {
    pub column: String,
    pub bins: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
}

impl From<&FormulaRequest> for DataViewDefinition {
    fn from(request: &FormulaRequest) -> Self {
        DataViewDefinition::Formula {
            column: request.column.clone(),
            operation: request.operation,
        }
    }
}

impl From<&AggregationRequest> for DataViewDefinition {
    fn from(request: &AggregationRequest) -> Self {
        DataViewDefinition::Aggregation {
            column: request.column.clone(),
            aggregation: request.aggregation,
            aggregation_column: request.aggregation_column.clone(),
        }
    }
}

impl From<&HistogramRequest> for DataViewDefinition {
    fn from(request: &HistogramRequest) -> Self {
        DataViewDefinition::Histogram {
            column: request.column.clone(),
            bins: request.bins,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormulaResponse {
    pub operation: Option<String>,
    pub result: Option<f64>,
    pub nulls: usize,
    pub errors_with_context: Vec<ApiErrorContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteCategory {
    pub category: String,
    pub value: Option<f64>,
    /// Whether this entry folds the categories beyond the limit
    pub agg: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregationResponse {
    pub categories: Vec<RemoteCategory>,
    pub count: usize,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub nulls: usize,
    pub errors_with_context: Vec<ApiErrorContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteBin {
    pub bin: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub freq: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistogramResponse {
    /// Only non-empty bins are reported
    pub bins: Vec<RemoteBin>,
    pub nulls: usize,
    pub bins_count: usize,
    pub bin_width: f64,
    pub bins_start: f64,
    #[serde(rename = "totalAmount", alias = "total_amount")]
    pub total_amount: usize,
    pub errors_with_context: Vec<ApiErrorContext>,
}

impl ApiResponse for FormulaResponse {
    fn errors(&self) -> &[ApiErrorContext] {
        &self.errors_with_context
    }
}

impl ApiResponse for AggregationResponse {
    fn errors(&self) -> &[ApiErrorContext] {
        &self.errors_with_context
    }
}

impl ApiResponse for HistogramResponse {
    fn errors(&self) -> &[ApiErrorContext] {
        &self.errors_with_context
    }
}

/// Client of the remote aggregation service. Transport errors are reported
/// as `Err`; errors the backend reports in its payload come back inside the
/// response.
#[async_trait]
pub trait MapsApi: Send + Sync {
    async fn instantiate(&self, request: &InstantiationRequest) -> Result<MapInstance>;

    async fn formula(&self, instance: &MapInstance, request: &FormulaRequest) -> Result<FormulaResponse>;

    async fn aggregation(
        &self,
        instance: &MapInstance,
        request: &AggregationRequest,
    ) -> Result<AggregationResponse>;

    async fn histogram(
        &self,
        instance: &MapInstance,
        request: &HistogramRequest,
    ) -> Result<HistogramResponse>;
}

/// Creates Maps API clients for a set of credentials
pub trait MapsApiConnector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Arc<dyn MapsApi>;
}

impl<F> MapsApiConnector for F
where
    F: Fn(&Credentials) -> Arc<dyn MapsApi> + Send + Sync,
{
    fn connect(&self, credentials: &Credentials) -> Arc<dyn MapsApi> {
        self(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_error_is_surfaced() {
        let response: FormulaResponse = serde_json::from_value(json!({
            "errors_with_context": [
                {"type": "unknown", "message": "column \"pop\" does not exist"},
                {"type": "other", "message": "ignored"}
            ]
        }))
        .unwrap();

        assert_eq!(
            check_errors(response),
            Err(DataViewError::MapsApi {
                error_type: "unknown".to_string(),
                message: "column \"pop\" does not exist".to_string(),
            })
        );
    }

    #[test]
    fn test_histogram_response_shape() {
        let response: HistogramResponse = serde_json::from_value(json!({
            "bins": [{"bin": 1, "min": 12, "max": 18, "avg": 15, "freq": 3}],
            "nulls": 2,
            "bins_count": 4,
            "bin_width": 10,
            "bins_start": 0,
            "totalAmount": 5
        }))
        .unwrap();

        assert_eq!(response.bins[0].freq, 3);
        assert_eq!(response.total_amount, 5);
        assert!(check_errors(response).is_ok());
    }

    #[test]
    fn test_instantiation_request_serialization() {
        let request = AggregationRequest {
            column: "country".to_string(),
            aggregation: Operation::Sum,
            aggregation_column: Some("pop".to_string()),
            limit: Some(5),
            bbox: None,
        };
        let instantiation = InstantiationRequest {
            sql: "SELECT * FROM t".to_string(),
            dataview: (&request).into(),
        };

        assert_eq!(
            serde_json::to_value(&instantiation).unwrap(),
            json!({
                "sql": "SELECT * FROM t",
                "dataview": {
                    "type": "aggregation",
                    "column": "country",
                    "aggregation": "sum",
                    "aggregationColumn": "pop"
                }
            })
        );
    }
}
