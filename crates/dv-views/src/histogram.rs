//! Histogram: equal-width bins over a numeric column

use async_trait::async_trait;
use dv_data::aggregation::numeric_value;
use dv_data::remote::{HistogramRequest, HistogramResponse};
use dv_data::{DataViewError, LocalSource, RemoteSource, Result};
use serde::Serialize;

use crate::kind::{DataViewKind, DataViewResult};

/// Bins used when none are configured
pub const DEFAULT_BINS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub bin: usize,
    pub start: f64,
    pub end: f64,
    /// Number of values in `[start, end)`
    pub value: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub normalized: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramResult {
    pub bins: Vec<Bin>,
    pub nulls: usize,
    pub total_amount: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Histogram {
    pub bins: u32,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            start: None,
            end: None,
        }
    }
}

fn integral(property: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v.fract() != 0.0 => Err(DataViewError::invalid(
            property,
            format!("expected an integer, found {}", v),
        )),
        other => Ok(other),
    }
}

impl Histogram {
    /// Validated histogram options. `bins` must be a positive integer,
    /// `start` and `end` integers with `start <= end`.
    pub fn new(bins: Option<f64>, start: Option<f64>, end: Option<f64>) -> Result<Self> {
        let bins = match integral("bins", bins)? {
            None => DEFAULT_BINS,
            Some(b) if b >= 1.0 && b <= u32::MAX as f64 => b as u32,
            Some(b) => {
                return Err(DataViewError::invalid(
                    "bins",
                    format!("expected a positive number of bins, found {}", b),
                ))
            }
        };
        let start = integral("start", start)?;
        let end = integral("end", end)?;

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DataViewError::invalid(
                    "start",
                    format!("start ({}) is greater than end ({})", s, e),
                ));
            }
        }

        Ok(Self { bins, start, end })
    }

    /// Bin sorted values over `[start ?? min, end ?? max]`
    fn bin_values(&self, sorted: &[f64], total: usize) -> Vec<Bin> {
        let (Some(low), Some(high)) = (
            self.start.or(sorted.first().copied()),
            self.end.or(sorted.last().copied()),
        ) else {
            return Vec::new();
        };

        let count = self.bins as usize;
        let width = (high - low) / count as f64;

        (0..count)
            .map(|i| {
                let start = low + width * i as f64;
                let end = if i + 1 == count { high } else { low + width * (i + 1) as f64 };

                let from = sorted.partition_point(|v| *v < start);
                let to = sorted.partition_point(|v| *v < end).max(from);
                let members = &sorted[from..to];

                let value = members.len();
                Bin {
                    bin: i,
                    start,
                    end,
                    value,
                    min: members.first().copied(),
                    max: members.last().copied(),
                    avg: (value > 0).then(|| members.iter().sum::<f64>() / value as f64),
                    normalized: normalized(value, total),
                }
            })
            .collect()
    }

    /// Dense bins from a response that only reports non-empty ones. A
    /// response without bins and without a bin count has nothing to bin.
    fn adapt_response(&self, response: HistogramResponse) -> HistogramResult {
        let count = if response.bins_count > 0 {
            response.bins_count
        } else if response.bins.is_empty() {
            0
        } else {
            self.bins as usize
        };

        let bins = (0..count)
            .map(|i| {
                let start = response.bins_start + response.bin_width * i as f64;
                let reported = response.bins.iter().find(|bin| bin.bin == i);
                let value = reported.map_or(0, |bin| bin.freq);
                Bin {
                    bin: i,
                    start,
                    end: start + response.bin_width,
                    value,
                    min: reported.and_then(|bin| bin.min),
                    max: reported.and_then(|bin| bin.max),
                    avg: reported.and_then(|bin| bin.avg),
                    normalized: normalized(value, response.total_amount),
                }
            })
            .collect();

        HistogramResult {
            bins,
            nulls: response.nulls,
            total_amount: response.total_amount,
        }
    }
}

fn normalized(value: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        value as f64 / total as f64
    }
}

#[async_trait]
impl DataViewKind for Histogram {
    async fn get_local_data(
        &self,
        source: &LocalSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        let rows = source.rows(&[column.to_string()], excluded).await?;

        let mut values: Vec<f64> = rows
            .iter()
            .filter_map(|row| numeric_value(row.get(column)).filter(|v| v.is_finite()))
            .collect();
        values.sort_by(f64::total_cmp);

        let total = rows.len();
        Ok(DataViewResult::Histogram(HistogramResult {
            bins: self.bin_values(&values, total),
            nulls: total - values.len(),
            total_amount: total,
        }))
    }

    async fn get_remote_data(
        &self,
        source: &RemoteSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        let request = HistogramRequest {
            column: column.to_string(),
            bins: self.bins,
            start: self.start,
            end: self.end,
            bbox: None,
        };
        let response = source.histogram(request, excluded).await?;
        Ok(DataViewResult::Histogram(self.adapt_response(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_core::{BBox, Credentials};
    use dv_data::remote::{
        AggregationRequest, AggregationResponse, FormulaRequest, FormulaResponse, InstantiationRequest,
        MapInstance, MapsApi, MapsApiConnector, RemoteBin,
    };
    use dv_data::{GeoJsonSource, SpatialFilter, Source, Target};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn local(rows: Value) -> LocalSource {
        let data = GeoJsonSource::from_rows(serde_json::from_value(rows).unwrap());
        LocalSource::new(&Target::Source(Source::GeoJson(data)), false).unwrap()
    }

    fn histogram_of(result: DataViewResult) -> HistogramResult {
        match result {
            DataViewResult::Histogram(histogram) => histogram,
            other => panic!("expected a histogram, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_bins() {
        let source = local(json!([
            {"v": 0}, {"v": 1}, {"v": 4}, {"v": 5}, {"v": 9}, {"v": null}, {"v": 10}
        ]));
        let histogram = Histogram::new(Some(2.0), None, None).unwrap();
        let result = histogram_of(histogram.get_local_data(&source, "v", &[]).await.unwrap());

        assert_eq!(result.total_amount, 7);
        assert_eq!(result.nulls, 1);

        let first = &result.bins[0];
        assert_eq!((first.start, first.end), (0.0, 5.0));
        assert_eq!(first.value, 3);
        assert_eq!(first.min, Some(0.0));
        assert_eq!(first.max, Some(4.0));
        assert!((first.normalized - 3.0 / 7.0).abs() < 1e-12);

        // 10 equals the end of the range and is not binned
        let second = &result.bins[1];
        assert_eq!((second.start, second.end), (5.0, 10.0));
        assert_eq!(second.value, 2);
        assert_eq!(second.avg, Some(7.0));
    }

    #[tokio::test]
    async fn test_explicit_range_and_idempotence() {
        let source = local(json!([{"v": 3}, {"v": 12}, {"v": 25}, {"v": 0}]));
        let histogram = Histogram::new(Some(4.0), Some(0.0), Some(40.0)).unwrap();

        let first = histogram.get_local_data(&source, "v", &[]).await.unwrap();
        let second = histogram.get_local_data(&source, "v", &[]).await.unwrap();
        assert_eq!(first, second);

        let result = histogram_of(first);
        let counts: Vec<usize> = result.bins.iter().map(|b| b.value).collect();
        assert_eq!(counts, vec![2, 1, 1, 0]);
        assert_eq!(result.bins[3].avg, None);
    }

    #[tokio::test]
    async fn test_empty_column() {
        let source = local(json!([{"v": null}]));
        let result = histogram_of(Histogram::default().get_local_data(&source, "v", &[]).await.unwrap());

        assert!(result.bins.is_empty());
        assert_eq!(result.nulls, 1);
    }

    /// Maps API serving one sparse histogram and recording its requests
    #[derive(Default)]
    struct HistogramApi {
        requests: Mutex<Vec<HistogramRequest>>,
    }

    #[async_trait]
    impl MapsApi for HistogramApi {
        async fn instantiate(&self, _request: &InstantiationRequest) -> Result<MapInstance> {
            Ok(MapInstance {
                id: "histogram".to_string(),
                errors_with_context: Vec::new(),
            })
        }

        async fn formula(&self, _instance: &MapInstance, _request: &FormulaRequest) -> Result<FormulaResponse> {
            Err(DataViewError::Source("formula not served".to_string()))
        }

        async fn aggregation(
            &self,
            _instance: &MapInstance,
            _request: &AggregationRequest,
        ) -> Result<AggregationResponse> {
            Err(DataViewError::Source("aggregation not served".to_string()))
        }

        async fn histogram(
            &self,
            _instance: &MapInstance,
            request: &HistogramRequest,
        ) -> Result<HistogramResponse> {
            self.requests.lock().push(request.clone());
            Ok(HistogramResponse {
                bins: vec![
                    RemoteBin {
                        bin: 0,
                        min: Some(2.0),
                        max: Some(8.0),
                        avg: Some(5.0),
                        freq: 2,
                    },
                    RemoteBin {
                        bin: 3,
                        min: Some(31.0),
                        max: Some(31.0),
                        avg: Some(31.0),
                        freq: 1,
                    },
                ],
                nulls: 1,
                bins_count: 4,
                bin_width: 10.0,
                bins_start: 0.0,
                total_amount: 4,
                errors_with_context: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_remote_bins() {
        let api = Arc::new(HistogramApi::default());
        let client = api.clone();
        let connector: Arc<dyn MapsApiConnector> =
            Arc::new(move |_: &Credentials| -> Arc<dyn MapsApi> { client.clone() });
        let bbox = BBox::new(-10.0, 35.0, 5.0, 45.0);
        let source = RemoteSource::new(
            &Target::Source(Source::dataset("populated_places")),
            Some(SpatialFilter::BBox(bbox)),
            Some(Credentials::new("demo", "secret")),
            connector,
        )
        .unwrap();

        let histogram = Histogram::new(Some(4.0), Some(0.0), Some(40.0)).unwrap();
        let result = histogram_of(histogram.get_remote_data(&source, "pop", &[]).await.unwrap());

        let request = api.requests.lock()[0].clone();
        assert_eq!(request.column, "pop");
        assert_eq!((request.bins, request.start, request.end), (4, Some(0.0), Some(40.0)));
        assert_eq!(request.bbox, Some(bbox));

        let counts: Vec<usize> = result.bins.iter().map(|b| b.value).collect();
        assert_eq!(counts, vec![2, 0, 0, 1]);
        assert_eq!((result.bins[3].start, result.bins[3].end), (30.0, 40.0));
        assert_eq!(result.bins[1].avg, None);
        assert_eq!(result.bins[0].normalized, 0.5);
        assert_eq!((result.nulls, result.total_amount), (1, 4));
    }

    #[test]
    fn test_empty_remote_response() {
        let result = Histogram::default().adapt_response(HistogramResponse::default());
        assert!(result.bins.is_empty());
        assert_eq!(result.total_amount, 0);
    }

    #[test]
    fn test_validation() {
        assert_eq!(Histogram::new(None, None, None).unwrap().bins, DEFAULT_BINS);
        assert!(matches!(
            Histogram::new(Some(0.0), None, None),
            Err(DataViewError::PropertyInvalid { ref property, .. }) if property == "bins"
        ));
        assert!(matches!(
            Histogram::new(None, Some(1.5), None),
            Err(DataViewError::PropertyInvalid { ref property, .. }) if property == "start"
        ));
        assert!(matches!(
            Histogram::new(None, Some(10.0), Some(5.0)),
            Err(DataViewError::PropertyInvalid { ref property, .. }) if property == "start"
        ));
        assert!(Histogram::new(Some(3.0), Some(5.0), Some(5.0)).is_ok());
    }

    #[test]
    fn test_sparse_remote_bins() {
        let histogram = Histogram::new(Some(3.0), None, None).unwrap();
        let result = histogram.adapt_response(HistogramResponse {
            bins: vec![RemoteBin {
                bin: 1,
                min: Some(12.0),
                max: Some(18.0),
                avg: Some(15.0),
                freq: 4,
            }],
            nulls: 1,
            bins_count: 3,
            bin_width: 10.0,
            bins_start: 0.0,
            total_amount: 8,
            errors_with_context: Vec::new(),
        });

        assert_eq!(result.bins.len(), 3);
        assert_eq!(result.bins[0].value, 0);
        assert_eq!((result.bins[1].start, result.bins[1].end), (10.0, 20.0));
        assert_eq!(result.bins[1].value, 4);
        assert_eq!(result.bins[1].normalized, 0.5);
        assert_eq!(result.total_amount, 8);
    }
}
