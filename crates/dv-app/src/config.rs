//! Run configuration read from a JSON file

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use dv_core::Viewport;
use dv_data::ColumnFilters;
use dv_views::DataViewOptions;
use serde::Deserialize;

/// ```json
/// {
///   "dataview": {"type": "formula", "column": "pop", "operation": "avg"},
///   "viewport": {"longitude": 2.0, "latitude": 41.0, "zoom": 5, "width": 800, "height": 600},
///   "filters": {"countries": {"country": {"in": ["ES", "FR"]}}},
///   "excludedFilters": []
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub dataview: DataViewOptions,
    /// Map view followed by the "viewport" spatial filter
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub filters: BTreeMap<String, ColumnFilters>,
    #[serde(default)]
    pub excluded_filters: Vec<String>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_views::KindOptions;

    #[test]
    fn test_parse_config() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "dataview": {"type": "histogram", "column": "pop", "bins": 5, "spatialFilter": "viewport"},
                "viewport": {"longitude": 2.0, "latitude": 41.0, "zoom": 5, "width": 800, "height": 600},
                "filters": {"countries": {"country": {"in": ["ES", "FR"]}}},
                "excludedFilters": ["countries"]
            }"#,
        )
        .unwrap();

        assert!(matches!(config.dataview.kind, KindOptions::Histogram { bins: Some(b), .. } if b == 5.0));
        assert!(config.viewport.is_some());
        assert_eq!(config.filters.len(), 1);
        assert_eq!(config.excluded_filters, vec!["countries".to_string()]);
    }

    #[test]
    fn test_minimal_config() {
        let config: RunConfig =
            serde_json::from_str(r#"{"dataview": {"type": "formula", "column": "pop", "operation": "sum"}}"#)
                .unwrap();
        assert!(config.viewport.is_none());
        assert!(config.filters.is_empty());
    }
}
