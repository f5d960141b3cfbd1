//! Data handling for DataViews: filters, aggregation and the local/remote
//! data source adapters

pub mod aggregation;
pub mod cache;
pub mod filters;
pub mod local;
pub mod memory;
pub mod remote;
pub mod sources;

use dv_core::events::EventError;
use thiserror::Error;

// Re-exports
pub use aggregation::{aggregate_features, aggregate_values, group_values_by_column, Operation};
pub use cache::KeyedCache;
pub use filters::{ColumnFilter, ColumnFilters, FiltersCollection, SpatialExtent, SpatialFilter};
pub use local::{CategoryValue, GroupedCategories, LocalSource};
pub use memory::InMemoryLayer;
pub use remote::{MapsApi, MapsApiConnector, RemoteSource};
pub use sources::{GeoJsonSource, LayerFilter, MapLayer, Row, Source, SourceKind, Target};

/// Errors that can occur while building or querying a DataView
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataViewError {
    #[error("Property '{0}' is required")]
    PropertyMissing(String),

    #[error("Property '{property}' is not valid: {reason}")]
    PropertyInvalid { property: String, reason: String },

    #[error("Maps API error ({error_type}): {message}")]
    MapsApi { error_type: String, message: String },

    #[error("Aggregation operation '{0}' is not implemented")]
    UnimplementedAggregation(String),

    #[error("Invalid percentile value: {0}. Must be an integer between 0 and 100")]
    InvalidPercentile(String),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Response superseded by a newer request")]
    Superseded,

    #[error("Source error: {0}")]
    Source(String),
}

impl DataViewError {
    pub fn invalid(property: impl Into<String>, reason: impl Into<String>) -> Self {
        DataViewError::PropertyInvalid {
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(property: impl Into<String>) -> Self {
        DataViewError::PropertyMissing(property.into())
    }
}

pub type Result<T, E = DataViewError> = std::result::Result<T, E>;
