//! Feature sources: the data a DataView aggregates over

mod geojson_source;
mod layer;

use std::sync::Arc;

use dv_core::Credentials;
use serde::{Deserialize, Serialize};

pub use geojson_source::{Feature, GeoJsonSource};
pub use layer::{LayerFilter, MapLayer, LAYER_EVENTS};

use crate::{DataViewError, Result};

/// A feature's properties
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Underlying data of a layer or a bare DataView source
#[derive(Debug, Clone)]
pub enum Source {
    /// Features held in memory
    GeoJson(GeoJsonSource),
    /// Named dataset served by the Maps API
    Dataset {
        name: String,
        credentials: Option<Credentials>,
    },
    /// SQL query served by the Maps API
    Sql {
        query: String,
        credentials: Option<Credentials>,
    },
}

/// Source kind, as reported in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    GeoJson,
    Dataset,
    Sql,
}

impl Source {
    pub fn dataset(name: impl Into<String>) -> Self {
        Source::Dataset {
            name: name.into(),
            credentials: None,
        }
    }

    pub fn sql(query: impl Into<String>) -> Self {
        Source::Sql {
            query: query.into(),
            credentials: None,
        }
    }

    /// Attach credentials to a remote source. In-memory sources ignore them.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        match &mut self {
            Source::Dataset { credentials: c, .. } | Source::Sql { credentials: c, .. } => {
                *c = Some(credentials);
            }
            Source::GeoJson(_) => {}
        }
        self
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Source::GeoJson(_) => SourceKind::GeoJson,
            Source::Dataset { .. } => SourceKind::Dataset,
            Source::Sql { .. } => SourceKind::Sql,
        }
    }

    /// Whether the Maps API can aggregate this source
    pub fn is_remote(&self) -> bool {
        !matches!(self, Source::GeoJson(_))
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Source::Dataset { credentials, .. } | Source::Sql { credentials, .. } => {
                credentials.as_ref()
            }
            Source::GeoJson(_) => None,
        }
    }

    /// SQL selecting every row of the source, `None` for in-memory sources
    pub fn to_sql(&self) -> Option<String> {
        match self {
            Source::Dataset { name, .. } => Some(format!("SELECT * FROM {}", name)),
            Source::Sql { query, .. } => Some(query.clone()),
            Source::GeoJson(_) => None,
        }
    }

    /// Reject sources without a dataset name or query
    pub fn validate(&self) -> Result<()> {
        match self {
            Source::Dataset { name, .. } if name.trim().is_empty() => {
                Err(DataViewError::missing("source"))
            }
            Source::Sql { query, .. } if query.trim().is_empty() => {
                Err(DataViewError::missing("source"))
            }
            _ => Ok(()),
        }
    }
}

/// What a DataView is bound to: a rendered layer or a bare source
#[derive(Clone)]
pub enum Target {
    Layer(Arc<dyn MapLayer>),
    Source(Source),
}

impl Target {
    pub fn source(&self) -> &Source {
        match self {
            Target::Layer(layer) => layer.source(),
            Target::Source(source) => source,
        }
    }

    pub fn layer(&self) -> Option<&Arc<dyn MapLayer>> {
        match self {
            Target::Layer(layer) => Some(layer),
            Target::Source(_) => None,
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Layer(layer) => write!(f, "Layer({})", layer.id()),
            Target::Source(source) => write!(f, "Source({:?})", source.kind()),
        }
    }
}
