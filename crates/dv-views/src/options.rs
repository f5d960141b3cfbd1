//! DataView construction options

use std::str::FromStr;

use dv_core::{Credentials, DataViewSettings};
use dv_data::{DataViewError, Result, SpatialFilter};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::formula::Formula;
use crate::histogram::Histogram;
use crate::kind::Kind;

/// Where a DataView computes its statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Over features held by the client ("fast")
    Local,
    /// Through the Maps API ("precise")
    Remote,
}

impl FromStr for Mode {
    type Err = DataViewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" | "local" => Ok(Mode::Local),
            "precise" | "remote" => Ok(Mode::Remote),
            _ => Err(DataViewError::invalid(
                "mode",
                format!("expected \"fast\" or \"precise\", found \"{}\"", s),
            )),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Local => write!(f, "fast"),
            Mode::Remote => write!(f, "precise"),
        }
    }
}

/// Kind specific options, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KindOptions {
    Formula {
        #[serde(default)]
        operation: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Category {
        #[serde(default)]
        operation: Option<String>,
        #[serde(default)]
        operation_column: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Histogram {
        #[serde(default)]
        bins: Option<f64>,
        #[serde(default)]
        start: Option<f64>,
        #[serde(default)]
        end: Option<f64>,
    },
}

impl KindOptions {
    /// Validate into a [`Kind`]
    pub fn build(&self) -> Result<Kind> {
        match self {
            KindOptions::Formula { operation } => Ok(Kind::Formula(Formula::new(operation.as_deref())?)),
            KindOptions::Category {
                operation,
                operation_column,
                limit,
            } => Ok(Kind::Category(Category::new(
                operation.as_deref(),
                operation_column.clone(),
                *limit,
            )?)),
            KindOptions::Histogram { bins, start, end } => {
                Ok(Kind::Histogram(Histogram::new(*bins, *start, *end)?))
            }
        }
    }
}

/// Options accepted by [`crate::DataView::new`]
///
/// ```json
/// {"type": "category", "column": "country", "operation": "avg",
///  "operationColumn": "pop", "limit": 5, "mode": "fast",
///  "spatialFilter": "viewport", "debounceMs": 100}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataViewOptions {
    #[serde(flatten)]
    pub kind: KindOptions,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub spatial_filter: Option<SpatialFilter>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
}

impl DataViewOptions {
    pub fn new(kind: KindOptions, column: impl Into<String>) -> Self {
        Self {
            kind,
            column: Some(column.into()),
            mode: None,
            spatial_filter: None,
            credentials: None,
            debounce_ms: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_spatial_filter(mut self, filter: SpatialFilter) -> Self {
        self.spatial_filter = Some(filter);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    /// Required, non-empty column
    pub fn column(&self) -> Result<String> {
        match self.column.as_deref().map(str::trim) {
            Some(column) if !column.is_empty() => Ok(column.to_string()),
            _ => Err(DataViewError::missing("column")),
        }
    }

    /// Explicit mode if given; otherwise local when following the viewport
    /// or when the data is held in memory, remote for everything else
    pub fn resolve_mode(&self, in_memory: bool) -> Result<Mode> {
        match self.mode.as_deref() {
            Some(mode) => mode.parse(),
            None if matches!(self.spatial_filter, Some(SpatialFilter::Viewport)) || in_memory => Ok(Mode::Local),
            None => Ok(Mode::Remote),
        }
    }

    pub fn settings(&self) -> DataViewSettings {
        DataViewSettings::with_debounce_ms(self.debounce_ms)
    }
}
