//! DataView kinds and their results

use async_trait::async_trait;
use dv_data::{LocalSource, Operation, RemoteSource, Result};
use serde::Serialize;

use crate::category::{Category, CategoryResult};
use crate::formula::{Formula, FormulaResult};
use crate::histogram::{Histogram, HistogramResult};

/// Result of [`crate::DataView::get_data`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataViewResult {
    Formula(FormulaResult),
    Category(CategoryResult),
    Histogram(HistogramResult),
}

/// Statistic computed by a DataView, over either data source adapter
#[async_trait]
pub trait DataViewKind: Send + Sync {
    async fn get_local_data(
        &self,
        source: &LocalSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult>;

    async fn get_remote_data(
        &self,
        source: &RemoteSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult>;
}

/// The configured statistic of a DataView
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Formula(Formula),
    Category(Category),
    Histogram(Histogram),
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Formula(_) => "formula",
            Kind::Category(_) => "category",
            Kind::Histogram(_) => "histogram",
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            Kind::Formula(formula) => Some(formula.operation),
            Kind::Category(category) => Some(category.operation),
            Kind::Histogram(_) => None,
        }
    }

    fn as_dyn(&self) -> &dyn DataViewKind {
        match self {
            Kind::Formula(formula) => formula,
            Kind::Category(category) => category,
            Kind::Histogram(histogram) => histogram,
        }
    }
}

#[async_trait]
impl DataViewKind for Kind {
    async fn get_local_data(
        &self,
        source: &LocalSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        self.as_dyn().get_local_data(source, column, excluded).await
    }

    async fn get_remote_data(
        &self,
        source: &RemoteSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        self.as_dyn().get_remote_data(source, column, excluded).await
    }
}
