//! Category: a column aggregated per distinct value of another

use async_trait::async_trait;
use dv_data::remote::AggregationRequest;
use dv_data::{CategoryValue, DataViewError, LocalSource, Operation, RemoteSource, Result};
use serde::Serialize;

use crate::kind::{DataViewKind, DataViewResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub categories: Vec<CategoryValue>,
    /// Number of categories before `limit` applies
    pub count: usize,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub null_count: usize,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub operation: Operation,
    /// Column aggregated per category; `count` needs none
    pub operation_column: Option<String>,
    pub limit: Option<usize>,
}

impl Category {
    pub fn new(operation: Option<&str>, operation_column: Option<String>, limit: Option<usize>) -> Result<Self> {
        let operation: Operation = operation
            .ok_or_else(|| DataViewError::missing("operation"))?
            .parse()?;
        let category = Self {
            operation,
            operation_column,
            limit,
        };
        category.validate()?;
        Ok(category)
    }

    pub fn validate(&self) -> Result<()> {
        if self.operation != Operation::Count && self.operation_column.is_none() {
            return Err(DataViewError::missing("operationColumn"));
        }
        Ok(())
    }

    fn aggregated_column<'a>(&'a self, column: &'a str) -> &'a str {
        match self.operation {
            Operation::Count => column,
            _ => self.operation_column.as_deref().unwrap_or(column),
        }
    }
}

fn extent(categories: &[CategoryValue]) -> (Option<f64>, Option<f64>) {
    let values = categories.iter().filter_map(|c| c.value);
    let max = values.clone().reduce(f64::max);
    let min = values.reduce(f64::min);
    (max, min)
}

#[async_trait]
impl DataViewKind for Category {
    async fn get_local_data(
        &self,
        source: &LocalSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        let grouped = source
            .group_by(column, self.aggregated_column(column), self.operation, excluded)
            .await?;

        let mut categories = grouped.categories;
        let count = categories.len();
        let (max, min) = extent(&categories);
        if let Some(limit) = self.limit {
            categories.truncate(limit);
        }

        Ok(DataViewResult::Category(CategoryResult {
            categories,
            count,
            max,
            min,
            null_count: grouped.null_count,
            operation: self.operation,
        }))
    }

    async fn get_remote_data(
        &self,
        source: &RemoteSource,
        column: &str,
        excluded: &[String],
    ) -> Result<DataViewResult> {
        let request = AggregationRequest {
            column: column.to_string(),
            aggregation: self.operation,
            aggregation_column: self.operation_column.clone(),
            limit: self.limit,
            bbox: None,
        };
        let response = source.aggregation(request, excluded).await?;

        let categories = response
            .categories
            .into_iter()
            .filter(|category| !category.agg)
            .map(|category| CategoryValue {
                name: category.category,
                value: category.value,
            })
            .collect();

        Ok(DataViewResult::Category(CategoryResult {
            categories,
            count: response.count,
            max: response.max,
            min: response.min,
            null_count: response.nulls,
            operation: self.operation,
        }))
    }
}
