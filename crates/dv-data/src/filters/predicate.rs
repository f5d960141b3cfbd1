use serde_json::Value;

use super::column::values_equal;
use super::{ColumnFilter, ColumnFilters, FilterApplicator};
use crate::sources::Row;

/// Evaluates column filters against in-memory rows
#[derive(Debug, Clone, Default)]
pub struct PredicateApplicator {
    filters: ColumnFilters,
}

impl FilterApplicator<ColumnFilters> for PredicateApplicator {
    fn from_filter(filter: ColumnFilters) -> Self {
        Self { filters: filter }
    }
}

impl PredicateApplicator {
    pub fn filters(&self) -> &ColumnFilters {
        &self.filters
    }

    /// Columns the predicate reads
    pub fn columns(&self) -> Vec<String> {
        self.filters.columns().map(str::to_string).collect()
    }

    /// `1` if the row passes every filter, `0` otherwise. The numeric form is
    /// what a GPU filter attribute expects.
    pub fn apply(&self, row: &Row) -> u8 {
        u8::from(self.passes(row))
    }

    pub fn passes(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(column, filter)| passes_column(row.get(column.as_str()), filter))
    }

    /// Keep the rows that pass
    pub fn filter_rows(&self, rows: Vec<Row>) -> Vec<Row> {
        if self.filters.is_empty() {
            return rows;
        }
        rows.into_iter().filter(|row| self.passes(row)).collect()
    }
}

fn passes_column(value: Option<&Value>, filter: &ColumnFilter) -> bool {
    let value = value.unwrap_or(&Value::Null);

    if let Some(allowed) = &filter.in_values {
        if !allowed.iter().any(|a| values_equal(a, value)) {
            return false;
        }
    }

    if let Some(within) = &filter.within {
        let Some(number) = value.as_f64() else {
            return false;
        };
        if !within
            .ranges()
            .iter()
            .all(|[low, high]| number >= *low && number < *high)
        {
            return false;
        }
    }

    true
}
