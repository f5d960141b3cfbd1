use serde_json::Value;

use super::{ColumnFilters, FilterApplicator};

/// Alias given to the source query when it gets wrapped by a filter
pub const FILTERED_SOURCE_ALIAS: &str = "__dataview_source";

/// Compiles column filters to a SQL boolean expression
#[derive(Debug, Clone, Default)]
pub struct SqlApplicator {
    filters: ColumnFilters,
}

impl FilterApplicator<ColumnFilters> for SqlApplicator {
    fn from_filter(filter: ColumnFilters) -> Self {
        Self { filters: filter }
    }
}

impl SqlApplicator {
    /// Boolean expression for the filters, `None` when nothing is filtered.
    ///
    /// Several ranges on one column are ANDed together like every other
    /// fragment.
    pub fn to_sql(&self) -> Option<String> {
        let mut fragments = Vec::new();

        for (column, filter) in self.filters.iter() {
            if let Some(values) = &filter.in_values {
                if values.is_empty() {
                    fragments.push("1 = 0".to_string());
                } else {
                    let list: Vec<String> = values.iter().map(sql_literal).collect();
                    fragments.push(format!("{} IN ({})", column, list.join(", ")));
                }
            }

            if let Some(within) = &filter.within {
                for [low, high] in within.ranges() {
                    fragments.push(format!("{} BETWEEN {} AND {}", column, low, high));
                }
            }
        }

        if fragments.is_empty() {
            None
        } else {
            Some(fragments.join(" AND "))
        }
    }

    /// Restrict a source query to the rows passing the filters
    pub fn wrap(&self, source_sql: &str) -> String {
        match self.to_sql() {
            Some(condition) => format!(
                "SELECT * FROM ({}) AS {} WHERE {}",
                source_sql, FILTERED_SOURCE_ALIAS, condition
            ),
            None => source_sql.to_string(),
        }
    }
}

/// SQL literal for a JSON value
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn applicator(value: Value) -> SqlApplicator {
        SqlApplicator::from_filter(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_in_and_within() {
        let sql = applicator(json!({
            "country": {"in": ["ES", "FR"]},
            "pop": {"within": [10, 20.5]}
        }))
        .to_sql();

        assert_eq!(
            sql.as_deref(),
            Some("country IN ('ES', 'FR') AND pop BETWEEN 10 AND 20.5")
        );
    }

    #[test]
    fn test_nested_ranges_are_anded() {
        let sql = applicator(json!({"pop": {"within": [[0, 10], [20, 30]]}})).to_sql();
        assert_eq!(
            sql.as_deref(),
            Some("pop BETWEEN 0 AND 10 AND pop BETWEEN 20 AND 30")
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(sql_literal(&json!("O'Brien")), "'O''Brien'");
        assert_eq!(sql_literal(&json!(3)), "3");
        assert_eq!(sql_literal(&json!(true)), "TRUE");
        assert_eq!(sql_literal(&json!(null)), "NULL");
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let sql = applicator(json!({"country": {"in": []}})).to_sql();
        assert_eq!(sql.as_deref(), Some("1 = 0"));
    }

    #[test]
    fn test_wrap_source() {
        assert_eq!(applicator(json!({})).wrap("SELECT * FROM t"), "SELECT * FROM t");
        assert_eq!(
            applicator(json!({"a": {"in": [1]}})).wrap("SELECT * FROM t"),
            "SELECT * FROM (SELECT * FROM t) AS __dataview_source WHERE a IN (1)"
        );
    }
}
