//! Widget-scoped filter collections and their applicators
//!
//! A [`FiltersCollection`] stores one filter per widget id. Applicators are
//! built from the merge of all stored filters (optionally excluding some
//! widgets, so a widget can ignore its own selection) and translate that
//! merged filter to a back-end: an in-memory predicate, a SQL expression, or
//! a bounding box.

mod column;
mod predicate;
mod spatial;
mod sql;

use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::Serialize;

pub use column::{ColumnFilter, ColumnFilters, Within};
pub use predicate::PredicateApplicator;
pub use spatial::{RemoteSpatialApplicator, SpatialConstraint, SpatialExtent, SpatialFilter};
pub use sql::{sql_literal, SqlApplicator};

/// Widget-scoped filter identifier
pub type FilterId = String;

/// A filter definition that can be merged with others. Merging must AND the
/// constraints of both sides and be independent of merge order.
pub trait FilterShape: Clone + Default + Serialize + Send + Sync {
    fn merge(&mut self, other: &Self);
}

/// Translates a merged filter into something a back-end can evaluate
pub trait FilterApplicator<S: FilterShape> {
    fn from_filter(filter: S) -> Self;
}

/// Filters keyed by widget id
#[derive(Debug, Clone)]
pub struct FiltersCollection<S, A> {
    filters: IndexMap<FilterId, S>,
    _applicator: PhantomData<fn() -> A>,
}

impl<S, A> Default for FiltersCollection<S, A> {
    fn default() -> Self {
        Self {
            filters: IndexMap::new(),
            _applicator: PhantomData,
        }
    }
}

impl<S, A> FiltersCollection<S, A>
where
    S: FilterShape,
    A: FilterApplicator<S>,
{
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the filter of a widget
    pub fn add_filter(&mut self, id: impl Into<FilterId>, filter: S) {
        self.filters.insert(id.into(), filter);
    }

    /// Remove the filter of a widget. Returns whether it existed.
    pub fn remove_filter(&mut self, id: &str) -> bool {
        self.filters.shift_remove(id).is_some()
    }

    /// Replace every stored filter
    pub fn set_filters<I>(&mut self, filters: I)
    where
        I: IntoIterator<Item = (FilterId, S)>,
    {
        self.filters.clear();
        self.filters.extend(filters);
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn has_filter(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Merge of every filter not listed in `excluded`
    pub fn merged(&self, excluded: &[String]) -> S {
        let mut merged = S::default();
        for (id, filter) in &self.filters {
            if !excluded.iter().any(|e| e == id) {
                merged.merge(filter);
            }
        }
        merged
    }

    /// Applicator over the merge of every filter not listed in `excluded`
    pub fn get_applicator_instance(&self, excluded: &[String]) -> A {
        A::from_filter(self.merged(excluded))
    }

    /// Cache-invalidation key derived from the current merged filter
    pub fn get_update_triggers(&self) -> String {
        serde_json::to_string(&self.merged(&[])).unwrap_or_default()
    }
}

/// Filters evaluated in memory
pub type LocalFilters = FiltersCollection<ColumnFilters, PredicateApplicator>;

/// Filters compiled to SQL
pub type SqlFilters = FiltersCollection<ColumnFilters, SqlApplicator>;

/// Spatial constraints for remote requests
pub type SpatialFilters = FiltersCollection<SpatialConstraint, RemoteSpatialApplicator>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(value: serde_json::Value) -> ColumnFilters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_add_remove_filters() {
        let mut filters = LocalFilters::new();
        filters.add_filter("category-widget", filter(json!({"country": {"in": ["ES"]}})));
        filters.add_filter("histogram-widget", filter(json!({"pop": {"within": [0, 100]}})));
        assert_eq!(filters.len(), 2);

        assert!(filters.remove_filter("category-widget"));
        assert!(!filters.remove_filter("category-widget"));
        assert_eq!(filters.ids().collect::<Vec<_>>(), vec!["histogram-widget"]);
    }

    #[test]
    fn test_set_filters_replaces() {
        let mut filters = LocalFilters::new();
        filters.add_filter("a", filter(json!({"country": {"in": ["ES"]}})));
        filters.set_filters(vec![(
            "b".to_string(),
            filter(json!({"country": {"in": ["FR"]}})),
        )]);

        assert!(!filters.has_filter("a"));
        assert!(filters.has_filter("b"));
    }

    #[test]
    fn test_merge_excludes_ids() {
        let mut filters = SqlFilters::new();
        filters.add_filter("a", filter(json!({"country": {"in": ["ES"]}})));
        filters.add_filter("b", filter(json!({"pop": {"within": [0, 100]}})));

        let sql = filters.get_applicator_instance(&["a".to_string()]).to_sql();
        assert_eq!(sql.as_deref(), Some("pop BETWEEN 0 AND 100"));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = filter(json!({"country": {"in": ["ES", "FR", "IT"]}, "pop": {"within": [0, 50]}}));
        let b = filter(json!({"country": {"in": ["IT", "ES"]}, "area": {"within": [10, 20]}}));

        let mut first = SqlFilters::new();
        first.add_filter("a", a.clone());
        first.add_filter("b", b.clone());

        let mut second = SqlFilters::new();
        second.add_filter("b", b);
        second.add_filter("a", a);

        assert_eq!(first.merged(&[]), second.merged(&[]));
        assert_eq!(first.get_update_triggers(), second.get_update_triggers());
        assert_eq!(
            first.get_applicator_instance(&[]).to_sql(),
            second.get_applicator_instance(&[]).to_sql()
        );
    }

    #[test]
    fn test_update_triggers_change_with_filters() {
        let mut filters = LocalFilters::new();
        let empty = filters.get_update_triggers();

        filters.add_filter("a", filter(json!({"country": {"in": ["ES"]}})));
        let with_filter = filters.get_update_triggers();

        assert_ne!(empty, with_filter);
        filters.remove_filter("a");
        assert_eq!(filters.get_update_triggers(), empty);
    }
}
