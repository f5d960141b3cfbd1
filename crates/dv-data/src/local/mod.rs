//! Local mode: aggregation over in-memory or currently rendered features

use std::cmp::Ordering;
use std::sync::Arc;

use dv_core::events::{handler_from_fn, names};
use dv_core::{EventBus, Subscription};
use parking_lot::RwLock;
use serde::Serialize;

use crate::aggregation::{group_values_by_column, Operation};
use crate::filters::{ColumnFilters, FilterId, LocalFilters};
use crate::sources::{LayerFilter, MapLayer, Row, Source, Target};
use crate::{DataViewError, Result};

/// Events emitted by data source adapters
pub const SOURCE_EVENTS: &[&str] = &[names::DATA_UPDATE, names::ERROR];

/// One aggregated category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryValue {
    pub name: String,
    /// `None` when the category had no finite value to aggregate
    pub value: Option<f64>,
}

/// Categories sorted by value, with the number of null rows skipped
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedCategories {
    pub categories: Vec<CategoryValue>,
    pub null_count: usize,
}

/// Where local rows come from
enum LocalData {
    /// Features rendered by a layer
    Viewport(Arc<dyn MapLayer>),
    /// Every feature of an in-memory source
    Memory(crate::sources::GeoJsonSource),
}

/// Local data source adapter
pub struct LocalSource {
    data: LocalData,
    layer: Option<Arc<dyn MapLayer>>,
    filters: RwLock<LocalFilters>,
    events: EventBus,
    /// Listeners on the layer bus, removed when the adapter is dropped
    _layer_subscriptions: Vec<Subscription>,
}

impl LocalSource {
    /// Create a local adapter. With `use_viewport` rows are the features
    /// rendered by the target layer; otherwise the whole in-memory dataset.
    pub fn new(target: &Target, use_viewport: bool) -> Result<Self> {
        let layer = target.layer().cloned();

        let data = if use_viewport {
            let layer = layer.clone().ok_or_else(|| DataViewError::missing("layer"))?;
            LocalData::Viewport(layer)
        } else {
            match target.source() {
                Source::GeoJson(data) => LocalData::Memory(data.clone()),
                other => {
                    return Err(DataViewError::invalid(
                        "spatialFilter",
                        format!(
                            "local mode over a {:?} source needs the \"viewport\" spatial filter",
                            other.kind()
                        ),
                    ))
                }
            }
        };

        let events = EventBus::new(SOURCE_EVENTS);
        let mut subscriptions = Vec::new();
        if let Some(layer) = &layer {
            for event in [names::VIEWPORT_LOAD, names::FILTER_CHANGE] {
                let bus = events.clone();
                subscriptions.push(layer.events().subscribe(
                    event,
                    handler_from_fn(move |_| {
                        if let Err(e) = bus.emit(names::DATA_UPDATE) {
                            tracing::warn!("Failed to emit dataUpdate: {}", e);
                        }
                    }),
                )?);
            }
        }

        Ok(Self {
            data,
            layer,
            filters: RwLock::new(LocalFilters::new()),
            events,
            _layer_subscriptions: subscriptions,
        })
    }

    /// Bus emitting `dataUpdate`
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn use_viewport(&self) -> bool {
        matches!(self.data, LocalData::Viewport(_))
    }

    pub fn add_filter(&self, id: impl Into<FilterId>, filter: ColumnFilters) {
        self.filters.write().add_filter(id, filter);
        self.filters_changed();
    }

    pub fn remove_filter(&self, id: &str) -> bool {
        let removed = self.filters.write().remove_filter(id);
        if removed {
            self.filters_changed();
        }
        removed
    }

    pub fn set_filters<I>(&self, filters: I)
    where
        I: IntoIterator<Item = (FilterId, ColumnFilters)>,
    {
        self.filters.write().set_filters(filters);
        self.filters_changed();
    }

    pub fn update_triggers(&self) -> String {
        self.filters.read().get_update_triggers()
    }

    /// Push the merged filter to the layer, which answers with `filterChange`.
    /// Without a layer the update is announced directly.
    fn filters_changed(&self) {
        let (applicator, update_triggers) = {
            let filters = self.filters.read();
            (filters.get_applicator_instance(&[]), filters.get_update_triggers())
        };

        match &self.layer {
            Some(layer) => {
                tracing::debug!("Registering filter on layer '{}': {}", layer.id(), update_triggers);
                layer.set_filter(LayerFilter {
                    applicator,
                    update_triggers,
                    sql: None,
                });
            }
            None => {
                if let Err(e) = self.events.emit(names::DATA_UPDATE) {
                    tracing::warn!("Failed to emit dataUpdate: {}", e);
                }
            }
        }
    }

    /// Rows passing every filter except `excluded`. `columns` names the
    /// properties the caller reads.
    pub async fn rows(&self, columns: &[String], excluded: &[String]) -> Result<Vec<Row>> {
        let applicator = self.filters.read().get_applicator_instance(excluded);

        let rows = match &self.data {
            LocalData::Viewport(layer) => {
                let mut needed: Vec<String> = columns.to_vec();
                for column in applicator.columns() {
                    if !needed.contains(&column) {
                        needed.push(column);
                    }
                }
                layer.viewport_features(&needed).await?
            }
            LocalData::Memory(data) => data.rows(),
        };

        let total = rows.len();
        let rows = applicator.filter_rows(rows);
        tracing::debug!("Local source kept {} of {} rows", rows.len(), total);

        Ok(rows)
    }

    /// Aggregate `operation_column` per distinct value of `key_column`.
    ///
    /// Categories come sorted by value descending, ties by name ascending.
    pub async fn group_by(
        &self,
        key_column: &str,
        operation_column: &str,
        operation: Operation,
        excluded: &[String],
    ) -> Result<GroupedCategories> {
        let mut columns = vec![key_column.to_string()];
        if operation_column != key_column {
            columns.push(operation_column.to_string());
        }
        let rows = self.rows(&columns, excluded).await?;

        let grouped = group_values_by_column(&rows, operation_column, key_column);
        let mut categories: Vec<CategoryValue> = grouped
            .groups
            .into_iter()
            .map(|(name, values)| CategoryValue {
                value: operation.aggregate(&values).result,
                name,
            })
            .collect();
        categories.sort_by(compare_categories);

        Ok(GroupedCategories {
            categories,
            null_count: grouped.null_count,
        })
    }
}

fn compare_categories(a: &CategoryValue, b: &CategoryValue) -> Ordering {
    let by_value = match (a.value, b.value) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_value.then_with(|| a.name.cmp(&b.name))
}
