//! DataView facade held by widgets

use std::sync::{Arc, Weak};

use dv_core::events::{handler_from_fn, names};
use dv_core::{Debouncer, EventBus, EventPayload, ListenerId};
use dv_data::filters::FilterId;
use dv_data::local::SOURCE_EVENTS;
use dv_data::{
    ColumnFilters, DataViewError, LocalSource, MapsApiConnector, Operation, RemoteSource, Result,
    SpatialFilter, Target,
};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::histogram::Histogram;
use crate::kind::{DataViewKind, DataViewResult, Kind};
use crate::options::{DataViewOptions, Mode};

/// Data source adapter backing a DataView
pub enum Backend {
    Local(LocalSource),
    Remote(RemoteSource),
}

impl Backend {
    fn events(&self) -> &EventBus {
        match self {
            Backend::Local(source) => source.events(),
            Backend::Remote(source) => source.events(),
        }
    }
}

struct DataViewState {
    column: String,
    kind: Kind,
}

struct Inner {
    id: Uuid,
    mode: Mode,
    state: RwLock<DataViewState>,
    backend: Backend,
    events: EventBus,
    debouncer: Debouncer,
}

impl Inner {
    /// Announce `dataUpdate` once the quiet period ends
    fn schedule_update(&self) {
        let events = self.events.clone();
        let id = self.id;
        self.debouncer.schedule(move || {
            tracing::debug!("DataView {} emitting dataUpdate", id);
            if let Err(e) = events.emit(names::DATA_UPDATE) {
                tracing::warn!("Failed to emit dataUpdate: {}", e);
            }
        });
    }
}

/// Reactive statistic over a column of a map layer or source.
///
/// Emits `dataUpdate` whenever its result may have changed, and `error`
/// when [`DataView::get_data`] fails.
pub struct DataView {
    inner: Arc<Inner>,
}

impl DataView {
    /// Create a DataView. `connector` creates the Maps API client and is only
    /// required in remote mode.
    pub fn new(
        target: &Target,
        options: DataViewOptions,
        connector: Option<Arc<dyn MapsApiConnector>>,
    ) -> Result<Self> {
        let column = options.column()?;
        let kind = options.kind.build()?;
        let source = target.source();
        source.validate()?;

        let mode = options.resolve_mode(!source.is_remote())?;
        let backend = match mode {
            Mode::Local => {
                if let Some(SpatialFilter::BBox(_)) = options.spatial_filter {
                    return Err(DataViewError::invalid(
                        "spatialFilter",
                        "bounding box filters are only supported in precise mode",
                    ));
                }
                let use_viewport =
                    matches!(options.spatial_filter, Some(SpatialFilter::Viewport)) || source.is_remote();
                Backend::Local(LocalSource::new(target, use_viewport)?)
            }
            Mode::Remote => {
                let connector = connector.ok_or_else(|| DataViewError::missing("mapsApi"))?;
                Backend::Remote(RemoteSource::new(
                    target,
                    options.spatial_filter,
                    options.credentials.clone(),
                    connector,
                )?)
            }
        };

        let inner = Arc::new(Inner {
            id: Uuid::new_v4(),
            mode,
            state: RwLock::new(DataViewState { column, kind }),
            backend,
            events: EventBus::new(SOURCE_EVENTS),
            debouncer: Debouncer::new(options.settings().debounce),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.backend.events().on(
            names::DATA_UPDATE,
            handler_from_fn(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.schedule_update();
                }
            }),
        )?;

        tracing::info!(
            "Created {} DataView {} in {} mode over {:?}",
            inner.state.read().kind.name(),
            inner.id,
            mode,
            target
        );

        Ok(Self { inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    /// Bus emitting `dataUpdate` and `error`
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Subscribe to `dataUpdate`
    pub fn on_data_update<F>(&self, f: F) -> Result<ListenerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Ok(self.inner.events.on(names::DATA_UPDATE, handler_from_fn(move |_| f()))?)
    }

    pub fn column(&self) -> String {
        self.inner.state.read().column.clone()
    }

    pub fn kind(&self) -> Kind {
        self.inner.state.read().kind.clone()
    }

    pub fn operation(&self) -> Option<Operation> {
        self.inner.state.read().kind.operation()
    }

    pub fn set_column(&self, column: impl Into<String>) -> Result<()> {
        let column = column.into();
        if column.trim().is_empty() {
            return Err(DataViewError::missing("column"));
        }
        self.inner.state.write().column = column;
        self.inner.schedule_update();
        Ok(())
    }

    /// Change the operation of a formula or category
    pub fn set_operation(&self, operation: &str) -> Result<()> {
        let operation: Operation = operation.parse()?;
        self.update_kind(|kind| match kind {
            Kind::Formula(formula) => {
                formula.operation = operation;
                Ok(())
            }
            Kind::Category(category) => {
                let mut updated = category.clone();
                updated.operation = operation;
                updated.validate()?;
                *category = updated;
                Ok(())
            }
            Kind::Histogram(_) => Err(DataViewError::invalid("operation", "histograms have no operation")),
        })
    }

    pub fn set_operation_column(&self, operation_column: Option<String>) -> Result<()> {
        self.update_kind(|kind| match kind {
            Kind::Category(category) => {
                let mut updated = category.clone();
                updated.operation_column = operation_column;
                updated.validate()?;
                *category = updated;
                Ok(())
            }
            other => Err(DataViewError::invalid(
                "operationColumn",
                format!("not supported by {} dataviews", other.name()),
            )),
        })
    }

    pub fn set_limit(&self, limit: Option<usize>) -> Result<()> {
        self.update_kind(|kind| match kind {
            Kind::Category(category) => {
                category.limit = limit;
                Ok(())
            }
            other => Err(DataViewError::invalid(
                "limit",
                format!("not supported by {} dataviews", other.name()),
            )),
        })
    }

    pub fn set_bins(&self, bins: u32) -> Result<()> {
        self.update_histogram(|h| Histogram::new(Some(bins as f64), h.start, h.end))
    }

    pub fn set_start(&self, start: Option<f64>) -> Result<()> {
        self.update_histogram(|h| Histogram::new(Some(h.bins as f64), start, h.end))
    }

    pub fn set_end(&self, end: Option<f64>) -> Result<()> {
        self.update_histogram(|h| Histogram::new(Some(h.bins as f64), h.start, end))
    }

    fn update_histogram<F>(&self, rebuild: F) -> Result<()>
    where
        F: FnOnce(&Histogram) -> Result<Histogram>,
    {
        self.update_kind(|kind| match kind {
            Kind::Histogram(histogram) => {
                *histogram = rebuild(histogram)?;
                Ok(())
            }
            other => Err(DataViewError::invalid(
                "bins",
                format!("not supported by {} dataviews", other.name()),
            )),
        })
    }

    /// Apply `update` and schedule a `dataUpdate` if it succeeded
    fn update_kind<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut Kind) -> Result<()>,
    {
        update(&mut self.inner.state.write().kind)?;
        self.inner.schedule_update();
        Ok(())
    }

    pub fn add_filter(&self, id: impl Into<FilterId>, filter: ColumnFilters) {
        match &self.inner.backend {
            Backend::Local(source) => source.add_filter(id, filter),
            Backend::Remote(source) => source.add_filter(id, filter),
        }
    }

    pub fn remove_filter(&self, id: &str) -> bool {
        match &self.inner.backend {
            Backend::Local(source) => source.remove_filter(id),
            Backend::Remote(source) => source.remove_filter(id),
        }
    }

    pub fn set_filters<I>(&self, filters: I)
    where
        I: IntoIterator<Item = (FilterId, ColumnFilters)>,
    {
        match &self.inner.backend {
            Backend::Local(source) => source.set_filters(filters),
            Backend::Remote(source) => source.set_filters(filters),
        }
    }

    /// Changes whenever the registered filters change
    pub fn update_triggers(&self) -> String {
        match &self.inner.backend {
            Backend::Local(source) => source.update_triggers(),
            Backend::Remote(source) => source.update_triggers(),
        }
    }

    /// Compute the statistic, ignoring the filters registered under `excluded`.
    ///
    /// Failures are emitted as `error` before being returned, except for
    /// superseded remote responses.
    pub async fn get_data(&self, excluded: &[String]) -> Result<DataViewResult> {
        let (column, kind) = {
            let state = self.inner.state.read();
            (state.column.clone(), state.kind.clone())
        };

        let result = match &self.inner.backend {
            Backend::Local(source) => kind.get_local_data(source, &column, excluded).await,
            Backend::Remote(source) => kind.get_remote_data(source, &column, excluded).await,
        };

        match &result {
            Err(DataViewError::Superseded) => {
                tracing::debug!("DataView {} result superseded", self.inner.id);
            }
            Err(e) => {
                tracing::warn!("DataView {} failed: {}", self.inner.id, e);
                let payload = EventPayload::Error(Arc::new(e.clone()));
                if let Err(emit_error) = self.inner.events.emit_with(names::ERROR, payload) {
                    tracing::warn!("Failed to emit error: {}", emit_error);
                }
            }
            Ok(_) => {}
        }

        result
    }
}

impl std::fmt::Debug for DataView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("DataView")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("column", &state.column)
            .field("kind", &state.kind)
            .finish()
    }
}
