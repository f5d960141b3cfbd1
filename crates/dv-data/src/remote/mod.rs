//! Remote mode: aggregation delegated to the Maps API

mod api;

pub use api::{
    check_errors, AggregationRequest, AggregationResponse, ApiErrorContext, ApiResponse,
    DataViewDefinition, FormulaRequest, FormulaResponse, HistogramRequest, HistogramResponse,
    InstantiationRequest, MapInstance, MapsApi, MapsApiConnector, RemoteBin, RemoteCategory,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dv_core::config::resolve_credentials;
use dv_core::events::{handler_from_fn, names};
use dv_core::{BBox, Credentials, EventBus, Subscription};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::cache::KeyedCache;
use crate::filters::{
    ColumnFilters, FilterApplicator, FilterId, PredicateApplicator, SpatialExtent, SpatialFilter,
    SpatialFilters, SqlFilters,
};
use crate::local::SOURCE_EVENTS;
use crate::sources::{LayerFilter, MapLayer, Target};
use crate::{DataViewError, Operation, Result};

/// Id under which the DataView's own spatial filter is registered
pub const SPATIAL_FILTER_ID: &str = "spatialFilter";

struct RemoteState {
    source_sql: String,
    /// Layer the DataView is bound to; receives the merged filter
    layer: Option<Arc<dyn MapLayer>>,
    /// Listeners on the layer bus, removed when the adapter is dropped
    subscriptions: Mutex<Vec<Subscription>>,
    credentials: Credentials,
    connector: Arc<dyn MapsApiConnector>,
    client: OnceCell<Arc<dyn MapsApi>>,
    filters: RwLock<SqlFilters>,
    spatial: RwLock<SpatialFilters>,
    viewport_bbox: RwLock<Option<BBox>>,
    /// Bumped whenever filters or the tracked viewport change
    epoch: AtomicU64,
    instances: KeyedCache<MapInstance>,
    formulas: KeyedCache<FormulaResponse>,
    aggregations: KeyedCache<AggregationResponse>,
    histograms: KeyedCache<HistogramResponse>,
    events: EventBus,
}

impl RemoteState {
    fn changed(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.data_update();
    }

    fn data_update(&self) {
        if let Err(e) = self.events.emit(names::DATA_UPDATE) {
            tracing::warn!("Failed to emit dataUpdate: {}", e);
        }
    }

    /// Push the merged filter to the layer, which answers with `filterChange`.
    /// Without a layer the update is announced directly.
    fn filters_changed(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let Some(layer) = &self.layer else {
            self.data_update();
            return;
        };

        let filter = {
            let filters = self.filters.read();
            LayerFilter {
                applicator: PredicateApplicator::from_filter(filters.merged(&[])),
                update_triggers: filters.get_update_triggers(),
                sql: Some(filters.get_applicator_instance(&[]).wrap(&self.source_sql)),
            }
        };
        tracing::debug!("Registering filter on layer '{}': {}", layer.id(), filter.update_triggers);
        layer.set_filter(filter);
    }

    fn track_viewport(&self, layer: &dyn MapLayer) {
        let bbox = layer.viewport().map(|viewport| viewport.bbox());
        let changed = {
            let mut current = self.viewport_bbox.write();
            if *current == bbox {
                false
            } else {
                *current = bbox;
                true
            }
        };

        if changed {
            tracing::debug!("Viewport of layer '{}' moved to {:?}", layer.id(), bbox);
            self.changed();
        }
    }
}

/// Remote data source adapter
#[derive(Clone)]
pub struct RemoteSource {
    state: Arc<RemoteState>,
}

impl RemoteSource {
    /// Create a remote adapter over a dataset or SQL source.
    ///
    /// Credentials resolve from `credentials`, then the source's own, then the
    /// process-wide default. The Maps API client is created on first use.
    pub fn new(
        target: &Target,
        spatial_filter: Option<SpatialFilter>,
        credentials: Option<Credentials>,
        connector: Arc<dyn MapsApiConnector>,
    ) -> Result<Self> {
        let source = target.source();
        source.validate()?;
        let source_sql = source.to_sql().ok_or_else(|| {
            DataViewError::invalid("mode", "in-memory GeoJSON sources can only be aggregated locally")
        })?;

        let credentials = resolve_credentials(credentials.as_ref().or(source.credentials()))
            .ok_or_else(|| DataViewError::missing("credentials"))?;

        let mut spatial = SpatialFilters::new();
        if let Some(filter) = spatial_filter {
            spatial.add_filter(SPATIAL_FILTER_ID, filter.into());
        }

        let layer = target.layer().cloned();
        let state = Arc::new(RemoteState {
            source_sql,
            layer: layer.clone(),
            subscriptions: Mutex::new(Vec::new()),
            credentials,
            connector,
            client: OnceCell::new(),
            filters: RwLock::new(SqlFilters::new()),
            spatial: RwLock::new(spatial),
            viewport_bbox: RwLock::new(None),
            epoch: AtomicU64::new(0),
            instances: KeyedCache::default(),
            formulas: KeyedCache::default(),
            aggregations: KeyedCache::default(),
            histograms: KeyedCache::default(),
            events: EventBus::new(SOURCE_EVENTS),
        });

        if matches!(spatial_filter, Some(SpatialFilter::Viewport)) {
            let layer = layer.as_ref().ok_or_else(|| DataViewError::missing("layer"))?;
            *state.viewport_bbox.write() = layer.viewport().map(|viewport| viewport.bbox());
            Self::subscribe_viewport(&state, layer)?;
        }
        if let Some(layer) = &layer {
            Self::subscribe_filter_change(&state, layer)?;
        }

        Ok(Self { state })
    }

    fn subscribe_viewport(state: &Arc<RemoteState>, layer: &Arc<dyn MapLayer>) -> Result<()> {
        for event in [names::RENDER, names::TILE_LOAD] {
            let weak_state: Weak<RemoteState> = Arc::downgrade(state);
            let weak_layer: Weak<dyn MapLayer> = Arc::downgrade(layer);
            let subscription = layer.events().subscribe(
                event,
                handler_from_fn(move |_| {
                    if let (Some(state), Some(layer)) = (weak_state.upgrade(), weak_layer.upgrade()) {
                        state.track_viewport(layer.as_ref());
                    }
                }),
            )?;
            state.subscriptions.lock().push(subscription);
        }
        Ok(())
    }

    fn subscribe_filter_change(state: &Arc<RemoteState>, layer: &Arc<dyn MapLayer>) -> Result<()> {
        let weak_state: Weak<RemoteState> = Arc::downgrade(state);
        let subscription = layer.events().subscribe(
            names::FILTER_CHANGE,
            handler_from_fn(move |_| {
                if let Some(state) = weak_state.upgrade() {
                    state.data_update();
                }
            }),
        )?;
        state.subscriptions.lock().push(subscription);
        Ok(())
    }

    /// Bus emitting `dataUpdate`
    pub fn events(&self) -> &EventBus {
        &self.state.events
    }

    pub fn credentials(&self) -> &Credentials {
        &self.state.credentials
    }

    /// Area requests are restricted to: explicit boxes and the tracked
    /// viewport combined
    pub fn extent(&self) -> SpatialExtent {
        let viewport = *self.state.viewport_bbox.read();
        self.state.spatial.read().get_applicator_instance(&[]).resolve(viewport)
    }

    /// Box sent with requests
    pub fn bbox(&self) -> Option<BBox> {
        self.extent().bbox()
    }

    pub fn add_filter(&self, id: impl Into<FilterId>, filter: ColumnFilters) {
        self.state.filters.write().add_filter(id, filter);
        self.state.filters_changed();
    }

    pub fn remove_filter(&self, id: &str) -> bool {
        let removed = self.state.filters.write().remove_filter(id);
        if removed {
            self.state.filters_changed();
        }
        removed
    }

    pub fn set_filters<I>(&self, filters: I)
    where
        I: IntoIterator<Item = (FilterId, ColumnFilters)>,
    {
        self.state.filters.write().set_filters(filters);
        self.state.filters_changed();
    }

    pub fn update_triggers(&self) -> String {
        self.state.filters.read().get_update_triggers()
    }

    /// Source query restricted by every filter except `excluded`
    pub fn sql(&self, excluded: &[String]) -> String {
        self.state
            .filters
            .read()
            .get_applicator_instance(excluded)
            .wrap(&self.state.source_sql)
    }

    fn client(&self) -> Arc<dyn MapsApi> {
        self.state
            .client
            .get_or_init(|| {
                tracing::debug!("Connecting to Maps API as '{}'", self.state.credentials.username);
                self.state.connector.connect(&self.state.credentials)
            })
            .clone()
    }

    fn epoch(&self) -> u64 {
        self.state.epoch.load(Ordering::SeqCst)
    }

    /// Fail with [`DataViewError::Superseded`] if state changed since `epoch`
    fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.epoch() == epoch {
            Ok(())
        } else {
            tracing::debug!("Discarding response started at epoch {}", epoch);
            Err(DataViewError::Superseded)
        }
    }

    async fn instance(&self, request: InstantiationRequest) -> Result<MapInstance> {
        let key = KeyedCache::<MapInstance>::key_for(&request);
        if let Some(instance) = self.state.instances.get(&key) {
            tracing::debug!("Reusing map instance '{}'", instance.id);
            return Ok(instance);
        }

        let instance = check_errors(self.client().instantiate(&request).await?)?;
        tracing::debug!("Instantiated map '{}'", instance.id);
        self.state.instances.put(key, instance.clone());
        Ok(instance)
    }

    /// Single value of `operation` over `column`
    pub async fn formula(
        &self,
        column: &str,
        operation: Operation,
        excluded: &[String],
    ) -> Result<FormulaResponse> {
        let epoch = self.epoch();
        let extent = self.extent();
        if extent.is_empty() {
            tracing::debug!("Spatial filters do not overlap, skipping formula request");
            return Ok(FormulaResponse {
                operation: Some(operation.to_string()),
                result: operation.aggregate(&[]).result,
                ..Default::default()
            });
        }

        let request = FormulaRequest {
            column: column.to_string(),
            operation,
            bbox: extent.bbox(),
        };
        let instance = self
            .instance(InstantiationRequest {
                sql: self.sql(excluded),
                dataview: (&request).into(),
            })
            .await?;

        let key = KeyedCache::<FormulaResponse>::key_for(&(&instance.id, &request));
        if let Some(response) = self.state.formulas.get(&key) {
            return Ok(response);
        }

        let response = check_errors(self.client().formula(&instance, &request).await?)?;
        self.ensure_current(epoch)?;
        self.state.formulas.put(key, response.clone());
        Ok(response)
    }

    /// Categories of `request.column` aggregated server side
    pub async fn aggregation(
        &self,
        mut request: AggregationRequest,
        excluded: &[String],
    ) -> Result<AggregationResponse> {
        let epoch = self.epoch();
        let extent = self.extent();
        if extent.is_empty() {
            tracing::debug!("Spatial filters do not overlap, skipping aggregation request");
            return Ok(AggregationResponse::default());
        }

        request.bbox = extent.bbox();
        let instance = self
            .instance(InstantiationRequest {
                sql: self.sql(excluded),
                dataview: (&request).into(),
            })
            .await?;

        let key = KeyedCache::<AggregationResponse>::key_for(&(&instance.id, &request));
        if let Some(response) = self.state.aggregations.get(&key) {
            return Ok(response);
        }

        let response = check_errors(self.client().aggregation(&instance, &request).await?)?;
        self.ensure_current(epoch)?;
        self.state.aggregations.put(key, response.clone());
        Ok(response)
    }

    /// Server side histogram of `request.column`
    pub async fn histogram(
        &self,
        mut request: HistogramRequest,
        excluded: &[String],
    ) -> Result<HistogramResponse> {
        let epoch = self.epoch();
        let extent = self.extent();
        if extent.is_empty() {
            tracing::debug!("Spatial filters do not overlap, skipping histogram request");
            return Ok(HistogramResponse::default());
        }

        request.bbox = extent.bbox();
        let instance = self
            .instance(InstantiationRequest {
                sql: self.sql(excluded),
                dataview: (&request).into(),
            })
            .await?;

        let key = KeyedCache::<HistogramResponse>::key_for(&(&instance.id, &request));
        if let Some(response) = self.state.histograms.get(&key) {
            return Ok(response);
        }

        let response = check_errors(self.client().histogram(&instance, &request).await?)?;
        self.ensure_current(epoch)?;
        self.state.histograms.put(key, response.clone());
        Ok(response)
    }
}
