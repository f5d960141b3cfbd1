//! In-memory map layer
//!
//! Stands in for a rendered layer: features count as rendered when their
//! bounding box intersects the current viewport.

use async_trait::async_trait;
use dv_core::events::names;
use dv_core::{EventBus, Viewport};
use parking_lot::RwLock;

use crate::sources::{GeoJsonSource, LayerFilter, MapLayer, Row, Source, LAYER_EVENTS};
use crate::Result;

/// Layer over an in-memory GeoJSON source
pub struct InMemoryLayer {
    id: String,
    source: Source,
    data: GeoJsonSource,
    viewport: RwLock<Option<Viewport>>,
    filter: RwLock<LayerFilter>,
    events: EventBus,
}

impl InMemoryLayer {
    /// Create a new layer. Until a viewport is set every feature counts as rendered.
    pub fn new(id: impl Into<String>, data: GeoJsonSource) -> Self {
        Self {
            id: id.into(),
            source: Source::GeoJson(data.clone()),
            data,
            viewport: RwLock::new(None),
            filter: RwLock::new(LayerFilter::default()),
            events: EventBus::new(LAYER_EVENTS),
        }
    }

    /// Move the map. Emits `render` and then `viewportLoad`.
    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.write() = Some(viewport);
        self.emit(names::RENDER);
        self.emit(names::VIEWPORT_LOAD);
    }

    /// Signal that tiles finished loading
    pub fn tiles_loaded(&self) {
        self.emit(names::TILE_LOAD);
    }

    /// Filter currently installed by a DataView
    pub fn filter(&self) -> LayerFilter {
        self.filter.read().clone()
    }

    /// Rendered features that also pass the installed filter
    pub fn visible_rows(&self) -> Vec<Row> {
        let filter = self.filter.read();
        self.rendered_rows(&[])
            .into_iter()
            .filter(|row| filter.applicator.apply(row) == 1)
            .collect()
    }

    fn rendered_rows(&self, columns: &[String]) -> Vec<Row> {
        let bbox = self.viewport.read().map(|v| v.bbox());

        self.data
            .features()
            .iter()
            .filter(|feature| match (bbox, feature.bbox) {
                (None, _) => true,
                (Some(view), Some(extent)) => view.intersects(&extent),
                (Some(_), None) => false,
            })
            .map(|feature| feature.project(columns))
            .collect()
    }

    fn emit(&self, event: &str) {
        if let Err(e) = self.events.emit(event) {
            tracing::warn!("Layer '{}' failed to emit '{}': {}", self.id, event, e);
        }
    }
}

#[async_trait]
impl MapLayer for InMemoryLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn viewport(&self) -> Option<Viewport> {
        *self.viewport.read()
    }

    async fn viewport_features(&self, columns: &[String]) -> Result<Vec<Row>> {
        let rows = self.rendered_rows(columns);
        tracing::debug!(
            "Layer '{}' rendered {} features, columns {:?}",
            self.id,
            rows.len(),
            columns
        );
        Ok(rows)
    }

    fn set_filter(&self, filter: LayerFilter) {
        *self.filter.write() = filter;
        self.emit(names::FILTER_CHANGE);
    }
}
