//! Boundary with the map rendering engine

use async_trait::async_trait;
use dv_core::events::names;
use dv_core::{EventBus, Viewport};

use super::{Row, Source};
use crate::filters::PredicateApplicator;
use crate::Result;

/// Events a map layer emits
pub const LAYER_EVENTS: &[&str] = &[
    names::VIEWPORT_LOAD,
    names::FILTER_CHANGE,
    names::RENDER,
    names::TILE_LOAD,
];

/// Filter pushed by a DataView to the layer so rendering hides filtered
/// features
#[derive(Debug, Clone, Default)]
pub struct LayerFilter {
    pub applicator: PredicateApplicator,
    /// Changes whenever the filter changes; the renderer redraws on change
    pub update_triggers: String,
    /// Filtered query for layers whose features are served from SQL
    pub sql: Option<String>,
}

/// A rendered map layer
#[async_trait]
pub trait MapLayer: Send + Sync {
    /// Layer identifier
    fn id(&self) -> &str;

    /// Bus emitting [`LAYER_EVENTS`]
    fn events(&self) -> &EventBus;

    /// Data backing the layer
    fn source(&self) -> &Source;

    /// Current view state of the map the layer is on, if it has been added to one
    fn viewport(&self) -> Option<Viewport>;

    /// Properties of the features currently rendered. `columns` lists the
    /// properties the caller needs; the layer must make sure they are loaded.
    async fn viewport_features(&self, columns: &[String]) -> Result<Vec<Row>>;

    /// Install the rendering filter. Layers emit `filterChange` once it applies.
    fn set_filter(&self, filter: LayerFilter);
}
