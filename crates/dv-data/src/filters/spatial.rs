use dv_core::BBox;
use serde::{Deserialize, Serialize};

use super::{FilterApplicator, FilterShape};
use crate::DataViewError;

const VIEWPORT_TOKEN: &str = "viewport";

/// Spatial restriction requested for a DataView: the live map viewport or a
/// fixed bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpatialFilter", into = "RawSpatialFilter")]
pub enum SpatialFilter {
    Viewport,
    BBox(BBox),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSpatialFilter {
    Token(String),
    BBox(BBox),
}

impl TryFrom<RawSpatialFilter> for SpatialFilter {
    type Error = DataViewError;

    fn try_from(raw: RawSpatialFilter) -> Result<Self, Self::Error> {
        match raw {
            RawSpatialFilter::Token(token) if token == VIEWPORT_TOKEN => Ok(SpatialFilter::Viewport),
            RawSpatialFilter::Token(token) => Err(DataViewError::invalid(
                "spatialFilter",
                format!("expected \"viewport\" or a bounding box, found \"{}\"", token),
            )),
            RawSpatialFilter::BBox(bbox) => Ok(SpatialFilter::BBox(bbox)),
        }
    }
}

impl From<SpatialFilter> for RawSpatialFilter {
    fn from(filter: SpatialFilter) -> Self {
        match filter {
            SpatialFilter::Viewport => RawSpatialFilter::Token(VIEWPORT_TOKEN.to_string()),
            SpatialFilter::BBox(bbox) => RawSpatialFilter::BBox(bbox),
        }
    }
}

/// Mergeable form of spatial filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialConstraint {
    /// Follow the current viewport; its box is supplied by viewport tracking
    pub viewport: bool,
    /// Explicit box. Merged boxes intersect.
    pub bbox: Option<BBox>,
    /// Set once merged boxes turned out disjoint; nothing can match
    pub empty: bool,
}

impl From<SpatialFilter> for SpatialConstraint {
    fn from(filter: SpatialFilter) -> Self {
        match filter {
            SpatialFilter::Viewport => SpatialConstraint {
                viewport: true,
                ..Default::default()
            },
            SpatialFilter::BBox(bbox) => SpatialConstraint {
                bbox: Some(bbox),
                ..Default::default()
            },
        }
    }
}

impl FilterShape for SpatialConstraint {
    fn merge(&mut self, other: &Self) {
        self.viewport |= other.viewport;
        self.empty |= other.empty;
        self.bbox = match (self.bbox, other.bbox) {
            (Some(a), Some(b)) => {
                let overlap = a.intersection(&b);
                self.empty |= overlap.is_none();
                overlap
            }
            (a, b) => a.or(b),
        };
        if self.empty {
            self.bbox = None;
        }
    }
}

/// Area a remote request is restricted to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialExtent {
    /// No spatial restriction
    Unbounded,
    Within(BBox),
    /// Restrictions do not overlap
    Empty,
}

impl SpatialExtent {
    /// Box to send with a request, `None` when unbounded or empty
    pub fn bbox(&self) -> Option<BBox> {
        match self {
            SpatialExtent::Within(bbox) => Some(*bbox),
            SpatialExtent::Unbounded | SpatialExtent::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SpatialExtent::Empty)
    }
}

/// Spatial applicator for remote requests. Only explicit boxes come out of
/// the filter itself; the viewport box is tracked elsewhere.
#[derive(Debug, Clone, Default)]
pub struct RemoteSpatialApplicator {
    filter: SpatialConstraint,
}

impl FilterApplicator<SpatialConstraint> for RemoteSpatialApplicator {
    fn from_filter(filter: SpatialConstraint) -> Self {
        Self { filter }
    }
}

impl RemoteSpatialApplicator {
    pub fn get_bbox(&self) -> Option<BBox> {
        self.filter.bbox
    }

    pub fn tracks_viewport(&self) -> bool {
        self.filter.viewport
    }

    pub fn is_empty(&self) -> bool {
        self.filter.empty
    }

    /// Extent of a request given the tracked viewport box
    pub fn resolve(&self, viewport_bbox: Option<BBox>) -> SpatialExtent {
        if self.is_empty() {
            return SpatialExtent::Empty;
        }
        let viewport = self.tracks_viewport().then_some(viewport_bbox).flatten();
        match (self.get_bbox(), viewport) {
            (Some(explicit), Some(viewport)) => explicit
                .intersection(&viewport)
                .map_or(SpatialExtent::Empty, SpatialExtent::Within),
            (explicit, viewport) => explicit
                .or(viewport)
                .map_or(SpatialExtent::Unbounded, SpatialExtent::Within),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::SpatialFilters;

    #[test]
    fn test_deserialize_spatial_filter() {
        let viewport: SpatialFilter = serde_json::from_str(r#""viewport""#).unwrap();
        assert_eq!(viewport, SpatialFilter::Viewport);

        let bbox: SpatialFilter = serde_json::from_str("[0, 0, 10, 10]").unwrap();
        assert_eq!(bbox, SpatialFilter::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)));

        assert!(serde_json::from_str::<SpatialFilter>(r#""screen""#).is_err());
    }

    #[test]
    fn test_viewport_sentinel_has_no_bbox() {
        let mut filters = SpatialFilters::new();
        filters.add_filter("spatial", SpatialFilter::Viewport.into());

        let applicator = filters.get_applicator_instance(&[]);
        assert_eq!(applicator.get_bbox(), None);
        assert!(applicator.tracks_viewport());

        let tracked = BBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(applicator.resolve(Some(tracked)), SpatialExtent::Within(tracked));
        assert_eq!(applicator.resolve(None), SpatialExtent::Unbounded);
    }

    #[test]
    fn test_explicit_bbox() {
        let mut filters = SpatialFilters::new();
        filters.add_filter("spatial", SpatialFilter::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)).into());

        let applicator = filters.get_applicator_instance(&[]);
        assert_eq!(applicator.get_bbox(), Some(BBox::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(
            applicator.resolve(Some(BBox::new(-5.0, -5.0, 5.0, 5.0))),
            SpatialExtent::Within(BBox::new(0.0, 0.0, 10.0, 10.0))
        );
    }

    #[test]
    fn test_boxes_intersect_when_merged() {
        let mut filters = SpatialFilters::new();
        filters.add_filter("a", SpatialFilter::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)).into());
        filters.add_filter("b", SpatialFilter::BBox(BBox::new(5.0, -5.0, 20.0, 5.0)).into());
        filters.add_filter("c", SpatialFilter::Viewport.into());

        let applicator = filters.get_applicator_instance(&[]);
        assert_eq!(applicator.get_bbox(), Some(BBox::new(5.0, 0.0, 10.0, 5.0)));
        assert_eq!(
            applicator.resolve(Some(BBox::new(8.0, 1.0, 30.0, 30.0))),
            SpatialExtent::Within(BBox::new(8.0, 1.0, 10.0, 5.0))
        );
    }

    #[test]
    fn test_disjoint_boxes_leave_nothing() {
        let mut filters = SpatialFilters::new();
        filters.add_filter("a", SpatialFilter::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)).into());
        filters.add_filter("b", SpatialFilter::BBox(BBox::new(20.0, 20.0, 30.0, 30.0)).into());
        filters.add_filter("c", SpatialFilter::BBox(BBox::new(-50.0, -50.0, 50.0, 50.0)).into());

        let applicator = filters.get_applicator_instance(&[]);
        assert!(applicator.is_empty());
        assert_eq!(applicator.get_bbox(), None);
        assert_eq!(applicator.resolve(None), SpatialExtent::Empty);

        // Emptiness does not depend on the order filters are merged in
        let mut reversed = SpatialFilters::new();
        reversed.add_filter("c", SpatialFilter::BBox(BBox::new(-50.0, -50.0, 50.0, 50.0)).into());
        reversed.add_filter("b", SpatialFilter::BBox(BBox::new(20.0, 20.0, 30.0, 30.0)).into());
        reversed.add_filter("a", SpatialFilter::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)).into());
        assert_eq!(reversed.merged(&[]), filters.merged(&[]));

        assert_eq!(
            filters.get_applicator_instance(&["b".to_string()]).resolve(None),
            SpatialExtent::Within(BBox::new(0.0, 0.0, 10.0, 10.0))
        );
    }

    #[test]
    fn test_box_outside_viewport_is_empty() {
        let mut filters = SpatialFilters::new();
        filters.add_filter("a", SpatialFilter::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)).into());
        filters.add_filter("b", SpatialFilter::Viewport.into());

        let applicator = filters.get_applicator_instance(&[]);
        let extent = applicator.resolve(Some(BBox::new(100.0, 40.0, 120.0, 60.0)));
        assert_eq!(extent, SpatialExtent::Empty);
        assert_eq!(extent.bbox(), None);
    }
}
