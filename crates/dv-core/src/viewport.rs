//! Geographic bounding boxes and the map viewport projection

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Pixel size of the world at zoom 0
pub const TILE_SIZE: f64 = 512.0;

/// Latitude limit of the Web Mercator projection
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Bounding box `[minLon, minLat, maxLon, maxLat]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Smallest box containing all points, `None` for no points
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        points.into_iter().fold(None, |acc, [lon, lat]| {
            Some(match acc {
                None => BBox::new(lon, lat, lon, lat),
                Some(b) => BBox::new(
                    b.min_lon.min(lon),
                    b.min_lat.min(lat),
                    b.max_lon.max(lon),
                    b.max_lat.max(lat),
                ),
            })
        })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Overlapping region of both boxes, `None` when they are disjoint
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BBox::new(
            self.min_lon.max(other.min_lon),
            self.min_lat.max(other.min_lat),
            self.max_lon.min(other.max_lon),
            self.max_lat.min(other.max_lat),
        ))
    }

    /// Comma separated `minLon,minLat,maxLon,maxLat`, the form used in request URLs
    pub fn to_query_param(&self) -> String {
        format!("{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

impl From<[f64; 4]> for BBox {
    fn from(b: [f64; 4]) -> Self {
        BBox::new(b[0], b[1], b[2], b[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.min_lon, b.min_lat, b.max_lon, b.max_lat]
    }
}

/// Web Mercator view state of a map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl Viewport {
    pub fn new(longitude: f64, latitude: f64, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
            width,
            height,
        }
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    /// Project lon/lat into world pixel coordinates
    pub fn project(&self, lon: f64, lat: f64) -> [f64; 2] {
        let size = self.world_size();
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = (lon + 180.0) / 360.0 * size;
        let y = (PI - (PI / 4.0 + lat / 2.0).tan().ln()) / (2.0 * PI) * size;
        [x, y]
    }

    /// Unproject screen pixel coordinates into lon/lat
    pub fn unproject(&self, x: f64, y: f64) -> [f64; 2] {
        let size = self.world_size();
        let [cx, cy] = self.project(self.longitude, self.latitude);
        let wx = cx + (x - self.width / 2.0);
        let wy = cy + (y - self.height / 2.0);

        let lon = wx / size * 360.0 - 180.0;
        let lat = (2.0 * (PI - 2.0 * PI * wy / size).exp().atan() - PI / 2.0).to_degrees();
        [lon, lat]
    }

    /// Bounding box of the four unprojected viewport corners
    pub fn bbox(&self) -> BBox {
        let corners = [
            self.unproject(0.0, 0.0),
            self.unproject(self.width, 0.0),
            self.unproject(0.0, self.height),
            self.unproject(self.width, self.height),
        ];
        BBox::from_points(corners).unwrap_or_else(|| BBox::new(-180.0, -90.0, 180.0, 90.0))
    }
}
