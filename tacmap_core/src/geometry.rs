//! Geometry Utilities - distances, centroids, bounding boxes and zoom-to-fit.
//!
//! Everything here is a pure function over WGS84 latitude/longitude pairs:
//! - Great-circle distance in nautical miles (haversine)
//! - Centroid and bounding rect of a point set (via `geo::MultiPoint`)
//! - Zoom level needed to fit a box into a padded viewport

use geo::{BoundingRect, Centroid, MultiPoint, Point};
use serde::{Deserialize, Serialize};

use crate::config::ZoomConfig;

/// Mean earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Extents below this (degrees) are treated as a single point.
const DEGENERATE_SPAN_DEG: f64 = 1e-9;

// ============================================================================
// POINTS
// ============================================================================

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// `geo` uses x = longitude, y = latitude.
    fn to_geo(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    fn from_geo(p: Point<f64>) -> Self {
        Self::new(p.y(), p.x())
    }
}

/// Great-circle distance between two points in nautical miles (haversine).
pub fn haversine_nm(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_NM * c
}

/// Initial great-circle bearing from `a` to `b`, degrees in [0, 360).
pub fn initial_bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Arithmetic mean of a point set, `None` when empty.
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let multi: MultiPoint<f64> = points.iter().map(|p| p.to_geo()).collect();
    multi.centroid().map(GeoPoint::from_geo)
}

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// Axis-aligned lat/lon box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Min/max extents of a point set, `None` when empty.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let multi: MultiPoint<f64> = points.iter().map(|p| p.to_geo()).collect();
        let rect = multi.bounding_rect()?;
        Some(Self {
            min_lat: rect.min().y,
            max_lat: rect.max().y,
            min_lon: rect.min().x,
            max_lon: rect.max().x,
        })
    }

    /// Box centered on `center` that still contains every point.
    ///
    /// Extents are the largest absolute offset from `center` on each axis,
    /// so a map centered on `center` keeps all points in view. `center`
    /// does not have to be one of the points (synthetic centroids).
    pub fn around(center: GeoPoint, points: &[GeoPoint]) -> Self {
        let (d_lat, d_lon) = match Self::from_points(points) {
            Some(extent) => (
                (extent.max_lat - center.lat).abs().max((extent.min_lat - center.lat).abs()),
                (extent.max_lon - center.lon).abs().max((extent.min_lon - center.lon).abs()),
            ),
            None => (0.0, 0.0),
        };

        Self {
            min_lat: center.lat - d_lat,
            max_lat: center.lat + d_lat,
            min_lon: center.lon - d_lon,
            max_lon: center.lon + d_lon,
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// True when all points coincide.
    pub fn is_degenerate(&self) -> bool {
        self.lat_span() < DEGENERATE_SPAN_DEG && self.lon_span() < DEGENERATE_SPAN_DEG
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }
}

// ============================================================================
// ZOOM TO FIT
// ============================================================================

/// Target viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width_px: f64,
    pub height_px: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width_px: 1280.0,
            height_px: 720.0,
        }
    }
}

/// Pixel padding applied on each side of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub x_px: f64,
    pub y_px: f64,
}

impl Padding {
    /// Padding as a fraction of the viewport size, per side.
    pub fn proportional(viewport: Viewport, fraction: f64) -> Self {
        Self {
            x_px: viewport.width_px * fraction,
            y_px: viewport.height_px * fraction,
        }
    }
}

/// The map engine's camera-fit routine.
///
/// Implemented by the renderer side; returns `None` when the engine cannot
/// compute a fit (not initialized, projection unavailable).
pub trait CameraFit {
    fn fit_zoom(&self, bbox: &BoundingBox, viewport: Viewport, padding: Padding) -> Option<f64>;
}

/// Closed-form web-Mercator fit: `log2(360 / (tile_px * degrees_per_pixel))`.
pub fn mercator_fit_zoom(bbox: &BoundingBox, viewport: Viewport, padding: Padding, tile_size_px: f64) -> f64 {
    let usable_w = (viewport.width_px - 2.0 * padding.x_px).max(1.0);
    let usable_h = (viewport.height_px - 2.0 * padding.y_px).max(1.0);

    let degrees_per_pixel = (bbox.lon_span() / usable_w).max(bbox.lat_span() / usable_h);
    (360.0 / (tile_size_px * degrees_per_pixel)).log2()
}

/// Minimum zoom level at which `bbox` fits inside the padded viewport.
///
/// Uses the engine fit when available (minus `engine_margin`), otherwise the
/// Mercator approximation (minus `fallback_margin`). Degenerate boxes and
/// non-finite results yield `default_zoom`. Always clamped to
/// `[min_zoom, max_zoom]`.
pub fn zoom_to_fit(
    bbox: &BoundingBox,
    viewport: Viewport,
    config: &ZoomConfig,
    camera: Option<&dyn CameraFit>,
) -> f64 {
    // f64::clamp panics on inverted or NaN bounds
    let clamp = |z: f64| z.max(config.min_zoom).min(config.max_zoom);

    if bbox.is_degenerate() || viewport.width_px <= 0.0 || viewport.height_px <= 0.0 {
        return clamp(config.default_zoom);
    }

    let padding = Padding::proportional(viewport, config.padding_fraction);

    let zoom = camera
        .and_then(|c| c.fit_zoom(bbox, viewport, padding))
        .filter(|z| z.is_finite())
        .map(|z| z - config.engine_margin)
        .unwrap_or_else(|| {
            mercator_fit_zoom(bbox, viewport, padding, config.tile_size_px) - config.fallback_margin
        });

    if zoom.is_finite() {
        clamp(zoom)
    } else {
        clamp(config.default_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct FixedFit(Option<f64>);

    impl CameraFit for FixedFit {
        fn fit_zoom(&self, _bbox: &BoundingBox, _viewport: Viewport, _padding: Padding) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn test_haversine_one_degree_of_longitude_at_equator() {
        let d = haversine_nm(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        // 2πR / 360
        assert_relative_eq!(d, 60.04, epsilon = 0.01);
    }

    #[test]
    fn test_haversine_zero_and_symmetric() {
        let a = GeoPoint::new(48.57, 2.31);
        let b = GeoPoint::new(48.56, 2.30);
        assert_eq!(haversine_nm(a, a), 0.0);
        assert_relative_eq!(haversine_nm(a, b), haversine_nm(b, a), epsilon = 1e-12);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert_relative_eq!(initial_bearing_deg(origin, GeoPoint::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing_deg(origin, GeoPoint::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(initial_bearing_deg(origin, GeoPoint::new(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_centroid_mean() {
        assert!(centroid(&[]).is_none());

        let c = centroid(&[GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 2.0), GeoPoint::new(3.0, 1.0)]).unwrap();
        assert_relative_eq!(c.lat, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.lon, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bounding_box_from_points() {
        let bbox = BoundingBox::from_points(&[
            GeoPoint::new(10.0, -5.0),
            GeoPoint::new(12.0, 3.0),
            GeoPoint::new(11.0, 0.0),
        ])
        .unwrap();

        assert_eq!(bbox.min_lat, 10.0);
        assert_eq!(bbox.max_lat, 12.0);
        assert_eq!(bbox.min_lon, -5.0);
        assert_eq!(bbox.max_lon, 3.0);
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn test_bounding_box_around_is_symmetric() {
        let center = GeoPoint::new(0.0, 0.0);
        let bbox = BoundingBox::around(center, &[GeoPoint::new(1.0, 4.0), GeoPoint::new(-3.0, -1.0)]);

        assert_eq!(bbox.min_lat, -3.0);
        assert_eq!(bbox.max_lat, 3.0);
        assert_eq!(bbox.min_lon, -4.0);
        assert_eq!(bbox.max_lon, 4.0);
        assert_eq!(bbox.center(), center);
        assert!(bbox.contains(GeoPoint::new(1.0, 4.0)));
    }

    #[test]
    fn test_zoom_degenerate_box_uses_default_then_clamps() {
        let config = ZoomConfig::default();
        let p = GeoPoint::new(5.0, 5.0);
        let bbox = BoundingBox::around(p, &[p]);

        assert!(bbox.is_degenerate());
        assert_eq!(zoom_to_fit(&bbox, Viewport::default(), &config, None), config.max_zoom);
    }

    #[test]
    fn test_zoom_fallback_mercator() {
        let config = ZoomConfig::default();
        let viewport = Viewport { width_px: 1000.0, height_px: 800.0 };
        let bbox = BoundingBox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 };

        // usable 700 x 560 → 1/560 deg/px
        let expected = (360.0 * 560.0 / 256.0_f64).log2() - 0.8;
        assert_relative_eq!(zoom_to_fit(&bbox, viewport, &config, None), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_zoom_engine_fit_preferred() {
        let config = ZoomConfig::default();
        let bbox = BoundingBox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 };

        let fit = FixedFit(Some(9.0));
        assert_relative_eq!(zoom_to_fit(&bbox, Viewport::default(), &config, Some(&fit)), 8.5);

        let unavailable = FixedFit(None);
        let fallback = zoom_to_fit(&bbox, Viewport::default(), &config, None);
        assert_eq!(zoom_to_fit(&bbox, Viewport::default(), &config, Some(&unavailable)), fallback);
    }

    #[test]
    fn test_zoom_clamped_both_ends() {
        let config = ZoomConfig::default();
        let small = Viewport { width_px: 400.0, height_px: 300.0 };
        let world = BoundingBox { min_lat: -85.0, max_lat: 85.0, min_lon: -180.0, max_lon: 180.0 };
        assert_eq!(zoom_to_fit(&world, small, &config, None), config.min_zoom);

        let tiny = BoundingBox { min_lat: 0.0, max_lat: 1e-6, min_lon: 0.0, max_lon: 1e-6 };
        assert_eq!(zoom_to_fit(&tiny, Viewport::default(), &config, None), config.max_zoom);

        let runaway = FixedFit(Some(f64::INFINITY));
        let z = zoom_to_fit(&world, small, &config, Some(&runaway));
        assert!((config.min_zoom..=config.max_zoom).contains(&z));
    }

    #[test]
    fn test_zoom_with_inverted_bounds_does_not_panic() {
        let config = ZoomConfig {
            min_zoom: 14.0,
            max_zoom: 3.0,
            ..ZoomConfig::default()
        };
        let bbox = BoundingBox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 };
        assert_eq!(zoom_to_fit(&bbox, Viewport::default(), &config, None), 3.0);

        let nan = ZoomConfig {
            min_zoom: f64::NAN,
            ..ZoomConfig::default()
        };
        assert!(zoom_to_fit(&bbox, Viewport::default(), &nan, None).is_finite());
    }
}
