//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FusionError;
use crate::geometry::Viewport;

/// Zoom-to-fit tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    /// Padding per viewport side as a fraction of its size (default: 0.15)
    pub padding_fraction: f64,

    /// Map tile width in pixels for the Mercator fallback (default: 256)
    pub tile_size_px: f64,

    /// Lowest zoom ever returned (default: 1)
    pub min_zoom: f64,

    /// Highest supported zoom (default: 13)
    pub max_zoom: f64,

    /// Subtracted from the map engine's own fit (default: 0.5)
    pub engine_margin: f64,

    /// Subtracted from the Mercator fallback (default: 0.8)
    pub fallback_margin: f64,

    /// Used for degenerate or non-finite fits, before clamping (default: 15)
    pub default_zoom: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            padding_fraction: 0.15,
            tile_size_px: 256.0,
            min_zoom: 1.0,
            max_zoom: 13.0,
            engine_margin: 0.5,
            fallback_margin: 0.8,
            default_zoom: 15.0,
        }
    }
}

/// Configuration for the FusionEngine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Viewport the center/zoom is computed for
    pub viewport: Viewport,

    /// Zoom-to-fit parameters
    pub zoom: ZoomConfig,

    /// Whether the geo-annotation map layer is ready at start-up
    /// (default: false, batches are buffered until `mark_layer_ready`)
    pub annotation_layer_ready: bool,

    /// Friendly/hostile separation that raises a proximity alert (default: 10 NM)
    pub proximity_threshold_nm: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            zoom: ZoomConfig::default(),
            annotation_layer_ready: false,
            proximity_threshold_nm: 10.0,
        }
    }
}

impl FusionConfig {
    /// Parses a JSON document; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, FusionError> {
        let config: Self = serde_json::from_str(json).map_err(|e| FusionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FusionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| FusionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Rejects values the geometry code cannot work with.
    pub fn validate(&self) -> Result<(), FusionError> {
        let z = &self.zoom;
        if !(z.min_zoom.is_finite() && z.max_zoom.is_finite()) || z.min_zoom > z.max_zoom {
            return Err(FusionError::Config(format!(
                "zoom bounds [{}, {}] are invalid",
                z.min_zoom, z.max_zoom
            )));
        }
        if !(0.0..0.5).contains(&z.padding_fraction) {
            return Err(FusionError::Config(format!(
                "padding_fraction {} must be in [0, 0.5)",
                z.padding_fraction
            )));
        }
        if z.tile_size_px <= 0.0 {
            return Err(FusionError::Config("tile_size_px must be positive".to_string()));
        }
        if self.viewport.width_px <= 0.0 || self.viewport.height_px <= 0.0 {
            return Err(FusionError::Config("viewport must have a positive size".to_string()));
        }
        if self.proximity_threshold_nm < 0.0 {
            return Err(FusionError::Config("proximity_threshold_nm must not be negative".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = FusionConfig::default();
        assert_eq!(config.zoom.min_zoom, 1.0);
        assert_eq!(config.zoom.max_zoom, 13.0);
        assert_eq!(config.zoom.padding_fraction, 0.15);
        assert!(!config.annotation_layer_ready);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_json_keeps_defaults() {
        let config = FusionConfig::from_json_str(
            r#"{ "viewport": { "width_px": 800, "height_px": 600 }, "zoom": { "max_zoom": 11 } }"#,
        )
        .unwrap();

        assert_eq!(config.viewport.width_px, 800.0);
        assert_eq!(config.zoom.max_zoom, 11.0);
        assert_eq!(config.zoom.tile_size_px, 256.0);
        assert_eq!(config.proximity_threshold_nm, 10.0);
    }

    #[test]
    fn test_config_rejects_inverted_zoom_bounds() {
        let err = FusionConfig::from_json_str(r#"{ "zoom": { "min_zoom": 14, "max_zoom": 3 } }"#).unwrap_err();
        assert!(matches!(err, FusionError::Config(_)));
    }

    #[test]
    fn test_config_rejects_bad_json() {
        assert!(FusionConfig::from_json_str("{ not json").is_err());
    }
}
