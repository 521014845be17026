//! JSON exporter for scenario replays.
//!
//! Each frame pairs the oracle's ground truth with the snapshot the fusion
//! engine published at that moment, so a viewer can show both layers.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use tacmap_core::{EntityClass, GeoPoint, GlobalId, Snapshot};

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Ground truth flight positions
    pub ground_truth: Vec<TruthPosition>,

    /// What the engine believed at this time
    pub snapshot: Snapshot,

    /// Operator actions and other notable events
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Position of a ground truth flight.
#[derive(Debug, Clone, Serialize)]
pub struct TruthPosition {
    pub id: GlobalId,
    pub class: EntityClass,
    pub lat: f64,
    pub lon: f64,
}

impl TruthPosition {
    pub fn new(id: GlobalId, class: EntityClass, point: GeoPoint) -> Self {
        Self {
            id,
            class,
            lat: point.lat,
            lon: point.lon,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_tracks_duration() {
        let mut export = SimExport::new("baseline", 42);
        for t in [0.0, 5.0, 10.0] {
            export.add_frame(SimFrame {
                time_sec: t,
                ground_truth: vec![TruthPosition::new(1, EntityClass::Friendly, GeoPoint::new(1.0, 2.0))],
                snapshot: Snapshot::default(),
                events: vec![],
            });
        }
        export.finalize(true, None);

        assert_eq!(export.duration_sec, 10.0);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["frames"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["frames"][0]["ground_truth"][0]["class"], "friendly");
        assert!(json.get("failure_reason").is_none());
    }
}
