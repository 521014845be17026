//! Immutable read model handed to renderers.
//!
//! A `Snapshot` is built after each mutation and never changes afterwards,
//! so readers on other tasks can hold one without touching the engine.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::annotation::GeoAnnotation;
use crate::engagement::{Engagement, EngagementGeometry};
use crate::entity::{Entity, GlobalId};
use crate::proximity::ProximityAlert;
use crate::selector::CenterReference;

/// Map camera target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraView {
    pub reference: CenterReference,
    pub zoom: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Batches ingested when the snapshot was taken
    pub batch_count: u64,
    pub entities: Vec<Entity>,
    pub network_members: Vec<GlobalId>,
    pub camera: Option<CameraView>,
    /// Manual or threat lock
    pub locked: BTreeSet<GlobalId>,
    pub executed: BTreeSet<GlobalId>,
    pub threat_locks: BTreeMap<GlobalId, bool>,
    pub engagements: Vec<Engagement>,
    /// Attacker id -> line geometry, for engagements with both ends positioned
    pub engagement_lines: BTreeMap<GlobalId, EngagementGeometry>,
    pub annotations: Vec<GeoAnnotation>,
    pub proximity_alerts: Vec<ProximityAlert>,
}

impl Snapshot {
    pub fn entity(&self, id: GlobalId) -> Option<&Entity> {
        self.entities
            .binary_search_by_key(&id, |e| e.global_id)
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn is_locked(&self, id: GlobalId) -> bool {
        self.locked.contains(&id)
    }

    pub fn is_executed(&self, id: GlobalId) -> bool {
        self.executed.contains(&id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
