//! Engagement Correlator.
//!
//! Engagements are a live snapshot of attacker -> target weapon status,
//! not fused history: every batch carrying opcode-103 records replaces the
//! whole table.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entity::GlobalId;
use crate::error::FusionError;
use crate::geometry::{haversine_nm, initial_bearing_deg, GeoPoint};
use crate::record::EngagementReport;
use crate::store::EntityStore;

/// One attacker's current engagement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub attacker: GlobalId,
    pub target: GlobalId,
    pub weapon_launched: bool,
    pub hang_fire: bool,
    /// Seconds
    pub time_to_hit: f64,
    /// Seconds
    pub time_to_arrival: f64,
    pub range_min: f64,
    pub range_max1: f64,
    pub range_max2: f64,
    pub weapon_code: u16,
}

impl Engagement {
    /// Line geometry between attacker and target.
    ///
    /// `None` when either end is unknown or has no position yet.
    pub fn geometry(&self, store: &EntityStore) -> Option<EngagementGeometry> {
        let attacker = store.get(self.attacker)?.point()?;
        let target = store.get(self.target)?.point()?;
        Some(EngagementGeometry {
            attacker,
            target,
            distance_nm: haversine_nm(attacker, target),
            bearing_deg: initial_bearing_deg(attacker, target),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementGeometry {
    pub attacker: GeoPoint,
    pub target: GeoPoint,
    pub distance_nm: f64,
    pub bearing_deg: f64,
}

/// Attacker -> engagement table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementTable {
    by_attacker: BTreeMap<GlobalId, Engagement>,
}

impl EngagementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the table with the valid reports.
    ///
    /// Reports missing attacker or target are dropped and returned with
    /// their position in `reports`. A later report for the same attacker
    /// wins. When no report is valid the table is left as it was.
    pub fn replace<'a>(
        &mut self,
        reports: impl IntoIterator<Item = &'a EngagementReport>,
    ) -> Vec<(usize, FusionError)> {
        let mut rejected = Vec::new();
        let mut next = BTreeMap::new();

        for (position, report) in reports.into_iter().enumerate() {
            match report.validate() {
                Ok(engagement) => {
                    next.insert(engagement.attacker, engagement);
                }
                Err(e) => rejected.push((position, e)),
            }
        }

        if !next.is_empty() {
            self.by_attacker = next;
        }
        rejected
    }

    pub fn all(&self) -> impl Iterator<Item = &Engagement> {
        self.by_attacker.values()
    }

    pub fn get(&self, attacker: GlobalId) -> Option<&Engagement> {
        self.by_attacker.get(&attacker)
    }

    pub fn len(&self) -> usize {
        self.by_attacker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_attacker.is_empty()
    }
}
