//! Entity model and field-level merge.
//!
//! An `Entity` is everything currently known about one tracked object. It is
//! assembled from independent reports: position (opcodes 101/104) and
//! metadata (opcode 102). Metadata groups merge recursively through the
//! `Merge` trait: a field present in the incoming value overwrites, an
//! absent field keeps what is already there.

use serde::{Deserialize, Serialize};

use crate::geometry::GeoPoint;

/// Stable numeric identifier of a tracked entity, shared by all opcodes.
pub type GlobalId = u32;

/// Affiliation, taken from the most recent position opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Friendly,
    Hostile,
}

/// Reported position. Altitude is in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Field-level union: present incoming fields win, absent ones are kept.
///
/// Implementations must be idempotent (`a.merge_from(b)` twice equals once).
pub trait Merge {
    fn merge_from(&mut self, incoming: &Self);
}

/// Leaf field: overwrite when the incoming value is present.
fn overlay<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}

/// Nested group: merge recursively, or adopt the incoming group wholesale.
fn overlay_group<T: Merge + Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    match (slot.as_mut(), incoming) {
        (Some(existing), Some(update)) => existing.merge_from(update),
        (None, Some(update)) => *slot = Some(update.clone()),
        (_, None) => {}
    }
}

// ============================================================================
// METADATA GROUPS
// ============================================================================

/// Identity data owned by the originating network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternalMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mother_ac: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Merge for InternalMeta {
    fn merge_from(&mut self, incoming: &Self) {
        overlay(&mut self.is_mother_ac, &incoming.is_mother_ac);
        overlay(&mut self.track_id, &incoming.track_id);
        overlay(&mut self.node_id, &incoming.node_id);
        overlay(&mut self.role, &incoming.role);
    }
}

/// Kinematic telemetry nested in the regional block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baro_altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mach: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl Merge for Telemetry {
    fn merge_from(&mut self, incoming: &Self) {
        overlay(&mut self.baro_altitude, &incoming.baro_altitude);
        overlay(&mut self.ground_speed, &incoming.ground_speed);
        overlay(&mut self.mach, &incoming.mach);
        overlay(&mut self.heading, &incoming.heading);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegionalMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::flags::optional")]
    pub is_emergency: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::flags::optional")]
    pub is_sos: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
}

impl Merge for RegionalMeta {
    fn merge_from(&mut self, incoming: &Self) {
        overlay(&mut self.category, &incoming.category);
        overlay(&mut self.is_emergency, &incoming.is_emergency);
        overlay(&mut self.is_sos, &incoming.is_sos);
        overlay(&mut self.squawk, &incoming.squawk);
        overlay_group(&mut self.telemetry, &incoming.telemetry);
    }
}

/// Combat state. Lists are replaced whole when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BattleGroupMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapons: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_ids: Option<Vec<GlobalId>>,
}

impl Merge for BattleGroupMeta {
    fn merge_from(&mut self, incoming: &Self) {
        overlay(&mut self.fuel, &incoming.fuel);
        overlay(&mut self.arm_status, &incoming.arm_status);
        overlay(&mut self.weapons, &incoming.weapons);
        overlay(&mut self.sensors, &incoming.sensors);
        overlay(&mut self.lock_ids, &incoming.lock_ids);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RadioMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequencies: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_ids: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u16>,
}

impl Merge for RadioMeta {
    fn merge_from(&mut self, incoming: &Self) {
        overlay(&mut self.frequencies, &incoming.frequencies);
        overlay(&mut self.network_ids, &incoming.network_ids);
        overlay(&mut self.channel, &incoming.channel);
    }
}

/// All opcode-102 fields of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<InternalMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regional: Option<RegionalMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battle_group: Option<BattleGroupMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio: Option<RadioMeta>,
}

impl Metadata {
    pub fn with_callsign(callsign: impl Into<String>) -> Self {
        Self {
            callsign: Some(callsign.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Merge for Metadata {
    fn merge_from(&mut self, incoming: &Self) {
        overlay(&mut self.callsign, &incoming.callsign);
        overlay_group(&mut self.internal, &incoming.internal);
        overlay_group(&mut self.regional, &incoming.regional);
        overlay_group(&mut self.battle_group, &incoming.battle_group);
        overlay_group(&mut self.radio, &incoming.radio);
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// What is currently known about one tracked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub global_id: GlobalId,

    /// Friendly unless the latest position came from opcode 104
    pub class: EntityClass,

    /// `None` until a 101/104 record arrives
    pub position: Option<Position>,

    /// Created from metadata, still waiting for its first position
    pub awaiting_position: bool,

    /// Has received at least one opcode-102 record
    pub network_member: bool,

    #[serde(flatten)]
    pub metadata: Metadata,
}

impl Entity {
    /// New entity from a position report.
    pub fn from_position(global_id: GlobalId, class: EntityClass, position: Position) -> Self {
        Self {
            global_id,
            class,
            position: Some(position),
            awaiting_position: false,
            network_member: false,
            metadata: Metadata::default(),
        }
    }

    /// Provisional entity from a metadata report: friendly, no position yet.
    pub fn from_metadata(global_id: GlobalId, metadata: Metadata) -> Self {
        Self {
            global_id,
            class: EntityClass::Friendly,
            position: None,
            awaiting_position: true,
            network_member: true,
            metadata,
        }
    }

    /// Position is always latest-wins; metadata is left untouched.
    pub fn apply_position(&mut self, class: EntityClass, position: Position) {
        self.class = class;
        self.position = Some(position);
        self.awaiting_position = false;
    }

    /// Deep-merge metadata; position is left untouched.
    pub fn apply_metadata(&mut self, metadata: &Metadata) {
        self.metadata.merge_from(metadata);
        self.network_member = true;
    }

    pub fn point(&self) -> Option<GeoPoint> {
        self.position.as_ref().map(Position::point)
    }

    pub fn callsign(&self) -> Option<&str> {
        self.metadata.callsign.as_deref()
    }

    /// `internal.isMotherAc == 1`
    pub fn is_mother(&self) -> bool {
        self.metadata
            .internal
            .as_ref()
            .and_then(|i| i.is_mother_ac)
            == Some(1)
    }

    pub fn is_friendly(&self) -> bool {
        self.class == EntityClass::Friendly
    }

    pub fn is_hostile(&self) -> bool {
        self.class == EntityClass::Hostile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(baro: Option<f64>, speed: Option<f64>) -> Telemetry {
        Telemetry {
            baro_altitude: baro,
            ground_speed: speed,
            ..Default::default()
        }
    }

    #[test]
    fn test_overlay_keeps_absent_fields() {
        let mut existing = InternalMeta {
            is_mother_ac: Some(1),
            track_id: Some(77),
            ..Default::default()
        };
        existing.merge_from(&InternalMeta {
            track_id: Some(78),
            ..Default::default()
        });

        assert_eq!(existing.is_mother_ac, Some(1));
        assert_eq!(existing.track_id, Some(78));
    }

    #[test]
    fn test_nested_telemetry_merges_recursively() {
        let mut regional = RegionalMeta {
            category: Some("fighter".into()),
            telemetry: Some(telemetry(Some(31000.0), Some(420.0))),
            ..Default::default()
        };
        regional.merge_from(&RegionalMeta {
            telemetry: Some(telemetry(None, Some(450.0))),
            ..Default::default()
        });

        let t = regional.telemetry.unwrap();
        assert_eq!(t.baro_altitude, Some(31000.0));
        assert_eq!(t.ground_speed, Some(450.0));
        assert_eq!(regional.category.as_deref(), Some("fighter"));
    }

    #[test]
    fn test_lists_replaced_whole() {
        let mut bg = BattleGroupMeta {
            weapons: Some(vec!["AAM".into(), "GUN".into()]),
            fuel: Some(0.8),
            ..Default::default()
        };
        bg.merge_from(&BattleGroupMeta {
            weapons: Some(vec!["GUN".into()]),
            ..Default::default()
        });

        assert_eq!(bg.weapons, Some(vec!["GUN".to_string()]));
        assert_eq!(bg.fuel, Some(0.8));
    }

    #[test]
    fn test_metadata_merge_idempotent() {
        let update = Metadata {
            callsign: Some("VIPER2".into()),
            radio: Some(RadioMeta {
                channel: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut once = Metadata::with_callsign("VIPER1");
        once.merge_from(&update);
        let mut twice = once.clone();
        twice.merge_from(&update);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_entity_position_then_metadata() {
        let mut e = Entity::from_position(5, EntityClass::Friendly, Position::new(10.0, 20.0));
        e.apply_metadata(&Metadata::with_callsign("EAGLE1"));

        assert_eq!(e.point(), Some(GeoPoint::new(10.0, 20.0)));
        assert_eq!(e.callsign(), Some("EAGLE1"));
        assert!(e.network_member);
    }

    #[test]
    fn test_entity_is_mother() {
        let mut e = Entity::from_metadata(1, Metadata::default());
        assert!(!e.is_mother());

        e.apply_metadata(&Metadata {
            internal: Some(InternalMeta {
                is_mother_ac: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(e.is_mother());
        assert!(e.awaiting_position);
    }

    #[test]
    fn test_metadata_deserializes_camel_case() {
        let md: Metadata = serde_json::from_str(
            r#"{
                "callsign": "HAWK",
                "internal": { "isMotherAc": 1 },
                "regional": { "isEmergency": 1, "telemetry": { "groundSpeed": 300.0 } },
                "battleGroup": { "lockIds": [9, 10] }
            }"#,
        )
        .unwrap();

        assert_eq!(md.internal.unwrap().is_mother_ac, Some(1));
        let regional = md.regional.unwrap();
        assert_eq!(regional.is_emergency, Some(true));
        assert_eq!(regional.telemetry.unwrap().ground_speed, Some(300.0));
        assert_eq!(md.battle_group.unwrap().lock_ids, Some(vec![9, 10]));
    }
}
