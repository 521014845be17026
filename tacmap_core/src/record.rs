//! Typed opcode records.
//!
//! Feeds deliver JSON objects tagged with a numeric `opcode`. Each opcode
//! maps to one report struct; `Record` is the sealed sum over them. Decoding
//! never fails per element: an element that cannot be read becomes
//! `Record::Malformed` and an unlisted opcode becomes `Record::Unknown`, so
//! the dispatcher can skip it and carry on with the batch.
//!
//! Report fields are optional on purpose. Presence of the required keys is
//! checked by each report's `validate`, which yields the engine-side type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::{AnnotationCategory, GeoAnnotation, Severity};
use crate::engagement::Engagement;
use crate::entity::{EntityClass, GlobalId, Metadata, Position};
use crate::error::FusionError;
use crate::geometry::GeoPoint;

/// Known opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    FriendlyPosition,
    Metadata,
    Engagement,
    HostilePosition,
    ThreatLock,
    GeoAnnotation,
}

impl Opcode {
    pub fn code(self) -> u16 {
        match self {
            Opcode::FriendlyPosition => 101,
            Opcode::Metadata => 102,
            Opcode::Engagement => 103,
            Opcode::HostilePosition => 104,
            Opcode::ThreatLock => 106,
            Opcode::GeoAnnotation => 122,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            101 => Some(Opcode::FriendlyPosition),
            102 => Some(Opcode::Metadata),
            103 => Some(Opcode::Engagement),
            104 => Some(Opcode::HostilePosition),
            106 => Some(Opcode::ThreatLock),
            122 => Some(Opcode::GeoAnnotation),
            _ => None,
        }
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// Opcode 101 / 104.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PositionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_id: Option<GlobalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl PositionReport {
    pub fn new(global_id: GlobalId, latitude: f64, longitude: f64) -> Self {
        Self {
            global_id: Some(global_id),
            latitude: Some(latitude),
            longitude: Some(longitude),
            altitude: None,
        }
    }

    pub fn validate(&self, opcode: Opcode) -> Result<(GlobalId, Position), FusionError> {
        let code = opcode.code();
        let id = self
            .global_id
            .ok_or_else(|| FusionError::malformed(code, "missing globalId"))?;
        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(FusionError::malformed(code, format!("entity {} has no position", id))),
        };
        check_coordinates(code, lat, lon)?;

        let mut position = Position::new(lat, lon);
        position.altitude = self.altitude.filter(|a| a.is_finite());
        Ok((id, position))
    }
}

/// Opcode 102.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_id: Option<GlobalId>,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl MetadataReport {
    pub fn validate(&self) -> Result<(GlobalId, &Metadata), FusionError> {
        let id = self
            .global_id
            .ok_or_else(|| FusionError::malformed(Opcode::Metadata.code(), "missing globalId"))?;
        Ok((id, &self.metadata))
    }
}

/// Opcode 103.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngagementReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacker_global_id: Option<GlobalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_global_id: Option<GlobalId>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::flags::optional")]
    pub weapon_launch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::flags::optional")]
    pub hang_fire: Option<bool>,
    /// Time to hit (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tth: Option<f64>,
    /// Time to arrival (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_max1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_max2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon_code: Option<u16>,
}

impl EngagementReport {
    pub fn new(attacker: GlobalId, target: GlobalId) -> Self {
        Self {
            attacker_global_id: Some(attacker),
            target_global_id: Some(target),
            ..Default::default()
        }
    }

    /// Attacker and target are required; everything else defaults.
    pub fn validate(&self) -> Result<Engagement, FusionError> {
        let code = Opcode::Engagement.code();
        let attacker = self
            .attacker_global_id
            .ok_or_else(|| FusionError::malformed(code, "missing attackerGlobalId"))?;
        let target = self
            .target_global_id
            .ok_or_else(|| FusionError::malformed(code, format!("engagement of {} has no target", attacker)))?;

        Ok(Engagement {
            attacker,
            target,
            weapon_launched: self.weapon_launch.unwrap_or(false),
            hang_fire: self.hang_fire.unwrap_or(false),
            time_to_hit: self.tth.unwrap_or(0.0),
            time_to_arrival: self.tta.unwrap_or(0.0),
            range_min: self.range_min.unwrap_or(0.0),
            range_max1: self.range_max1.unwrap_or(0.0),
            range_max2: self.range_max2.unwrap_or(0.0),
            weapon_code: self.weapon_code.unwrap_or(0),
        })
    }
}

/// Opcode 106.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockStatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_id: Option<GlobalId>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::flags::optional")]
    pub is_lock_on: Option<bool>,
}

impl LockStatusReport {
    pub fn new(threat_id: GlobalId, is_lock_on: bool) -> Self {
        Self {
            threat_id: Some(threat_id),
            is_lock_on: Some(is_lock_on),
        }
    }

    pub fn validate(&self) -> Result<(GlobalId, bool), FusionError> {
        let code = Opcode::ThreatLock.code();
        let id = self
            .threat_id
            .ok_or_else(|| FusionError::malformed(code, "missing threatId"))?;
        let on = self
            .is_lock_on
            .ok_or_else(|| FusionError::malformed(code, format!("threat {} has no isLockOn", id)))?;
        Ok((id, on))
    }
}

/// Opcode 122.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<AnnotationCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl AnnotationReport {
    pub fn validate(&self) -> Result<GeoAnnotation, FusionError> {
        let code = Opcode::GeoAnnotation.code();
        let message_id = self
            .message_id
            .ok_or_else(|| FusionError::malformed(code, "missing messageId"))?;
        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(FusionError::malformed(code, format!("annotation {} has no position", message_id))),
        };
        check_coordinates(code, lat, lon)?;
        let category = self
            .category
            .ok_or_else(|| FusionError::malformed(code, format!("annotation {} has no category", message_id)))?;
        let severity = self
            .severity
            .ok_or_else(|| FusionError::malformed(code, format!("annotation {} has no severity", message_id)))?;

        Ok(GeoAnnotation {
            message_id,
            point: GeoPoint::new(lat, lon),
            category,
            severity,
            label: self.label.clone(),
        })
    }
}

fn check_coordinates(code: u16, lat: f64, lon: f64) -> Result<(), FusionError> {
    if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(FusionError::malformed(code, format!("coordinates out of range: {}, {}", lat, lon)));
    }
    Ok(())
}

// ============================================================================
// RECORD
// ============================================================================

/// One decoded update record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    FriendlyPosition(PositionReport),
    Metadata(MetadataReport),
    Engagement(EngagementReport),
    HostilePosition(PositionReport),
    ThreatLock(LockStatusReport),
    GeoAnnotation(AnnotationReport),
    /// Opcode not handled by this engine
    Unknown(u16),
    /// Could not be read as its opcode's schema
    Malformed { opcode: Option<u16>, reason: String },
}

impl Record {
    pub fn friendly(global_id: GlobalId, latitude: f64, longitude: f64) -> Self {
        Record::FriendlyPosition(PositionReport::new(global_id, latitude, longitude))
    }

    pub fn hostile(global_id: GlobalId, latitude: f64, longitude: f64) -> Self {
        Record::HostilePosition(PositionReport::new(global_id, latitude, longitude))
    }

    pub fn metadata(global_id: GlobalId, metadata: Metadata) -> Self {
        Record::Metadata(MetadataReport {
            global_id: Some(global_id),
            metadata,
        })
    }

    pub fn lock_status(threat_id: GlobalId, is_lock_on: bool) -> Self {
        Record::ThreatLock(LockStatusReport::new(threat_id, is_lock_on))
    }

    /// Numeric opcode, when known.
    pub fn opcode(&self) -> Option<u16> {
        let op = match self {
            Record::FriendlyPosition(_) => Opcode::FriendlyPosition,
            Record::Metadata(_) => Opcode::Metadata,
            Record::Engagement(_) => Opcode::Engagement,
            Record::HostilePosition(_) => Opcode::HostilePosition,
            Record::ThreatLock(_) => Opcode::ThreatLock,
            Record::GeoAnnotation(_) => Opcode::GeoAnnotation,
            Record::Unknown(code) => return Some(*code),
            Record::Malformed { opcode, .. } => return *opcode,
        };
        Some(op.code())
    }

    /// Entity the record is about, for the opcodes keyed on `globalId`/`threatId`.
    pub fn subject(&self) -> Option<GlobalId> {
        match self {
            Record::FriendlyPosition(r) | Record::HostilePosition(r) => r.global_id,
            Record::Metadata(r) => r.global_id,
            Record::ThreatLock(r) => r.threat_id,
            Record::Engagement(r) => r.attacker_global_id,
            Record::GeoAnnotation(_) | Record::Unknown(_) | Record::Malformed { .. } => None,
        }
    }

    /// Position opcode's class tag.
    pub fn position_class(&self) -> Option<EntityClass> {
        match self {
            Record::FriendlyPosition(_) => Some(EntityClass::Friendly),
            Record::HostilePosition(_) => Some(EntityClass::Hostile),
            _ => None,
        }
    }

    /// Decodes one JSON element. Never fails; see module docs.
    pub fn from_value(value: Value) -> Record {
        let code = match value.get("opcode").and_then(Value::as_u64) {
            Some(code) => code,
            None => {
                return Record::Malformed {
                    opcode: None,
                    reason: "missing or non-numeric opcode".to_string(),
                }
            }
        };
        let code = match u16::try_from(code) {
            Ok(code) => code,
            Err(_) => {
                return Record::Malformed {
                    opcode: None,
                    reason: format!("opcode {} out of range", code),
                }
            }
        };

        let Some(opcode) = Opcode::from_code(code) else {
            return Record::Unknown(code);
        };

        let decoded = match opcode {
            Opcode::FriendlyPosition => decode(value).map(Record::FriendlyPosition),
            Opcode::Metadata => decode(value).map(Record::Metadata),
            Opcode::Engagement => decode(value).map(Record::Engagement),
            Opcode::HostilePosition => decode(value).map(Record::HostilePosition),
            Opcode::ThreatLock => decode(value).map(Record::ThreatLock),
            Opcode::GeoAnnotation => decode(value).map(Record::GeoAnnotation),
        };

        decoded.unwrap_or_else(|e| Record::Malformed {
            opcode: Some(code),
            reason: e.to_string(),
        })
    }

    /// Encodes back to the tagged JSON form. `None` for `Malformed`.
    pub fn to_value(&self) -> Option<Value> {
        let body = match self {
            Record::FriendlyPosition(r) | Record::HostilePosition(r) => serde_json::to_value(r),
            Record::Metadata(r) => serde_json::to_value(r),
            Record::Engagement(r) => serde_json::to_value(r),
            Record::ThreatLock(r) => serde_json::to_value(r),
            Record::GeoAnnotation(r) => serde_json::to_value(r),
            Record::Unknown(_) => Ok(Value::Object(Default::default())),
            Record::Malformed { .. } => return None,
        };

        let mut body = body.ok()?;
        let object = body.as_object_mut()?;
        object.insert("opcode".to_string(), Value::from(self.opcode()?));
        Some(body)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

/// Decodes a JSON array of records.
///
/// A payload that is not a JSON array is an error; bad elements inside a
/// valid array become `Record::Malformed`.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<Record>, FusionError> {
    let elements: Vec<Value> = serde_json::from_slice(payload).map_err(|e| FusionError::Decode(e.to_string()))?;
    Ok(elements.into_iter().map(Record::from_value).collect())
}

/// Encodes records as a JSON array, dropping `Malformed` entries.
pub fn encode_batch(records: &[Record]) -> Vec<u8> {
    let values: Vec<Value> = records.iter().filter_map(Record::to_value).collect();
    Value::Array(values).to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opcode_codes() {
        for op in [
            Opcode::FriendlyPosition,
            Opcode::Metadata,
            Opcode::Engagement,
            Opcode::HostilePosition,
            Opcode::ThreatLock,
            Opcode::GeoAnnotation,
        ] {
            assert_eq!(Opcode::from_code(op.code()), Some(op));
        }
        assert_eq!(Opcode::from_code(105), None);
    }

    #[test]
    fn test_decode_position_and_metadata() {
        let r = Record::from_value(json!({"opcode": 101, "globalId": 5, "latitude": 10.0, "longitude": 20.0}));
        assert_eq!(r, Record::friendly(5, 10.0, 20.0));

        let r = Record::from_value(json!({"opcode": 102, "globalId": 5, "callsign": "EAGLE1"}));
        assert_eq!(r, Record::metadata(5, Metadata::with_callsign("EAGLE1")));
    }

    #[test]
    fn test_decode_lock_status_int_flag() {
        let r = Record::from_value(json!({"opcode": 106, "threatId": 9, "isLockOn": 0}));
        assert_eq!(r, Record::lock_status(9, false));
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        assert_eq!(Record::from_value(json!({"opcode": 999})), Record::Unknown(999));

        match Record::from_value(json!({"globalId": 1})) {
            Record::Malformed { opcode: None, .. } => {}
            other => panic!("expected malformed, got {:?}", other),
        }

        // latitude as a string does not fit the 101 schema
        match Record::from_value(json!({"opcode": 101, "globalId": 1, "latitude": "north"})) {
            Record::Malformed { opcode: Some(101), .. } => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_position_validate() {
        let (id, pos) = PositionReport::new(3, 45.0, 7.0).validate(Opcode::FriendlyPosition).unwrap();
        assert_eq!(id, 3);
        assert_eq!(pos.latitude, 45.0);

        let missing = PositionReport {
            global_id: Some(3),
            latitude: Some(45.0),
            ..Default::default()
        };
        assert!(missing.validate(Opcode::FriendlyPosition).is_err());

        let no_id = PositionReport {
            global_id: None,
            ..PositionReport::new(0, 1.0, 1.0)
        };
        assert!(no_id.validate(Opcode::HostilePosition).is_err());

        assert!(PositionReport::new(3, 95.0, 7.0).validate(Opcode::FriendlyPosition).is_err());
    }

    #[test]
    fn test_engagement_validate_requires_both_ids() {
        assert!(EngagementReport::new(1, 2).validate().is_ok());

        let no_target = EngagementReport {
            attacker_global_id: Some(1),
            ..Default::default()
        };
        assert!(no_target.validate().is_err());
    }

    #[test]
    fn test_annotation_decode_and_validate() {
        let r = Record::from_value(json!({
            "opcode": 122, "messageId": 40, "latitude": 1.5, "longitude": 2.5,
            "category": "waypoint", "severity": "warning"
        }));
        let Record::GeoAnnotation(report) = r else { panic!("expected annotation") };
        let annotation = report.validate().unwrap();
        assert_eq!(annotation.message_id, 40);
        assert_eq!(annotation.category, AnnotationCategory::Waypoint);
        assert_eq!(annotation.severity, Severity::Warning);

        let bad = Record::from_value(json!({"opcode": 122, "messageId": 41, "category": "parade"}));
        assert!(matches!(bad, Record::Malformed { opcode: Some(122), .. }));
    }

    #[test]
    fn test_batch_encode_decode() {
        let records = vec![
            Record::hostile(9, 1.0, 1.0),
            Record::lock_status(9, true),
            Record::Malformed { opcode: None, reason: "x".into() },
        ];
        let decoded = decode_batch(&encode_batch(&records)).unwrap();
        assert_eq!(decoded, records[..2].to_vec());

        assert!(decode_batch(br#"{"opcode": 101}"#).is_err());
    }
}
