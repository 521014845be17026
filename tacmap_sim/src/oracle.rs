//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the simulated airspace:
//! - True positions, headings and fuel of every flight
//! - Simple great-circle-free kinematics (flat earth per tick)
//! - Opcode record generation, with noisy positions and partial metadata

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::collections::BTreeMap;

use tacmap_core::entity::{BattleGroupMeta, InternalMeta, RadioMeta, RegionalMeta, Telemetry};
use tacmap_core::record::{AnnotationReport, EngagementReport, PositionReport};
use tacmap_core::{haversine_nm, AnnotationCategory, EntityClass, GeoPoint, GlobalId, Metadata, Record, Severity};

/// First id handed to friendly flights.
pub const FRIENDLY_BASE_ID: GlobalId = 1;

/// First id handed to hostile flights.
pub const HOSTILE_BASE_ID: GlobalId = 1001;

/// Where the friendly package starts.
const ANCHOR: GeoPoint = GeoPoint { lat: 35.0, lon: 45.0 };

/// Engagements open with a launch inside this range.
const LAUNCH_RANGE_NM: f64 = 40.0;

/// Weapon fly-out speed used for time-to-hit.
const WEAPON_SPEED_KTS: f64 = 1800.0;

/// A ground truth flight in the simulation.
#[derive(Debug, Clone, Serialize)]
pub struct GroundTruthEntity {
    pub id: GlobalId,
    pub class: EntityClass,
    pub callsign: String,
    pub is_mother: bool,
    pub position: GeoPoint,
    pub altitude_ft: f64,
    /// Degrees true
    pub heading_deg: f64,
    pub speed_kts: f64,
    /// Percent
    pub fuel: f64,
    /// Hostile has a lock on a friendly (drives opcode 106)
    pub locked_on: bool,
    /// Not removed by an execution
    pub active: bool,
}

impl GroundTruthEntity {
    /// Constant heading and speed for `dt` seconds.
    fn advance(&mut self, dt: f64) {
        let distance_nm = self.speed_kts * dt / 3600.0;
        let heading = self.heading_deg.to_radians();
        let d_lat = distance_nm * heading.cos() / 60.0;
        let d_lon = distance_nm * heading.sin() / (60.0 * self.position.lat.to_radians().cos().max(0.01));

        self.position = GeoPoint::new(
            (self.position.lat + d_lat).clamp(-89.0, 89.0),
            wrap_lon(self.position.lon + d_lon),
        );
        self.fuel = (self.fuel - 0.01 * dt).max(0.0);
    }
}

fn wrap_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// The Oracle - maintains ground truth and generates opcode records.
pub struct Oracle {
    /// Master seed (separate from delivery to avoid interference)
    physics_seed: u64,

    /// RNG for noise and lock flips
    physics_rng: ChaCha8Rng,

    /// All flights, keyed by id
    entities: BTreeMap<GlobalId, GroundTruthEntity>,

    next_friendly: GlobalId,
    next_hostile: GlobalId,

    /// Current simulation time (seconds)
    current_time: f64,

    /// Records emitted so far (ticks)
    ticks: u64,

    /// Position noise (nautical miles, 1 sigma)
    position_noise: Option<Normal<f64>>,

    /// Per-tick probability that a hostile's lock status flips
    lock_flip_rate: f64,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            entities: BTreeMap::new(),
            next_friendly: FRIENDLY_BASE_ID,
            next_hostile: HOSTILE_BASE_ID,
            current_time: 0.0,
            ticks: 0,
            position_noise: Normal::new(0.0, 0.05).ok(),
            lock_flip_rate: 0.1,
        }
    }

    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    /// Sets the position noise standard deviation; zero disables noise.
    pub fn set_position_noise(&mut self, std_dev_nm: f64) {
        self.position_noise = if std_dev_nm > 0.0 {
            Normal::new(0.0, std_dev_nm).ok()
        } else {
            None
        };
    }

    /// Spawns a flight and returns its id.
    pub fn spawn_flight(
        &mut self,
        class: EntityClass,
        callsign: &str,
        position: GeoPoint,
        heading_deg: f64,
        speed_kts: f64,
    ) -> GlobalId {
        let id = match class {
            EntityClass::Friendly => {
                self.next_friendly += 1;
                self.next_friendly - 1
            }
            EntityClass::Hostile => {
                self.next_hostile += 1;
                self.next_hostile - 1
            }
        };

        self.entities.insert(
            id,
            GroundTruthEntity {
                id,
                class,
                callsign: callsign.to_string(),
                is_mother: false,
                position,
                altitude_ft: 25_000.0,
                heading_deg,
                speed_kts,
                fuel: 100.0,
                locked_on: false,
                active: true,
            },
        );
        id
    }

    /// Friendly package around the anchor (first flight is the mother)
    /// and a hostile wave inbound from the east.
    pub fn populate(&mut self, friendlies: usize, hostiles: usize) {
        for i in 0..friendlies {
            let offset = GeoPoint::new(
                ANCHOR.lat + self.physics_rng.gen_range(-0.5..0.5),
                ANCHOR.lon + self.physics_rng.gen_range(-0.5..0.5),
            );
            let speed = self.physics_rng.gen_range(380.0..460.0);
            let id = self.spawn_flight(EntityClass::Friendly, &format!("EAGLE{}", i + 1), offset, 90.0, speed);
            if i == 0 {
                if let Some(mother) = self.entities.get_mut(&id) {
                    mother.is_mother = true;
                }
            }
        }

        for i in 0..hostiles {
            let position = GeoPoint::new(
                ANCHOR.lat + self.physics_rng.gen_range(-1.0..1.0),
                ANCHOR.lon + self.physics_rng.gen_range(1.0..1.8),
            );
            let speed = self.physics_rng.gen_range(420.0..520.0);
            self.spawn_flight(EntityClass::Hostile, &format!("BANDIT{}", i + 1), position, 270.0, speed);
        }
    }

    /// Removes a flight (execution). Returns false if unknown.
    pub fn remove_entity(&mut self, id: GlobalId) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.active = false;
                true
            }
            None => false,
        }
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        for entity in self.entities.values_mut().filter(|e| e.active) {
            entity.advance(dt);
        }
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn active_entities(&self) -> impl Iterator<Item = &GroundTruthEntity> {
        self.entities.values().filter(|e| e.active)
    }

    pub fn entity(&self, id: GlobalId) -> Option<&GroundTruthEntity> {
        self.entities.get(&id)
    }

    pub fn mother_id(&self) -> Option<GlobalId> {
        self.active_entities().find(|e| e.is_mother).map(|e| e.id)
    }

    /// First active hostile, in id order.
    pub fn first_hostile(&self) -> Option<GlobalId> {
        self.active_entities()
            .find(|e| e.class == EntityClass::Hostile)
            .map(|e| e.id)
    }

    // ========================================================================
    // RECORD GENERATION
    // ========================================================================

    /// Records a feed would publish for the current tick.
    ///
    /// Every flight reports a noisy position; a rotating third of them
    /// report one metadata group; hostiles report lock status when it
    /// changes or every fifth tick; every tenth tick carries engagement
    /// and annotation snapshots.
    pub fn emit_tick(&mut self) -> Vec<Record> {
        let tick = self.ticks;
        self.ticks += 1;

        let ids: Vec<GlobalId> = self.active_entities().map(|e| e.id).collect();
        let mut records = Vec::with_capacity(ids.len() * 2);

        for &id in &ids {
            if let Some(record) = self.position_record(id, true) {
                records.push(record);
            }
            if (id as u64 + tick) % 3 == 0 {
                if let Some(entity) = self.entities.get(&id) {
                    records.push(Record::metadata(id, metadata_for(entity, Some(tick % 4))));
                }
            }
        }

        for &id in &ids {
            let flip = self.physics_rng.gen_bool(self.lock_flip_rate);
            if let Some(entity) = self.entities.get_mut(&id) {
                if entity.class != EntityClass::Hostile {
                    continue;
                }
                if flip {
                    entity.locked_on = !entity.locked_on;
                }
                if flip || tick % 5 == 0 {
                    records.push(Record::lock_status(id, entity.locked_on));
                }
            }
        }

        if tick % 10 == 0 {
            records.extend(self.engagement_records());
            records.extend(self.annotation_records());
        }
        records
    }

    /// Complete, noise-free picture of every active flight.
    ///
    /// Applying this after any interleaving of earlier records brings a
    /// consumer to the same state as applying everything in order.
    pub fn full_sync(&mut self) -> Vec<Record> {
        let ids: Vec<GlobalId> = self.active_entities().map(|e| e.id).collect();
        let mut records = Vec::new();

        for &id in &ids {
            if let Some(record) = self.position_record(id, false) {
                records.push(record);
            }
            if let Some(entity) = self.entities.get(&id) {
                records.push(Record::metadata(id, metadata_for(entity, None)));
                if entity.class == EntityClass::Hostile {
                    records.push(Record::lock_status(id, entity.locked_on));
                }
            }
        }

        records.extend(self.engagement_records());
        records.extend(self.annotation_records());
        records
    }

    fn position_record(&mut self, id: GlobalId, noisy: bool) -> Option<Record> {
        let (lat_noise, lon_noise) = match (&self.position_noise, noisy) {
            (Some(normal), true) => (
                normal.sample(&mut self.physics_rng) / 60.0,
                normal.sample(&mut self.physics_rng) / 60.0,
            ),
            _ => (0.0, 0.0),
        };

        let entity = self.entities.get(&id)?;
        let report = PositionReport {
            global_id: Some(id),
            latitude: Some((entity.position.lat + lat_noise).clamp(-90.0, 90.0)),
            longitude: Some(wrap_lon(entity.position.lon + lon_noise)),
            altitude: Some(entity.altitude_ft),
        };

        Some(match entity.class {
            EntityClass::Friendly => Record::FriendlyPosition(report),
            EntityClass::Hostile => Record::HostilePosition(report),
        })
    }

    /// Each friendly against its nearest hostile.
    fn engagement_records(&self) -> Vec<Record> {
        let hostiles: Vec<&GroundTruthEntity> = self
            .active_entities()
            .filter(|e| e.class == EntityClass::Hostile)
            .collect();

        self.active_entities()
            .filter(|e| e.class == EntityClass::Friendly)
            .filter_map(|friendly| {
                let (target, distance) = hostiles
                    .iter()
                    .map(|h| (h, haversine_nm(friendly.position, h.position)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;

                let launched = distance <= LAUNCH_RANGE_NM;
                Some(Record::Engagement(EngagementReport {
                    attacker_global_id: Some(friendly.id),
                    target_global_id: Some(target.id),
                    weapon_launch: Some(launched),
                    hang_fire: Some(false),
                    tth: Some(if launched { distance / WEAPON_SPEED_KTS * 3600.0 } else { 0.0 }),
                    tta: Some(distance / (friendly.speed_kts + target.speed_kts).max(1.0) * 3600.0),
                    range_min: Some(2.0),
                    range_max1: Some(LAUNCH_RANGE_NM),
                    range_max2: Some(LAUNCH_RANGE_NM * 1.5),
                    weapon_code: Some(120),
                }))
            })
            .collect()
    }

    /// A beacon at the anchor, the mother's next waypoint, and an alert
    /// on every hostile that currently holds a lock.
    fn annotation_records(&self) -> Vec<Record> {
        let mut records = vec![annotation(1, ANCHOR, AnnotationCategory::Beacon, Severity::Info, Some("HOME"))];

        if let Some(mother) = self.mother_id().and_then(|id| self.entities.get(&id)) {
            let ahead = GeoPoint::new(mother.position.lat, wrap_lon(mother.position.lon + 0.5));
            records.push(annotation(2, ahead, AnnotationCategory::Waypoint, Severity::Info, Some("WP1")));
        }

        for hostile in self
            .active_entities()
            .filter(|e| e.class == EntityClass::Hostile && e.locked_on)
        {
            records.push(annotation(
                100 + hostile.id,
                hostile.position,
                AnnotationCategory::Alert,
                Severity::Warning,
                None,
            ));
        }
        records
    }

    /// Ground truth for export frames.
    pub fn ground_truth_positions(&self) -> Vec<(GlobalId, EntityClass, GeoPoint)> {
        self.active_entities().map(|e| (e.id, e.class, e.position)).collect()
    }
}

fn annotation(
    message_id: u32,
    point: GeoPoint,
    category: AnnotationCategory,
    severity: Severity,
    label: Option<&str>,
) -> Record {
    Record::GeoAnnotation(AnnotationReport {
        message_id: Some(message_id),
        latitude: Some(point.lat),
        longitude: Some(point.lon),
        category: Some(category),
        severity: Some(severity),
        label: label.map(str::to_string),
    })
}

/// Metadata for a flight: one group (`Some(0..=3)`) or everything (`None`).
fn metadata_for(entity: &GroundTruthEntity, group: Option<u64>) -> Metadata {
    let wants = |g: u64| group.map_or(true, |selected| selected == g);

    let mut metadata = Metadata {
        callsign: Some(entity.callsign.clone()),
        ..Default::default()
    };

    if wants(0) {
        metadata.internal = Some(InternalMeta {
            is_mother_ac: Some(u8::from(entity.is_mother)),
            track_id: Some(entity.id * 10),
            node_id: Some(entity.id),
            role: Some(if entity.is_mother { "lead" } else { "wing" }.to_string()),
        });
    }
    if wants(1) {
        metadata.regional = Some(RegionalMeta {
            category: Some("fighter".to_string()),
            is_emergency: Some(entity.fuel < 10.0),
            is_sos: Some(false),
            squawk: Some(format!("{:04}", 4000 + entity.id % 1000)),
            telemetry: Some(Telemetry {
                baro_altitude: Some(entity.altitude_ft),
                ground_speed: Some(entity.speed_kts),
                mach: Some(entity.speed_kts / 661.5),
                heading: Some(entity.heading_deg),
            }),
        });
    }
    if wants(2) {
        metadata.battle_group = Some(BattleGroupMeta {
            fuel: Some(entity.fuel),
            arm_status: Some("armed".to_string()),
            weapons: Some(vec!["AAM-120".to_string(), "GUN".to_string()]),
            sensors: Some(vec!["RADAR".to_string(), "IRST".to_string()]),
            lock_ids: None,
        });
    }
    if wants(3) {
        metadata.radio = Some(RadioMeta {
            frequencies: Some(vec![251.0, 305.5]),
            network_ids: Some(vec![7]),
            channel: Some((entity.id % 16) as u16),
        });
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_populate_ids() {
        let mut oracle = Oracle::new(42);
        oracle.populate(3, 2);

        let ids: Vec<_> = oracle.active_entities().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 1001, 1002]);
        assert_eq!(oracle.mother_id(), Some(1));
        assert_eq!(oracle.first_hostile(), Some(1001));
    }

    #[test]
    fn test_oracle_physics_step() {
        let mut oracle = Oracle::new(42);
        let id = oracle.spawn_flight(EntityClass::Friendly, "A", GeoPoint::new(0.0, 0.0), 0.0, 3600.0);

        oracle.step(1.0); // 1 NM due north

        let entity = oracle.entity(id).unwrap();
        assert!((entity.position.lat - 1.0 / 60.0).abs() < 1e-9);
        assert!(entity.position.lon.abs() < 1e-9);
    }

    #[test]
    fn test_oracle_deterministic_records() {
        let mut oracle1 = Oracle::new(42);
        let mut oracle2 = Oracle::new(42);
        oracle1.populate(2, 2);
        oracle2.populate(2, 2);

        // Same seed = same noise and lock flips
        assert_eq!(oracle1.emit_tick(), oracle2.emit_tick());
        assert_eq!(oracle1.emit_tick(), oracle2.emit_tick());
    }

    #[test]
    fn test_full_sync_covers_every_flight() {
        let mut oracle = Oracle::new(7);
        oracle.populate(2, 1);
        oracle.remove_entity(2);

        let records = oracle.full_sync();
        let positions = records
            .iter()
            .filter(|r| r.position_class().is_some())
            .count();
        assert_eq!(positions, 2);
        assert!(records.iter().any(|r| matches!(r, Record::Engagement(_))));
        assert!(records.iter().any(|r| matches!(r, Record::GeoAnnotation(_))));
        assert!(records.iter().all(|r| r.subject() != Some(2)));
    }

    #[test]
    fn test_partial_metadata_groups() {
        let mut oracle = Oracle::new(1);
        oracle.populate(1, 0);
        let entity = oracle.entity(1).unwrap();

        let partial = metadata_for(entity, Some(2));
        assert!(partial.battle_group.is_some());
        assert!(partial.internal.is_none());

        let full = metadata_for(entity, None);
        assert!(full.internal.is_some() && full.regional.is_some() && full.radio.is_some());
    }
}
