//! FusionEngine - ingest dispatcher and query API.
//!
//! Owns the entity store and every sub-tracker. A batch is split by opcode
//! and applied in fixed phases:
//!
//! ```text
//!   batch ──► classify ──► 106 threat locks
//!                      ──► 101/102/104 merge (batch order)
//!                      ──► 103 engagement table (replace)
//!                      ──► 122 annotation layer (replace or buffer)
//! ```
//!
//! Bad records are skipped one at a time; the rest of the batch still
//! applies. The engine is synchronous: `ingest` finishes the batch before
//! returning.

use tracing::{debug, trace, warn};

use crate::annotation::{AnnotationLayer, GeoAnnotation};
use crate::config::FusionConfig;
use crate::engagement::{Engagement, EngagementGeometry, EngagementTable};
use crate::entity::{Entity, GlobalId};
use crate::error::FusionError;
use crate::geometry::{zoom_to_fit, BoundingBox, CameraFit, GeoPoint};
use crate::interaction::InteractionTracker;
use crate::merge::{merge_into, MergeOutcome};
use crate::proximity::{proximity_alerts, ProximityAlert};
use crate::record::{AnnotationReport, EngagementReport, LockStatusReport, Record};
use crate::report::{IngestObserver, IngestReport};
use crate::selector::{select_center, CenterReference};
use crate::snapshot::{CameraView, Snapshot};
use crate::store::EntityStore;

pub struct FusionEngine {
    config: FusionConfig,
    store: EntityStore,
    interactions: InteractionTracker,
    engagements: EngagementTable,
    annotations: AnnotationLayer,
    camera: Option<Box<dyn CameraFit + Send + Sync>>,
    observers: Vec<Box<dyn IngestObserver>>,
    batch_count: u64,
}

impl FusionEngine {
    /// Creates an engine, rejecting a config the geometry code cannot use.
    pub fn new(config: FusionConfig) -> Result<Self, FusionError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    pub fn with_defaults() -> Self {
        Self::from_valid(FusionConfig::default())
    }

    fn from_valid(config: FusionConfig) -> Self {
        let annotations = AnnotationLayer::new(config.annotation_layer_ready);
        Self {
            config,
            store: EntityStore::new(),
            interactions: InteractionTracker::new(),
            engagements: EngagementTable::new(),
            annotations,
            camera: None,
            observers: Vec::new(),
            batch_count: 0,
        }
    }

    /// Installs the map engine's camera-fit routine for zoom computation.
    pub fn set_camera_fit(&mut self, camera: Box<dyn CameraFit + Send + Sync>) {
        self.camera = Some(camera);
    }

    /// Registers an observer called after every batch.
    pub fn subscribe(&mut self, observer: Box<dyn IngestObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Applies one batch of records.
    pub fn ingest(&mut self, batch: &[Record]) -> IngestReport {
        let mut report = IngestReport::default();

        let mut locks: Vec<(usize, &LockStatusReport)> = Vec::new();
        let mut entity_records: Vec<(usize, &Record)> = Vec::new();
        let mut engagement_reports: Vec<(usize, &EngagementReport)> = Vec::new();
        let mut annotation_reports: Vec<(usize, &AnnotationReport)> = Vec::new();

        for (index, record) in batch.iter().enumerate() {
            match record {
                Record::ThreatLock(r) => locks.push((index, r)),
                Record::FriendlyPosition(_) | Record::HostilePosition(_) | Record::Metadata(_) => {
                    entity_records.push((index, record))
                }
                Record::Engagement(r) => engagement_reports.push((index, r)),
                Record::GeoAnnotation(r) => annotation_reports.push((index, r)),
                Record::Unknown(code) => {
                    trace!("Ignoring record {}: {}", index, FusionError::UnknownOpcode(*code));
                    report.unknown += 1;
                }
                Record::Malformed { opcode, reason } => {
                    let err = FusionError::MalformedRecord {
                        opcode: *opcode,
                        reason: reason.clone(),
                    };
                    self.skip(&mut report, index, err);
                }
            }
        }

        self.apply_threat_locks(&locks, &mut report);
        self.apply_entity_records(&entity_records, &mut report);
        self.apply_engagements(&engagement_reports, &mut report);
        self.apply_annotations(&annotation_reports, &mut report);

        self.batch_count += 1;
        debug!(
            "Batch {}: {} records, {} created, {} updated, {} unchanged, {} skipped",
            self.batch_count,
            batch.len(),
            report.created.len(),
            report.updated.len(),
            report.unchanged,
            report.skipped.len()
        );

        for observer in &mut self.observers {
            observer.on_ingest(&report);
        }
        report
    }

    fn skip(&self, report: &mut IngestReport, index: usize, err: FusionError) {
        warn!("Skipping record {}: {}", index, err);
        report.skip(index, &err);
    }

    fn apply_threat_locks(&mut self, locks: &[(usize, &LockStatusReport)], report: &mut IngestReport) {
        for &(index, lock) in locks {
            let (id, on) = match lock.validate() {
                Ok(v) => v,
                Err(e) => {
                    self.skip(report, index, e);
                    continue;
                }
            };
            if self.interactions.is_executed(id) {
                self.skip(report, index, FusionError::EntityExecuted(id));
                continue;
            }
            if self.interactions.apply_threat_lock(id, on) && !report.threat_locks_changed.contains(&id) {
                report.threat_locks_changed.push(id);
            }
        }
    }

    fn apply_entity_records(&mut self, records: &[(usize, &Record)], report: &mut IngestReport) {
        for &(index, record) in records {
            if let Some(id) = record.subject().filter(|id| self.interactions.is_executed(*id)) {
                self.skip(report, index, FusionError::EntityExecuted(id));
                continue;
            }
            match merge_into(&mut self.store, record) {
                Ok((id, MergeOutcome::Created)) => report.touch_created(id),
                Ok((id, MergeOutcome::Updated)) => report.touch_updated(id),
                Ok((_, MergeOutcome::Unchanged)) => report.unchanged += 1,
                Err(e) => self.skip(report, index, e),
            }
        }
    }

    fn apply_engagements(&mut self, reports: &[(usize, &EngagementReport)], report: &mut IngestReport) {
        if reports.is_empty() {
            return;
        }
        let (indices, records): (Vec<usize>, Vec<&EngagementReport>) = reports.iter().copied().unzip();
        let rejected = self.engagements.replace(records.iter().copied());
        report.engagements_replaced = rejected.len() < records.len();
        for (position, err) in rejected {
            self.skip(report, indices[position], err);
        }
    }

    fn apply_annotations(&mut self, reports: &[(usize, &AnnotationReport)], report: &mut IngestReport) {
        let mut valid = Vec::new();
        for &(index, r) in reports {
            match r.validate() {
                Ok(annotation) => valid.push(annotation),
                Err(e) => self.skip(report, index, e),
            }
        }
        if !valid.is_empty() {
            report.annotations = Some(self.annotations.replace_or_buffer(valid));
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Manual operator lock. Returns false if already locked.
    pub fn lock(&mut self, id: GlobalId) -> bool {
        self.interactions.lock(id)
    }

    /// Executes `id`: removes it from the store and ignores its future records.
    pub fn execute(&mut self, id: GlobalId) -> bool {
        let removed = self.interactions.execute(id, &mut self.store);
        debug!("Executed entity {} (removed: {})", id, removed);
        removed
    }

    /// Annotation layer is ready; applies any buffered batch.
    pub fn mark_layer_ready(&mut self) -> bool {
        self.annotations.mark_ready()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.iter()
    }

    pub fn network_members(&self) -> impl Iterator<Item = &Entity> {
        self.store.network_members()
    }

    pub fn entity(&self, id: GlobalId) -> Option<&Entity> {
        self.store.get(id)
    }

    /// Map center and the zoom that keeps every positioned entity in view.
    pub fn center_reference(&self) -> Option<(CenterReference, f64)> {
        let reference = select_center(&self.store)?;
        let points: Vec<GeoPoint> = self.store.positioned().map(|(_, p)| p).collect();
        let bbox = BoundingBox::around(reference.point(), &points);
        let camera = self.camera.as_deref().map(|c| c as &dyn CameraFit);
        let zoom = zoom_to_fit(&bbox, self.config.viewport, &self.config.zoom, camera);
        Some((reference, zoom))
    }

    pub fn is_locked(&self, id: GlobalId) -> bool {
        self.interactions.is_locked(id)
    }

    pub fn is_manually_locked(&self, id: GlobalId) -> bool {
        self.interactions.is_manually_locked(id)
    }

    pub fn threat_lock_status(&self, id: GlobalId) -> Option<bool> {
        self.interactions.threat_lock_status(id)
    }

    pub fn is_executed(&self, id: GlobalId) -> bool {
        self.interactions.is_executed(id)
    }

    pub fn engagements(&self) -> impl Iterator<Item = &Engagement> {
        self.engagements.all()
    }

    pub fn engagement(&self, attacker: GlobalId) -> Option<&Engagement> {
        self.engagements.get(attacker)
    }

    pub fn engagement_geometry(&self, attacker: GlobalId) -> Option<EngagementGeometry> {
        self.engagements.get(attacker)?.geometry(&self.store)
    }

    pub fn geo_annotations(&self) -> impl Iterator<Item = &GeoAnnotation> {
        self.annotations.all()
    }

    pub fn annotation_layer_ready(&self) -> bool {
        self.annotations.is_ready()
    }

    pub fn proximity_alerts(&self, threshold_nm: f64) -> Vec<ProximityAlert> {
        proximity_alerts(&self.store, threshold_nm)
    }

    /// Builds an immutable copy of everything the renderer reads.
    pub fn snapshot(&self) -> Snapshot {
        let engagements: Vec<Engagement> = self.engagements.all().cloned().collect();
        let engagement_lines = engagements
            .iter()
            .filter_map(|e| e.geometry(&self.store).map(|g| (e.attacker, g)))
            .collect();

        Snapshot {
            batch_count: self.batch_count,
            entities: self.store.iter().cloned().collect(),
            network_members: self.store.network_members().map(|e| e.global_id).collect(),
            camera: self
                .center_reference()
                .map(|(reference, zoom)| CameraView { reference, zoom }),
            locked: self.interactions.locked_ids().collect(),
            executed: self.interactions.executed_ids().collect(),
            threat_locks: self.interactions.threat_locks().collect(),
            engagements,
            engagement_lines,
            annotations: self.annotations.all().cloned().collect(),
            proximity_alerts: self.proximity_alerts(self.config.proximity_threshold_nm),
        }
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
