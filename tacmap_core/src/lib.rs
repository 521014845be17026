//! TacMap Core - entity fusion for a tactical map.
//!
//! Feeds deliver small opcode-tagged records that each describe one slice of
//! an entity (position, metadata, engagement, threat lock, annotation). This
//! library keeps a single consistent model from them:
//! 1. **Merge**: field-level union per entity, independent of arrival order
//! 2. **Selection**: a stable reference entity plus zoom-to-fit for the camera
//! 3. **Interaction**: operator locks, executions and threat-lock correlation

pub mod annotation;
pub mod config;
pub mod engagement;
pub mod engine;
pub mod entity;
pub mod error;
pub(crate) mod flags;
pub mod geometry;
pub mod interaction;
pub mod merge;
pub mod proximity;
pub mod record;
pub mod report;
pub mod selector;
pub mod service;
pub mod snapshot;
pub mod store;

// Re-export key types for convenience
pub use annotation::{AnnotationApply, AnnotationCategory, AnnotationLayer, GeoAnnotation, Severity};
pub use config::{FusionConfig, ZoomConfig};
pub use engagement::{Engagement, EngagementGeometry, EngagementTable};
pub use engine::FusionEngine;
pub use entity::{Entity, EntityClass, GlobalId, Merge, Metadata, Position};
pub use error::FusionError;
pub use geometry::{haversine_nm, zoom_to_fit, BoundingBox, CameraFit, GeoPoint, Viewport};
pub use interaction::InteractionTracker;
pub use merge::{merge_into, MergeOutcome};
pub use proximity::ProximityAlert;
pub use record::{decode_batch, encode_batch, Opcode, Record};
pub use report::{IngestObserver, IngestReport, SkippedRecord};
pub use selector::{select_center, CenterReference};
pub use service::{Command, FusionHandle, FusionService, ServiceConfig, SnapshotReader};
pub use snapshot::{CameraView, Snapshot};
pub use store::EntityStore;
