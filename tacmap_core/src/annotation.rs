//! GeoAnnotation layer - operator markers keyed by message id.
//!
//! Independent of the entity store. Each batch with opcode-122 records
//! replaces the table. Until the map layer reports ready, the latest batch
//! is parked in a single pending slot and applied on `mark_ready`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationCategory {
    Waypoint,
    Alert,
    Target,
    Event,
    Beacon,
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Alert,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoAnnotation {
    pub message_id: u32,
    pub point: GeoPoint,
    pub category: AnnotationCategory,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// What `replace_or_buffer` did with a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationApply {
    Replaced,
    Buffered,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationLayer {
    ready: bool,
    active: BTreeMap<u32, GeoAnnotation>,
    pending: Option<Vec<GeoAnnotation>>,
}

impl AnnotationLayer {
    pub fn new(ready: bool) -> Self {
        Self {
            ready,
            ..Default::default()
        }
    }

    pub fn replace_or_buffer(&mut self, annotations: Vec<GeoAnnotation>) -> AnnotationApply {
        if self.ready {
            self.install(annotations);
            AnnotationApply::Replaced
        } else {
            if self.pending.is_some() {
                debug!("annotation layer not ready, dropping older pending batch");
            }
            self.pending = Some(annotations);
            AnnotationApply::Buffered
        }
    }

    /// Marks the layer ready and flushes the pending batch.
    ///
    /// Returns true if a pending batch was applied.
    pub fn mark_ready(&mut self) -> bool {
        self.ready = true;
        match self.pending.take() {
            Some(pending) => {
                self.install(pending);
                true
            }
            None => false,
        }
    }

    fn install(&mut self, annotations: Vec<GeoAnnotation>) {
        self.active = annotations.into_iter().map(|a| (a.message_id, a)).collect();
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn all(&self) -> impl Iterator<Item = &GeoAnnotation> {
        self.active.values()
    }

    pub fn get(&self, message_id: u32) -> Option<&GeoAnnotation> {
        self.active.get(&message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(id: u32, severity: Severity) -> GeoAnnotation {
        GeoAnnotation {
            message_id: id,
            point: GeoPoint::new(1.0, 1.0),
            category: AnnotationCategory::Alert,
            severity,
            label: None,
        }
    }

    #[test]
    fn test_buffered_until_ready_latest_wins() {
        let mut layer = AnnotationLayer::new(false);

        assert_eq!(layer.replace_or_buffer(vec![annotation(1, Severity::Info)]), AnnotationApply::Buffered);
        assert_eq!(layer.replace_or_buffer(vec![annotation(2, Severity::Info)]), AnnotationApply::Buffered);
        assert_eq!(layer.all().count(), 0);

        assert!(layer.mark_ready());
        assert!(layer.get(1).is_none());
        assert!(layer.get(2).is_some());
        assert!(!layer.mark_ready());
    }

    #[test]
    fn test_replace_when_ready() {
        let mut layer = AnnotationLayer::new(true);
        layer.replace_or_buffer(vec![annotation(1, Severity::Info), annotation(2, Severity::Critical)]);
        assert_eq!(layer.replace_or_buffer(vec![annotation(3, Severity::Warning)]), AnnotationApply::Replaced);

        let ids: Vec<_> = layer.all().map(|a| a.message_id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::Alert);
        assert!(Severity::Warning > Severity::Info);
    }
}
