//! Per-batch change reports.
//!
//! `FusionEngine::ingest` returns an `IngestReport` describing what the
//! batch changed; registered observers receive the same report.

use serde::Serialize;

use crate::annotation::AnnotationApply;
use crate::entity::GlobalId;
use crate::error::FusionError;

/// A record the dispatcher did not apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    /// Position in the batch
    pub index: usize,
    pub opcode: Option<u16>,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(index: usize, error: &FusionError) -> Self {
        Self {
            index,
            opcode: error.opcode(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Entities first seen in this batch
    pub created: Vec<GlobalId>,
    /// Existing entities whose state changed
    pub updated: Vec<GlobalId>,
    /// Merges that left the entity as it was
    pub unchanged: usize,
    /// Threat ids whose lock status changed
    pub threat_locks_changed: Vec<GlobalId>,
    /// Engagement table was replaced
    pub engagements_replaced: bool,
    pub annotations: Option<AnnotationApply>,
    pub skipped: Vec<SkippedRecord>,
    /// Records with opcodes this engine does not handle
    pub unknown: usize,
}

impl IngestReport {
    /// True if any queryable state changed.
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty()
            || !self.updated.is_empty()
            || !self.threat_locks_changed.is_empty()
            || self.engagements_replaced
            || self.annotations == Some(AnnotationApply::Replaced)
    }

    pub(crate) fn skip(&mut self, index: usize, error: &FusionError) {
        self.skipped.push(SkippedRecord::new(index, error));
    }

    /// Records an entity id once, preferring `created` over `updated`.
    pub(crate) fn touch_created(&mut self, id: GlobalId) {
        if !self.created.contains(&id) {
            self.created.push(id);
        }
    }

    pub(crate) fn touch_updated(&mut self, id: GlobalId) {
        if !self.created.contains(&id) && !self.updated.contains(&id) {
            self.updated.push(id);
        }
    }
}

/// Receives a report after every ingested batch.
pub trait IngestObserver: Send {
    fn on_ingest(&mut self, report: &IngestReport);
}

impl<F> IngestObserver for F
where
    F: FnMut(&IngestReport) + Send,
{
    fn on_ingest(&mut self, report: &IngestReport) {
        self(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_takes_precedence() {
        let mut report = IngestReport::default();
        report.touch_created(1);
        report.touch_updated(1);
        report.touch_updated(2);
        report.touch_updated(2);

        assert_eq!(report.created, vec![1]);
        assert_eq!(report.updated, vec![2]);
        assert!(report.has_changes());
    }

    #[test]
    fn test_empty_report_has_no_changes() {
        let mut report = IngestReport::default();
        report.unchanged = 3;
        report.annotations = Some(AnnotationApply::Buffered);
        report.skip(0, &FusionError::UnknownOpcode(7));

        assert!(!report.has_changes());
        assert_eq!(report.skipped[0].opcode, Some(7));
    }
}
