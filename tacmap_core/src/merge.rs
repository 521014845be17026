//! Opcode Merge Resolver.
//!
//! Applies one entity-bearing record (101/102/104) to the store. Position
//! and metadata are disjoint halves of an entity, so the two orders of
//! arrival converge on the same value.

use serde::Serialize;

use crate::entity::{Entity, EntityClass, GlobalId, Metadata, Position};
use crate::error::FusionError;
use crate::record::{Opcode, Record};
use crate::store::EntityStore;

/// Effect of a single merge on the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Applies a position to `id`: insert when absent, otherwise latest wins.
pub fn merge_position(store: &mut EntityStore, id: GlobalId, class: EntityClass, position: Position) -> MergeOutcome {
    match store.get_mut(id) {
        Some(existing) => {
            let before = existing.clone();
            existing.apply_position(class, position);
            changed(&before, existing)
        }
        None => {
            store.insert(Entity::from_position(id, class, position));
            MergeOutcome::Created
        }
    }
}

/// Deep-merges metadata into `id`, creating a provisional entity when absent.
pub fn merge_metadata(store: &mut EntityStore, id: GlobalId, metadata: &Metadata) -> MergeOutcome {
    match store.get_mut(id) {
        Some(existing) => {
            let before = existing.clone();
            existing.apply_metadata(metadata);
            changed(&before, existing)
        }
        None => {
            store.insert(Entity::from_metadata(id, metadata.clone()));
            MergeOutcome::Created
        }
    }
}

fn changed(before: &Entity, after: &Entity) -> MergeOutcome {
    if before == after {
        MergeOutcome::Unchanged
    } else {
        MergeOutcome::Updated
    }
}

/// Validates and merges one record, returning the entity id and outcome.
///
/// Only 101/102/104 touch the store; any other record is an error here and
/// is routed elsewhere by the dispatcher.
pub fn merge_into(store: &mut EntityStore, record: &Record) -> Result<(GlobalId, MergeOutcome), FusionError> {
    match record {
        Record::FriendlyPosition(report) => {
            let (id, position) = report.validate(Opcode::FriendlyPosition)?;
            Ok((id, merge_position(store, id, EntityClass::Friendly, position)))
        }
        Record::HostilePosition(report) => {
            let (id, position) = report.validate(Opcode::HostilePosition)?;
            Ok((id, merge_position(store, id, EntityClass::Hostile, position)))
        }
        Record::Metadata(report) => {
            let (id, metadata) = report.validate()?;
            Ok((id, merge_metadata(store, id, metadata)))
        }
        Record::Malformed { opcode, reason } => Err(FusionError::MalformedRecord {
            opcode: *opcode,
            reason: reason.clone(),
        }),
        other => Err(FusionError::MalformedRecord {
            opcode: other.opcode(),
            reason: "record does not carry entity state".to_string(),
        }),
    }
}
