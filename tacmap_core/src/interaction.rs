//! Interaction State Tracker - operator locks, executions and threat locks.
//!
//! Two independent sources make an entity "locked": the operator's manual
//! lock and the latest opcode-106 report for it. Neither source can clear
//! the other.

use std::collections::{BTreeMap, BTreeSet};

use crate::entity::GlobalId;
use crate::store::EntityStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionTracker {
    locked: BTreeSet<GlobalId>,
    executed: BTreeSet<GlobalId>,
    threat_locks: BTreeMap<GlobalId, bool>,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manual lock. Returns false if it was already locked.
    pub fn lock(&mut self, id: GlobalId) -> bool {
        self.locked.insert(id)
    }

    /// Marks `id` executed and removes it from the store.
    ///
    /// Lock state is left in place. Returns true when an entity was removed.
    pub fn execute(&mut self, id: GlobalId, store: &mut EntityStore) -> bool {
        self.executed.insert(id);
        store.remove(id).is_some()
    }

    /// Records an opcode-106 status. Returns true if the stored value changed.
    pub fn apply_threat_lock(&mut self, id: GlobalId, is_lock_on: bool) -> bool {
        self.threat_locks.insert(id, is_lock_on) != Some(is_lock_on)
    }

    /// Manual lock OR threat lock on.
    pub fn is_locked(&self, id: GlobalId) -> bool {
        self.is_manually_locked(id) || self.threat_lock_status(id) == Some(true)
    }

    pub fn is_manually_locked(&self, id: GlobalId) -> bool {
        self.locked.contains(&id)
    }

    pub fn threat_lock_status(&self, id: GlobalId) -> Option<bool> {
        self.threat_locks.get(&id).copied()
    }

    pub fn is_executed(&self, id: GlobalId) -> bool {
        self.executed.contains(&id)
    }

    pub fn locked_ids(&self) -> impl Iterator<Item = GlobalId> + '_ {
        self.locked
            .iter()
            .copied()
            .chain(self.threat_locks.iter().filter(|(id, on)| **on && !self.locked.contains(*id)).map(|(id, _)| *id))
    }

    /// Latest opcode-106 status per threat id.
    pub fn threat_locks(&self) -> impl Iterator<Item = (GlobalId, bool)> + '_ {
        self.threat_locks.iter().map(|(id, on)| (*id, *on))
    }

    pub fn executed_ids(&self) -> impl Iterator<Item = GlobalId> + '_ {
        self.executed.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityClass, Position};

    #[test]
    fn test_lock_union() {
        let mut tracker = InteractionTracker::new();

        tracker.lock(9);
        tracker.apply_threat_lock(9, false);
        assert!(tracker.is_locked(9));

        tracker.apply_threat_lock(3, true);
        assert!(tracker.is_locked(3));
        assert!(!tracker.is_manually_locked(3));

        tracker.apply_threat_lock(3, false);
        assert!(!tracker.is_locked(3));
    }

    #[test]
    fn test_lock_is_idempotent() {
        let mut tracker = InteractionTracker::new();
        assert!(tracker.lock(1));
        assert!(!tracker.lock(1));
        assert_eq!(tracker.locked_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_threat_lock_change_detection() {
        let mut tracker = InteractionTracker::new();
        assert!(tracker.apply_threat_lock(4, true));
        assert!(!tracker.apply_threat_lock(4, true));
        assert!(tracker.apply_threat_lock(4, false));
        assert_eq!(tracker.threat_lock_status(4), Some(false));
    }

    #[test]
    fn test_execute_removes_entity_keeps_lock() {
        let mut store = EntityStore::new();
        store.insert(Entity::from_position(8, EntityClass::Hostile, Position::new(0.0, 0.0)));
        let mut tracker = InteractionTracker::new();
        tracker.lock(8);

        assert!(tracker.execute(8, &mut store));
        assert!(tracker.is_executed(8));
        assert!(tracker.is_manually_locked(8));
        assert!(!store.contains(8));

        // unknown id still becomes executed
        assert!(!tracker.execute(99, &mut store));
        assert!(tracker.is_executed(99));
    }
}
