//! Entity Store - the single source of truth for tracked entities.
//!
//! Keyed by `GlobalId` in a `BTreeMap`, so iteration is always ascending by
//! id. Selection tie-breaks and snapshots rely on that order.

use std::collections::BTreeMap;

use crate::entity::{Entity, GlobalId};
use crate::geometry::GeoPoint;

/// Keyed collection of entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    entities: BTreeMap<GlobalId, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: GlobalId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: GlobalId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: GlobalId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Inserts or replaces, returning the previous value.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.global_id, entity)
    }

    pub fn remove(&mut self, id: GlobalId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = GlobalId> + '_ {
        self.entities.keys().copied()
    }

    /// Entities that have a known position.
    pub fn positioned(&self) -> impl Iterator<Item = (&Entity, GeoPoint)> {
        self.entities.values().filter_map(|e| e.point().map(|p| (e, p)))
    }

    /// Entities that have received at least one metadata report.
    pub fn network_members(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.network_member)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityClass, Metadata, Position};

    #[test]
    fn test_store_iterates_in_id_order() {
        let mut store = EntityStore::new();
        for id in [30, 10, 20] {
            store.insert(Entity::from_position(id, EntityClass::Friendly, Position::new(0.0, 0.0)));
        }
        let ids: Vec<_> = store.ids().collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_store_positioned_and_members() {
        let mut store = EntityStore::new();
        store.insert(Entity::from_position(1, EntityClass::Hostile, Position::new(1.0, 1.0)));
        store.insert(Entity::from_metadata(2, Metadata::with_callsign("VIPER")));

        assert_eq!(store.positioned().count(), 1);
        let members: Vec<_> = store.network_members().map(|e| e.global_id).collect();
        assert_eq!(members, vec![2]);

        assert!(store.remove(1).is_some());
        assert!(!store.contains(1));
        assert_eq!(store.len(), 1);
    }
}
