//! Reference-Entity Selector - which point the map centers on.
//!
//! Preference order:
//! 1. the first mother entity (ascending id) with a position
//! 2. the friendly closest to the centroid of all friendlies
//! 3. a synthetic centroid of every positioned entity
//!
//! Ties always go to the lowest id, so the same store selects the same
//! center every time.

use serde::Serialize;

use crate::entity::GlobalId;
use crate::geometry::{centroid, haversine_nm, GeoPoint};
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CenterReference {
    Entity { global_id: GlobalId, point: GeoPoint },
    Centroid { point: GeoPoint },
}

impl CenterReference {
    pub fn point(&self) -> GeoPoint {
        match self {
            CenterReference::Entity { point, .. } | CenterReference::Centroid { point } => *point,
        }
    }

    pub fn global_id(&self) -> Option<GlobalId> {
        match self {
            CenterReference::Entity { global_id, .. } => Some(*global_id),
            CenterReference::Centroid { .. } => None,
        }
    }
}

pub fn select_center(store: &EntityStore) -> Option<CenterReference> {
    if let Some((mother, point)) = store.positioned().find(|(e, _)| e.is_mother()) {
        return Some(CenterReference::Entity {
            global_id: mother.global_id,
            point,
        });
    }

    let friendlies: Vec<(GlobalId, GeoPoint)> = store
        .positioned()
        .filter(|(e, _)| e.is_friendly())
        .map(|(e, p)| (e.global_id, p))
        .collect();

    let friendly_points: Vec<GeoPoint> = friendlies.iter().map(|(_, p)| *p).collect();
    if let Some(mid) = centroid(&friendly_points) {
        // strict `<` keeps the first (lowest id) on ties
        let mut best: Option<(GlobalId, GeoPoint, f64)> = None;
        for &(id, point) in &friendlies {
            let d = haversine_nm(point, mid);
            if best.map_or(true, |(_, _, best_d)| d < best_d) {
                best = Some((id, point, d));
            }
        }
        if let Some((global_id, point, _)) = best {
            return Some(CenterReference::Entity { global_id, point });
        }
    }

    let all_points: Vec<GeoPoint> = store.positioned().map(|(_, p)| p).collect();
    centroid(&all_points).map(|point| CenterReference::Centroid { point })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityClass, InternalMeta, Metadata, Position};

    fn friendly(id: GlobalId, lat: f64, lon: f64) -> Entity {
        Entity::from_position(id, EntityClass::Friendly, Position::new(lat, lon))
    }

    fn mother_meta() -> Metadata {
        Metadata {
            internal: Some(InternalMeta {
                is_mother_ac: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store_has_no_center() {
        assert_eq!(select_center(&EntityStore::new()), None);
    }

    #[test]
    fn test_mother_wins() {
        let mut store = EntityStore::new();
        store.insert(friendly(1, 0.0, 0.0));
        let mut mother = friendly(7, 30.0, 30.0);
        mother.apply_metadata(&mother_meta());
        store.insert(mother);

        assert_eq!(select_center(&store).and_then(|c| c.global_id()), Some(7));
    }

    #[test]
    fn test_mother_without_position_is_skipped() {
        let mut store = EntityStore::new();
        store.insert(Entity::from_metadata(1, mother_meta()));
        store.insert(friendly(2, 5.0, 5.0));

        assert_eq!(select_center(&store).and_then(|c| c.global_id()), Some(2));
    }

    #[test]
    fn test_closest_friendly_to_centroid() {
        let mut store = EntityStore::new();
        store.insert(friendly(1, 0.0, 0.0));
        store.insert(friendly(2, 0.0, 1.0));
        store.insert(friendly(3, 0.0, 5.0));

        // centroid lon = 2.0, closest is id 2
        assert_eq!(select_center(&store).and_then(|c| c.global_id()), Some(2));
    }

    #[test]
    fn test_equidistant_tie_is_deterministic() {
        let mut store = EntityStore::new();
        store.insert(friendly(11, 0.0, 2.0));
        store.insert(friendly(10, 0.0, 0.0));

        let first = select_center(&store);
        assert_eq!(first.and_then(|c| c.global_id()), Some(10));
        assert_eq!(select_center(&store.clone()), first);
    }

    #[test]
    fn test_hostiles_only_yield_centroid() {
        let mut store = EntityStore::new();
        store.insert(Entity::from_position(1, EntityClass::Hostile, Position::new(0.0, 0.0)));
        store.insert(Entity::from_position(2, EntityClass::Hostile, Position::new(2.0, 0.0)));

        match select_center(&store) {
            Some(CenterReference::Centroid { point }) => {
                assert!((point.lat - 1.0).abs() < 1e-9);
            }
            other => panic!("expected centroid, got {:?}", other),
        }
    }
}
