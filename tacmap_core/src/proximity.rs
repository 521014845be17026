//! Friendly/hostile separation alerts.

use serde::Serialize;

use crate::entity::GlobalId;
use crate::geometry::haversine_nm;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityAlert {
    pub friendly: GlobalId,
    pub hostile: GlobalId,
    pub distance_nm: f64,
}

/// Positioned friendly/hostile pairs closer than `threshold_nm`, nearest first.
pub fn proximity_alerts(store: &EntityStore, threshold_nm: f64) -> Vec<ProximityAlert> {
    let (friendlies, hostiles): (Vec<_>, Vec<_>) = store.positioned().partition(|(e, _)| e.is_friendly());

    let mut alerts: Vec<ProximityAlert> = friendlies
        .iter()
        .flat_map(|(f, fp)| {
            hostiles.iter().filter_map(move |(h, hp)| {
                let distance_nm = haversine_nm(*fp, *hp);
                (distance_nm <= threshold_nm).then_some(ProximityAlert {
                    friendly: f.global_id,
                    hostile: h.global_id,
                    distance_nm,
                })
            })
        })
        .collect();

    alerts.sort_by(|a, b| {
        a.distance_nm
            .total_cmp(&b.distance_nm)
            .then(a.friendly.cmp(&b.friendly))
            .then(a.hostile.cmp(&b.hostile))
    });
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityClass, Position};

    #[test]
    fn test_alerts_sorted_and_thresholded() {
        let mut store = EntityStore::new();
        store.insert(Entity::from_position(1, EntityClass::Friendly, Position::new(0.0, 0.0)));
        store.insert(Entity::from_position(2, EntityClass::Hostile, Position::new(0.0, 0.1)));
        store.insert(Entity::from_position(3, EntityClass::Hostile, Position::new(0.0, 0.05)));
        store.insert(Entity::from_position(4, EntityClass::Hostile, Position::new(0.0, 5.0)));

        let alerts = proximity_alerts(&store, 10.0);
        let pairs: Vec<_> = alerts.iter().map(|a| (a.friendly, a.hostile)).collect();
        assert_eq!(pairs, vec![(1, 3), (1, 2)]);
        assert!(alerts[0].distance_nm < alerts[1].distance_nm);
    }

    #[test]
    fn test_no_alerts_without_hostiles() {
        let mut store = EntityStore::new();
        store.insert(Entity::from_position(1, EntityClass::Friendly, Position::new(0.0, 0.0)));
        assert!(proximity_alerts(&store, 100.0).is_empty());
    }
}
