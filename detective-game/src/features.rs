//! Feature derivation: per-shipment transit metrics plus supplier, warehouse
//! and route aggregates computed from one record store snapshot.
//!
//! Derivation is a pure function of the store. Every map is ordered, so two
//! derivations over the same snapshot serialize (and fingerprint) identically.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::config::FeatureConfig;
use crate::numbers::{ratio, usize_to_f64};
use crate::records::{RecordStore, ShipmentRecord};

/// Derived view of one shipment; carries the record fields scorers consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentFeatures {
    pub shipment_id: String,
    pub supplier: String,
    pub warehouse_id: String,
    pub origin: String,
    pub destination: String,
    pub distance_km: f64,
    pub cost: f64,
    pub sku_count: u32,
    pub traffic_index: f64,
    /// `actual_time - expected_time`, in minutes.
    pub transit_time: f64,
    pub delay_flag: bool,
}

impl ShipmentFeatures {
    fn from_record(record: &ShipmentRecord) -> Self {
        let transit_time = record.actual_time - record.expected_time;
        Self {
            shipment_id: record.shipment_id.clone(),
            supplier: record.supplier.clone(),
            warehouse_id: record.warehouse_id.clone(),
            origin: record.origin.clone(),
            destination: record.destination.clone(),
            distance_km: record.distance_km,
            cost: record.cost,
            sku_count: record.sku_count,
            traffic_index: record.traffic_index,
            transit_time,
            delay_flag: transit_time > 0.0,
        }
    }

    /// Minutes late, zero for on-time shipments.
    #[must_use]
    pub fn delay_minutes(&self) -> f64 {
        if self.delay_flag {
            self.transit_time
        } else {
            0.0
        }
    }
}

/// Reliability aggregate for one supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierStats {
    pub shipments: usize,
    pub delayed: usize,
    pub delay_rate: f64,
    /// Mean lateness among delayed shipments only.
    pub mean_delay: f64,
    pub supplier_score: f64,
}

/// Load aggregate for one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseStats {
    pub shipments: usize,
    pub delayed: usize,
    pub delay_rate: f64,
    pub mean_traffic: f64,
    pub warehouse_load_score: f64,
}

/// Delay aggregate for one origin/destination lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStats {
    pub origin: String,
    pub destination: String,
    pub shipments: usize,
    pub delayed: usize,
    pub delay_rate: f64,
    pub mean_transit: f64,
}

/// Everything derived from one record store snapshot. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    shipments: BTreeMap<String, ShipmentFeatures>,
    suppliers: BTreeMap<String, SupplierStats>,
    warehouses: BTreeMap<String, WarehouseStats>,
    routes: Vec<RouteStats>,
}

#[derive(Default)]
struct GroupAcc {
    shipments: usize,
    delayed: usize,
    delay_sum: f64,
    transit_sum: f64,
    traffic_sum: f64,
}

impl GroupAcc {
    fn add(&mut self, shipment: &ShipmentFeatures) {
        self.shipments += 1;
        self.transit_sum += shipment.transit_time;
        self.traffic_sum += shipment.traffic_index;
        if shipment.delay_flag {
            self.delayed += 1;
            self.delay_sum += shipment.transit_time;
        }
    }

    fn delay_rate(&self) -> f64 {
        ratio(usize_to_f64(self.delayed), usize_to_f64(self.shipments))
    }

    fn mean_delay(&self) -> f64 {
        ratio(self.delay_sum, usize_to_f64(self.delayed))
    }

    fn mean_of(&self, sum: f64) -> f64 {
        ratio(sum, usize_to_f64(self.shipments))
    }
}

/// Supplier reliability in [0, 1].
///
/// A zero delay rate scores 1. The score falls with the delay rate and with
/// the mean lateness of delayed shipments; `delay_rate * mean_delay` is the
/// average lateness over all of the supplier's shipments, which keeps the
/// score monotone when an on-time shipment turns late.
#[must_use]
pub fn supplier_score(delay_rate: f64, mean_delay: f64, delay_reference_minutes: f64) -> f64 {
    let rate = delay_rate.clamp(0.0, 1.0);
    let magnitude = mean_delay.max(0.0);
    let lateness = ratio(rate * magnitude, delay_reference_minutes);
    ((1.0 - rate) / (1.0 + lateness)).clamp(0.0, 1.0)
}

/// Warehouse headroom in [0, 1]; more volume or traffic lowers it.
#[must_use]
pub fn warehouse_load_score(shipments: usize, mean_traffic: f64, cfg: &FeatureConfig) -> f64 {
    let volume = usize_to_f64(shipments);
    let traffic = mean_traffic.max(0.0);
    let volume_load = ratio(volume, volume + cfg.volume_reference);
    let traffic_load = ratio(traffic, traffic + cfg.traffic_reference);
    (1.0 - (volume_load + traffic_load) / 2.0).clamp(0.0, 1.0)
}

/// Derive features from a store using the default configuration.
#[must_use]
pub fn derive(store: &RecordStore) -> DerivedFeatures {
    DerivedFeatures::derive(store, &FeatureConfig::default())
}

impl DerivedFeatures {
    /// Derive features from a store snapshot.
    #[must_use]
    pub fn derive(store: &RecordStore, cfg: &FeatureConfig) -> Self {
        let mut shipments = BTreeMap::new();
        let mut supplier_acc: BTreeMap<String, GroupAcc> = BTreeMap::new();
        let mut warehouse_acc: BTreeMap<String, GroupAcc> = BTreeMap::new();
        let mut route_acc: BTreeMap<(String, String), GroupAcc> = BTreeMap::new();

        for record in store.records() {
            let shipment = ShipmentFeatures::from_record(record);
            supplier_acc
                .entry(shipment.supplier.clone())
                .or_default()
                .add(&shipment);
            warehouse_acc
                .entry(shipment.warehouse_id.clone())
                .or_default()
                .add(&shipment);
            route_acc
                .entry((shipment.origin.clone(), shipment.destination.clone()))
                .or_default()
                .add(&shipment);
            shipments.insert(shipment.shipment_id.clone(), shipment);
        }

        let suppliers = supplier_acc
            .into_iter()
            .filter(|(_, acc)| acc.shipments > 0)
            .map(|(name, acc)| {
                let delay_rate = acc.delay_rate();
                let mean_delay = acc.mean_delay();
                let stats = SupplierStats {
                    shipments: acc.shipments,
                    delayed: acc.delayed,
                    delay_rate,
                    mean_delay,
                    supplier_score: supplier_score(
                        delay_rate,
                        mean_delay,
                        cfg.delay_reference_minutes,
                    ),
                };
                (name, stats)
            })
            .collect();

        let warehouses = warehouse_acc
            .into_iter()
            .filter(|(_, acc)| acc.shipments > 0)
            .map(|(id, acc)| {
                let mean_traffic = acc.mean_of(acc.traffic_sum);
                let stats = WarehouseStats {
                    shipments: acc.shipments,
                    delayed: acc.delayed,
                    delay_rate: acc.delay_rate(),
                    mean_traffic,
                    warehouse_load_score: warehouse_load_score(acc.shipments, mean_traffic, cfg),
                };
                (id, stats)
            })
            .collect();

        let routes = route_acc
            .into_iter()
            .map(|((origin, destination), acc)| RouteStats {
                origin,
                destination,
                shipments: acc.shipments,
                delayed: acc.delayed,
                delay_rate: acc.delay_rate(),
                mean_transit: acc.mean_of(acc.transit_sum),
            })
            .collect();

        Self {
            shipments,
            suppliers,
            warehouses,
            routes,
        }
    }

    /// Per-shipment features ordered by shipment id.
    #[must_use]
    pub const fn shipments(&self) -> &BTreeMap<String, ShipmentFeatures> {
        &self.shipments
    }

    #[must_use]
    pub fn shipment(&self, shipment_id: &str) -> Option<&ShipmentFeatures> {
        self.shipments.get(shipment_id)
    }

    #[must_use]
    pub const fn suppliers(&self) -> &BTreeMap<String, SupplierStats> {
        &self.suppliers
    }

    #[must_use]
    pub fn supplier_score(&self, supplier: &str) -> Option<f64> {
        lookup(&self.suppliers, supplier).map(|s| s.supplier_score)
    }

    #[must_use]
    pub const fn warehouses(&self) -> &BTreeMap<String, WarehouseStats> {
        &self.warehouses
    }

    #[must_use]
    pub fn warehouse_load_score(&self, warehouse_id: &str) -> Option<f64> {
        lookup(&self.warehouses, warehouse_id).map(|w| w.warehouse_load_score)
    }

    /// Lanes ordered by (origin, destination).
    #[must_use]
    pub fn routes(&self) -> &[RouteStats] {
        &self.routes
    }

    #[must_use]
    pub fn route(&self, origin: &str, destination: &str) -> Option<&RouteStats> {
        self.routes.iter().find(|r| {
            r.origin.trim().eq_ignore_ascii_case(origin.trim())
                && r.destination.trim().eq_ignore_ascii_case(destination.trim())
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    /// Stable 64-bit digest of the serialized features.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&bytes);
        hasher.finish()
    }
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, key: &str) -> Option<&'a T> {
    map.get(key.trim()).or_else(|| {
        map.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key.trim()))
            .map(|(_, value)| value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ShipmentRecord;

    pub(crate) fn record(id: &str, supplier: &str, warehouse: &str, delay: f64) -> ShipmentRecord {
        ShipmentRecord {
            shipment_id: id.to_string(),
            warehouse_id: warehouse.to_string(),
            supplier: supplier.to_string(),
            origin: "Reno".to_string(),
            destination: "Sacramento".to_string(),
            distance_km: 210.0,
            expected_time: 1_000.0,
            actual_time: 1_000.0 + delay,
            cost: 200.0,
            sku_count: 5,
            traffic_index: 2.0,
        }
    }

    fn store(records: Vec<ShipmentRecord>) -> RecordStore {
        RecordStore::from_records(records).unwrap()
    }

    #[test]
    fn transit_and_delay_flag_follow_arithmetic() {
        let features = derive(&store(vec![
            record("S-1", "Acme", "WH-1", 30.0),
            record("S-2", "Acme", "WH-1", -10.0),
            record("S-3", "Acme", "WH-1", 0.0),
        ]));
        let late = features.shipment("S-1").unwrap();
        assert!((late.transit_time - 30.0).abs() < f64::EPSILON);
        assert!(late.delay_flag);
        assert!(!features.shipment("S-2").unwrap().delay_flag);
        assert!(!features.shipment("S-3").unwrap().delay_flag);
    }

    #[test]
    fn punctual_supplier_scores_one() {
        let features = derive(&store(vec![
            record("S-1", "Acme", "WH-1", -5.0),
            record("S-2", "Acme", "WH-1", 0.0),
        ]));
        assert!((features.supplier_score("Acme").unwrap() - 1.0).abs() < f64::EPSILON);
        assert!(features.supplier_score("Globex").is_none());
    }

    #[test]
    fn supplier_score_is_monotone_in_rate_and_magnitude() {
        let reference = 60.0;
        let mut previous = supplier_score(0.0, 0.0, reference);
        for step in 1..=10 {
            let rate = f64::from(step) / 10.0;
            let current = supplier_score(rate, 45.0, reference);
            assert!(current <= previous, "rate {rate} raised the score");
            previous = current;
        }
        let mut previous = supplier_score(0.4, 0.0, reference);
        for minutes in [10.0, 30.0, 90.0, 270.0] {
            let current = supplier_score(0.4, minutes, reference);
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn another_late_shipment_never_raises_a_supplier_score() {
        let mut rows = vec![
            record("S-1", "Acme", "WH-1", 120.0),
            record("S-2", "Acme", "WH-1", -5.0),
            record("S-3", "Acme", "WH-1", 0.0),
            record("S-4", "Acme", "WH-1", -20.0),
            record("S-5", "Globex", "WH-2", 15.0),
            record("S-6", "Globex", "WH-2", -10.0),
        ];
        let mut previous = derive(&store(rows.clone()));
        for (index, delay) in [(1, 5.0), (2, 240.0), (3, 1.0)] {
            rows[index].actual_time = rows[index].expected_time + delay;
            let current = derive(&store(rows.clone()));
            let before = previous.supplier_score("Acme").unwrap();
            let after = current.supplier_score("Acme").unwrap();
            assert!(
                after <= before,
                "late {} raised Acme from {before} to {after}",
                rows[index].shipment_id
            );
            assert_eq!(
                current.supplier_score("Globex"),
                previous.supplier_score("Globex")
            );
            previous = current;
        }
        assert!(previous.supplier_score("Acme").unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn warehouse_score_drops_with_volume_and_traffic() {
        let cfg = FeatureConfig::default();
        assert!(warehouse_load_score(10, 2.0, &cfg) > warehouse_load_score(20, 2.0, &cfg));
        assert!(warehouse_load_score(10, 2.0, &cfg) > warehouse_load_score(10, 6.0, &cfg));
        assert!(warehouse_load_score(10, -3.0, &cfg) <= 1.0);
    }

    #[test]
    fn routes_are_sorted_and_looked_up_case_insensitively() {
        let mut a = record("S-1", "Acme", "WH-1", 10.0);
        a.origin = "Chicago".to_string();
        a.destination = "Denver".to_string();
        let b = record("S-2", "Acme", "WH-1", -10.0);
        let features = derive(&store(vec![a, b]));
        assert_eq!(features.routes()[0].origin, "Chicago");
        let lane = features.route("chicago", "DENVER").unwrap();
        assert_eq!(lane.delayed, 1);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let base = store(vec![record("S-1", "Acme", "WH-1", 10.0)]);
        let changed = store(vec![record("S-1", "Acme", "WH-1", 11.0)]);
        assert_eq!(derive(&base).fingerprint(), derive(&base).fingerprint());
        assert_ne!(derive(&base).fingerprint(), derive(&changed).fingerprint());
    }
}
