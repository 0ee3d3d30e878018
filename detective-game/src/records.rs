//! Shipment record store: the validated, immutable fact table of one mission.
//!
//! Rows arrive as loosely typed JSON objects from the ingestion layer. Loading
//! is all-or-nothing: every violation in the batch is collected and reported
//! together, and no record is admitted unless the whole batch is clean.
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::numbers::u64_to_u32;

/// Field names every shipment row must carry.
pub const REQUIRED_FIELDS: [&str; 11] = [
    "shipment_id",
    "warehouse_id",
    "supplier",
    "origin",
    "destination",
    "distance_km",
    "expected_time",
    "actual_time",
    "cost",
    "sku_count",
    "traffic_index",
];

const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// One row of shipment fact data.
///
/// Times are expressed in minutes: either plain durations or minutes since
/// the Unix epoch when the source supplied timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub shipment_id: String,
    pub warehouse_id: String,
    pub supplier: String,
    pub origin: String,
    pub destination: String,
    pub distance_km: f64,
    pub expected_time: f64,
    pub actual_time: f64,
    pub cost: f64,
    pub sku_count: u32,
    pub traffic_index: f64,
}

/// JSON shape a field was expected to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedType {
    Text,
    Number,
    Integer,
    Time,
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "a string"),
            Self::Number => write!(f, "a number"),
            Self::Integer => write!(f, "an integer"),
            Self::Time => write!(f, "a minute count or timestamp"),
        }
    }
}

/// What went wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    NotAnObject,
    Missing,
    WrongType { expected: ExpectedType },
    Empty,
    Negative,
    NotPositive,
    BadTimestamp { value: String },
    DuplicateId,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "row is not an object"),
            Self::Missing => write!(f, "is missing"),
            Self::WrongType { expected } => write!(f, "must be {expected}"),
            Self::Empty => write!(f, "must not be empty"),
            Self::Negative => write!(f, "must not be negative"),
            Self::NotPositive => write!(f, "must be positive"),
            Self::BadTimestamp { value } => write!(f, "has unparsable timestamp `{value}`"),
            Self::DuplicateId => write!(f, "duplicates an earlier shipment"),
        }
    }
}

/// A single rejected field, tagged with the offending row and shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub row: usize,
    pub shipment_id: Option<String>,
    pub field: &'static str,
    pub kind: ViolationKind,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.shipment_id.as_deref().unwrap_or("<unknown>");
        write!(
            f,
            "row {} (shipment {id}): `{}` {}",
            self.row, self.field, self.kind
        )
    }
}

/// Every violation found in one load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("shipment load rejected with {} violation(s); first: {}", .violations.len(), first_violation(.violations))]
pub struct SchemaError {
    pub violations: Vec<SchemaViolation>,
}

fn first_violation(violations: &[SchemaViolation]) -> String {
    violations
        .first()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

impl SchemaError {
    /// Whether a violation names the given shipment and field.
    #[must_use]
    pub fn mentions(&self, shipment_id: &str, field: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.shipment_id.as_deref() == Some(shipment_id) && v.field == field)
    }
}

/// Immutable, validated shipment table for one mission session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordStore {
    records: Vec<ShipmentRecord>,
}

impl RecordStore {
    /// Validate raw rows and admit them as one batch.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] listing every violation when any row fails;
    /// no record from the batch is admitted in that case.
    pub fn load(rows: &[Value]) -> Result<Self, SchemaError> {
        let mut violations = Vec::new();
        let mut records = Vec::with_capacity(rows.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let Some(object) = row.as_object() else {
                violations.push(SchemaViolation {
                    row: index,
                    shipment_id: None,
                    field: "row",
                    kind: ViolationKind::NotAnObject,
                });
                continue;
            };
            let mut reader = RowReader::new(index, object, &mut violations);
            let Some(record) = reader.read_record() else {
                continue;
            };
            if !seen.insert(record.shipment_id.clone()) {
                violations.push(SchemaViolation {
                    row: index,
                    shipment_id: Some(record.shipment_id.clone()),
                    field: "shipment_id",
                    kind: ViolationKind::DuplicateId,
                });
                continue;
            }
            records.push(record);
        }

        if violations.is_empty() {
            Ok(Self { records })
        } else {
            Err(SchemaError { violations })
        }
    }

    /// Validate already-typed records through the same rules as [`Self::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when any record violates an invariant.
    pub fn from_records(records: Vec<ShipmentRecord>) -> Result<Self, SchemaError> {
        let rows: Vec<Value> = records
            .iter()
            .map(|record| serde_json::to_value(record).unwrap_or(Value::Null))
            .collect();
        Self::load(&rows)
    }

    /// Records in load order.
    #[must_use]
    pub fn records(&self) -> &[ShipmentRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, shipment_id: &str) -> Option<&ShipmentRecord> {
        self.records.iter().find(|r| r.shipment_id == shipment_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct RowReader<'a> {
    row: usize,
    object: &'a Map<String, Value>,
    shipment_id: Option<String>,
    violations: &'a mut Vec<SchemaViolation>,
    clean: bool,
}

impl<'a> RowReader<'a> {
    fn new(
        row: usize,
        object: &'a Map<String, Value>,
        violations: &'a mut Vec<SchemaViolation>,
    ) -> Self {
        let shipment_id = object
            .get("shipment_id")
            .and_then(Value::as_str)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Self {
            row,
            object,
            shipment_id,
            violations,
            clean: true,
        }
    }

    fn read_record(&mut self) -> Option<ShipmentRecord> {
        let shipment_id = self.text("shipment_id");
        let warehouse_id = self.text("warehouse_id");
        let supplier = self.text("supplier");
        let origin = self.text("origin");
        let destination = self.text("destination");
        let distance_km = self.non_negative("distance_km");
        let expected_time = self.time("expected_time", false);
        let actual_time = self.time("actual_time", true);
        let cost = self.non_negative("cost");
        let sku_count = self.count("sku_count");
        let traffic_index = self.number("traffic_index");

        if !self.clean {
            return None;
        }
        Some(ShipmentRecord {
            shipment_id: shipment_id?,
            warehouse_id: warehouse_id?,
            supplier: supplier?,
            origin: origin?,
            destination: destination?,
            distance_km: distance_km?,
            expected_time: expected_time?,
            actual_time: actual_time?,
            cost: cost?,
            sku_count: sku_count?,
            traffic_index: traffic_index?,
        })
    }

    fn reject(&mut self, field: &'static str, kind: ViolationKind) {
        self.clean = false;
        self.violations.push(SchemaViolation {
            row: self.row,
            shipment_id: self.shipment_id.clone(),
            field,
            kind,
        });
    }

    fn field(&mut self, field: &'static str) -> Option<&'a Value> {
        match self.object.get(field) {
            None | Some(Value::Null) => {
                self.reject(field, ViolationKind::Missing);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn text(&mut self, field: &'static str) -> Option<String> {
        let value = self.field(field)?;
        let Some(text) = value.as_str() else {
            self.reject(
                field,
                ViolationKind::WrongType {
                    expected: ExpectedType::Text,
                },
            );
            return None;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.reject(field, ViolationKind::Empty);
            return None;
        }
        Some(trimmed.to_string())
    }

    fn number(&mut self, field: &'static str) -> Option<f64> {
        let value = self.field(field)?;
        let parsed = value.as_f64().filter(|n| n.is_finite());
        if parsed.is_none() {
            self.reject(
                field,
                ViolationKind::WrongType {
                    expected: ExpectedType::Number,
                },
            );
        }
        parsed
    }

    fn non_negative(&mut self, field: &'static str) -> Option<f64> {
        let value = self.number(field)?;
        if value < 0.0 {
            self.reject(field, ViolationKind::Negative);
            return None;
        }
        Some(value)
    }

    fn count(&mut self, field: &'static str) -> Option<u32> {
        let value = self.field(field)?;
        if let Some(count) = value.as_u64() {
            if count == 0 {
                self.reject(field, ViolationKind::NotPositive);
                return None;
            }
            return match u64_to_u32(count) {
                Some(count) => Some(count),
                None => {
                    self.reject(
                        field,
                        ViolationKind::WrongType {
                            expected: ExpectedType::Integer,
                        },
                    );
                    None
                }
            };
        }
        if value.as_i64().is_some() {
            self.reject(field, ViolationKind::NotPositive);
        } else {
            self.reject(
                field,
                ViolationKind::WrongType {
                    expected: ExpectedType::Integer,
                },
            );
        }
        None
    }

    fn time(&mut self, field: &'static str, must_be_non_negative: bool) -> Option<f64> {
        let value = self.field(field)?;
        let minutes = match value {
            Value::Number(n) => n.as_f64().filter(|m| m.is_finite()),
            Value::String(s) => match parse_timestamp_minutes(s) {
                Some(minutes) => Some(minutes),
                None => {
                    self.reject(
                        field,
                        ViolationKind::BadTimestamp {
                            value: s.trim().to_string(),
                        },
                    );
                    return None;
                }
            },
            _ => None,
        };
        let Some(minutes) = minutes else {
            self.reject(
                field,
                ViolationKind::WrongType {
                    expected: ExpectedType::Time,
                },
            );
            return None;
        };
        if must_be_non_negative && minutes < 0.0 {
            self.reject(field, ViolationKind::Negative);
            return None;
        }
        Some(minutes)
    }
}

/// Parse an RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC) timestamp into minutes
/// since the Unix epoch.
#[must_use]
pub fn parse_timestamp_minutes(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let millis = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
                .map(|dt| dt.and_utc().timestamp_millis())
        })
        .ok()?;
    // Epoch milliseconds stay well inside f64's exact integer range.
    #[allow(clippy::cast_precision_loss)]
    let minutes = millis as f64 / MILLIS_PER_MINUTE;
    Some(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str) -> Value {
        json!({
            "shipment_id": id,
            "warehouse_id": "WH-01",
            "supplier": "Acme",
            "origin": "Reno",
            "destination": "Sacramento",
            "distance_km": 210,
            "expected_time": "2024-03-01T11:00:00Z",
            "actual_time": "2024-03-01T12:30:00Z",
            "cost": 219.5,
            "sku_count": 7,
            "traffic_index": 2.4
        })
    }

    #[test]
    fn loads_valid_rows_in_order() {
        let store = RecordStore::load(&[row("S-1"), row("S-2")]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].shipment_id, "S-1");
        let record = store.get("S-2").unwrap();
        assert!((record.actual_time - record.expected_time - 90.0).abs() < 1e-9);
    }

    #[test]
    fn negative_distance_rejects_whole_batch() {
        let mut bad = row("S-2");
        bad["distance_km"] = json!(-5.0);
        let err = RecordStore::load(&[row("S-1"), bad]).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.mentions("S-2", "distance_km"));
        assert_eq!(err.violations[0].kind, ViolationKind::Negative);
    }

    #[test]
    fn collects_every_violation_across_rows() {
        let mut first = row("S-1");
        first.as_object_mut().unwrap().remove("supplier");
        first["cost"] = json!("cheap");
        let mut second = row("S-2");
        second["sku_count"] = json!(0);
        second["actual_time"] = json!("yesterday");
        let err = RecordStore::load(&[first, second, json!(42)]).unwrap_err();

        assert_eq!(err.violations.len(), 5);
        assert!(err.mentions("S-1", "supplier"));
        assert!(err.mentions("S-1", "cost"));
        assert!(err.mentions("S-2", "sku_count"));
        assert!(err.mentions("S-2", "actual_time"));
        assert_eq!(err.violations[4].kind, ViolationKind::NotAnObject);
        assert!(err.to_string().contains("5 violation(s)"));
    }

    #[test]
    fn duplicate_ids_and_bad_counts_are_reported() {
        let mut negative_skus = row("S-3");
        negative_skus["sku_count"] = json!(-2);
        let mut fractional = row("S-4");
        fractional["sku_count"] = json!(2.5);
        let err = RecordStore::load(&[row("S-1"), row("S-1"), negative_skus, fractional])
            .unwrap_err();
        assert_eq!(err.violations[0].kind, ViolationKind::DuplicateId);
        assert_eq!(err.violations[1].kind, ViolationKind::NotPositive);
        assert_eq!(
            err.violations[2].kind,
            ViolationKind::WrongType {
                expected: ExpectedType::Integer
            }
        );
    }

    #[test]
    fn numeric_minutes_and_naive_timestamps_are_accepted() {
        let mut numeric = row("S-1");
        numeric["expected_time"] = json!(120);
        numeric["actual_time"] = json!(95.5);
        let mut naive = row("S-2");
        naive["expected_time"] = json!("2024-03-01 11:00:00");
        naive["actual_time"] = json!("2024-03-01 11:45:00");
        let store = RecordStore::load(&[numeric, naive]).unwrap();
        assert!((store.records()[0].actual_time - 95.5).abs() < f64::EPSILON);
        let second = &store.records()[1];
        assert!((second.actual_time - second.expected_time - 45.0).abs() < 1e-9);
    }

    #[test]
    fn negative_actual_time_is_rejected() {
        let mut bad = row("S-1");
        bad["actual_time"] = json!(-1);
        let err = RecordStore::load(&[bad]).unwrap_err();
        assert!(err.mentions("S-1", "actual_time"));
    }

    #[test]
    fn typed_records_share_validation() {
        let store = RecordStore::load(&[row("S-1")]).unwrap();
        let mut record = store.records()[0].clone();
        assert!(RecordStore::from_records(vec![record.clone()]).is_ok());
        record.cost = -1.0;
        let err = RecordStore::from_records(vec![record]).unwrap_err();
        assert!(err.mentions("S-1", "cost"));
    }
}
