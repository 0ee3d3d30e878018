//! Centralized tuning constants for mission evaluation.
//!
//! These values define the deterministic math for grading and signal
//! derivation. Keeping them together ensures that scoring balance can only
//! be adjusted via code changes reviewed in version control, while the
//! `EngineConfig` defaults mirror them for operators who tune a deployment.

// Telemetry keys -----------------------------------------------------------
pub(crate) const EVENT_MISSION_LOAD: &str = "mission.load";
pub(crate) const EVENT_MISSION_HINT: &str = "mission.hint";
pub(crate) const EVENT_MISSION_SUBMIT: &str = "mission.submit";
pub(crate) const EVENT_SIGNAL_SCORED: &str = "signal.scored";
pub(crate) const EVENT_SIGNAL_INSUFFICIENT: &str = "signal.insufficient";

// Feature derivation -------------------------------------------------------
pub(crate) const DELAY_REFERENCE_MINUTES: f64 = 60.0;
pub(crate) const WAREHOUSE_VOLUME_REFERENCE: f64 = 20.0;
pub(crate) const WAREHOUSE_TRAFFIC_REFERENCE: f64 = 5.0;

// Signal scorers -----------------------------------------------------------
pub(crate) const SCORER_MIN_RECORDS: usize = 10;
pub(crate) const SCORER_DEFAULT_SEED: u64 = 42;
pub(crate) const ANOMALY_CONTAMINATION: f64 = 0.1;
pub(crate) const ANOMALY_CONTAMINATION_MAX: f64 = 0.5;
pub(crate) const ANOMALY_TREES: usize = 100;
pub(crate) const ANOMALY_SAMPLE_SIZE: usize = 256;
pub(crate) const ANOMALY_INSIGHT_TOP: usize = 5;
pub(crate) const RISK_FLAG_THRESHOLD: f64 = 0.7;
pub(crate) const RISK_RIDGE: f64 = 1e-3;
pub(crate) const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
pub(crate) const PIVOT_EPSILON: f64 = 1e-12;

// Seed domains -------------------------------------------------------------
pub(crate) const ANOMALY_STREAM_DOMAIN: &[u8] = b"DETECTIVE-signal-anomaly";

// Grading & scoring --------------------------------------------------------
pub(crate) const PARTIAL_CREDIT: f64 = 0.5;
pub(crate) const MAX_POINTS: u32 = 100;
pub(crate) const DEFAULT_HINT_COST: u32 = 10;
pub(crate) const RATING_EXCELLENT_MIN: u32 = 90;
pub(crate) const RATING_GOOD_MIN: u32 = 70;
pub(crate) const RATING_AVERAGE_MIN: u32 = 50;
pub(crate) const SHORTLIST_MIN_CANDIDATES: usize = 2;
