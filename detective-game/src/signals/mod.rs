//! Pluggable analytical signal producers.
//!
//! Scorers are read-only consumers of [`DerivedFeatures`]. Each one emits a
//! score per shipment plus a thresholded flag, or an explicit "no signal"
//! outcome when the mission dataset is too small to fit anything meaningful.
//! Two scorers may disagree; neither is ground truth.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::config::ScorerConfig;
use crate::constants::{EVENT_SIGNAL_INSUFFICIENT, EVENT_SIGNAL_SCORED};
use crate::features::DerivedFeatures;

pub mod anomaly;
pub mod delay_risk;

pub use anomaly::{AnomalyInsights, AnomalyScorer, FeatureContrast};
pub use delay_risk::{DelayRiskScorer, FeatureImportance, RiskModelReport};

/// Named scorer identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    Anomaly,
    DelayRisk,
}

impl ScorerKind {
    pub const ALL: [Self; 2] = [Self::Anomaly, Self::DelayRisk];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anomaly => "anomaly",
            Self::DelayRisk => "delay_risk",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One shipment's signal: continuous score for ranking plus its flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub score: f64,
    pub flagged: bool,
}

/// The dataset is too small for a scorer to say anything.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{scorer} needs at least {required} shipments to produce a signal (got {available})")]
pub struct InsufficientData {
    pub scorer: ScorerKind,
    pub required: usize,
    pub available: usize,
}

/// Scorer-specific aggregate that accompanies the per-shipment scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalSummary {
    Anomaly(AnomalyInsights),
    DelayRisk(RiskModelReport),
}

/// Complete output of one scorer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub scorer: ScorerKind,
    pub scores: BTreeMap<String, SignalScore>,
    pub summary: SignalSummary,
}

impl SignalReport {
    /// Flagged shipment ids, highest score first, ties by id.
    #[must_use]
    pub fn flagged(&self) -> Vec<&str> {
        let mut flagged: Vec<(&str, f64)> = self
            .scores
            .iter()
            .filter(|(_, s)| s.flagged)
            .map(|(id, s)| (id.as_str(), s.score))
            .collect();
        flagged.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        flagged.into_iter().map(|(id, _)| id).collect()
    }

    #[must_use]
    pub fn score(&self, shipment_id: &str) -> Option<&SignalScore> {
        self.scores.get(shipment_id)
    }
}

/// Either a report or an explicit absence of signal. "No signal" is never
/// "zero risk".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SignalOutcome {
    Scored(SignalReport),
    NoSignal(InsufficientData),
}

impl SignalOutcome {
    #[must_use]
    pub const fn report(&self) -> Option<&SignalReport> {
        match self {
            Self::Scored(report) => Some(report),
            Self::NoSignal(_) => None,
        }
    }

    #[must_use]
    pub const fn is_no_signal(&self) -> bool {
        matches!(self, Self::NoSignal(_))
    }
}

/// Capability shared by every signal producer.
pub trait SignalScorer: Send + Sync {
    fn kind(&self) -> ScorerKind;

    fn score(&self, features: &DerivedFeatures) -> SignalOutcome;
}

pub(crate) fn require_records(
    scorer: ScorerKind,
    features: &DerivedFeatures,
    required: usize,
) -> Result<(), InsufficientData> {
    let available = features.len();
    if available == 0 || available < required {
        Err(InsufficientData {
            scorer,
            required: required.max(1),
            available,
        })
    } else {
        Ok(())
    }
}

/// The built-in scorers for one mission seed.
#[must_use]
pub fn default_scorers(cfg: &ScorerConfig, mission_seed: u64) -> Vec<Box<dyn SignalScorer>> {
    vec![
        Box::new(AnomalyScorer::new(cfg, mission_seed)),
        Box::new(DelayRiskScorer::new(cfg)),
    ]
}

/// Outcomes of every scorer run against one feature set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalSet {
    outcomes: BTreeMap<ScorerKind, SignalOutcome>,
}

impl SignalSet {
    /// Run the built-in scorers sequentially.
    #[must_use]
    pub fn compute(features: &DerivedFeatures, cfg: &ScorerConfig, mission_seed: u64) -> Self {
        Self::from_scorers(features, &default_scorers(cfg, mission_seed))
    }

    /// Run an arbitrary set of scorers; a later scorer of the same kind wins.
    #[must_use]
    pub fn from_scorers(features: &DerivedFeatures, scorers: &[Box<dyn SignalScorer>]) -> Self {
        let outcomes = scorers
            .iter()
            .map(|scorer| (scorer.kind(), scorer.score(features)))
            .collect();
        let set = Self { outcomes };
        set.log();
        set
    }

    /// Assemble a set from precomputed outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = SignalOutcome>) -> Self {
        let outcomes = outcomes
            .into_iter()
            .map(|outcome| (outcome_kind(&outcome), outcome))
            .collect();
        let set = Self { outcomes };
        set.log();
        set
    }

    #[must_use]
    pub fn get(&self, kind: ScorerKind) -> Option<&SignalOutcome> {
        self.outcomes.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScorerKind, &SignalOutcome)> {
        self.outcomes.iter().map(|(kind, outcome)| (*kind, outcome))
    }

    fn log(&self) {
        for (kind, outcome) in &self.outcomes {
            match outcome {
                SignalOutcome::Scored(report) => log::info!(
                    "{EVENT_SIGNAL_SCORED} scorer={kind} shipments={} flagged={}",
                    report.scores.len(),
                    report.scores.values().filter(|s| s.flagged).count()
                ),
                SignalOutcome::NoSignal(err) => log::warn!(
                    "{EVENT_SIGNAL_INSUFFICIENT} scorer={kind} required={} available={}",
                    err.required,
                    err.available
                ),
            }
        }
    }
}

const fn outcome_kind(outcome: &SignalOutcome) -> ScorerKind {
    match outcome {
        SignalOutcome::Scored(report) => report.scorer,
        SignalOutcome::NoSignal(err) => err.scorer,
    }
}

/// Run both built-in scorers concurrently on blocking tasks.
///
/// The scorers share nothing mutable, so completion order is irrelevant. A
/// task that fails to join is recomputed inline.
#[cfg(feature = "async")]
pub async fn compute_signals_async(
    features: std::sync::Arc<DerivedFeatures>,
    cfg: ScorerConfig,
    mission_seed: u64,
) -> SignalSet {
    use std::sync::Arc;

    let anomaly = AnomalyScorer::new(&cfg, mission_seed);
    let risk = DelayRiskScorer::new(&cfg);

    let anomaly_task = {
        let features = Arc::clone(&features);
        let scorer = anomaly.clone();
        tokio::task::spawn_blocking(move || scorer.score(&features))
    };
    let risk_task = {
        let features = Arc::clone(&features);
        let scorer = risk.clone();
        tokio::task::spawn_blocking(move || scorer.score(&features))
    };

    let (anomaly_outcome, risk_outcome) = tokio::join!(anomaly_task, risk_task);
    let anomaly_outcome = anomaly_outcome.unwrap_or_else(|_| anomaly.score(&features));
    let risk_outcome = risk_outcome.unwrap_or_else(|_| risk.score(&features));
    SignalSet::from_outcomes([anomaly_outcome, risk_outcome])
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::features::{DerivedFeatures, derive};
    use crate::records::{RecordStore, ShipmentRecord};

    /// Deterministic, mildly varied shipments with linear transit times.
    pub fn varied_records(count: usize) -> Vec<ShipmentRecord> {
        (0..count)
            .map(|i| {
                let step = f64::from(u32::try_from(i).unwrap());
                let distance = 200.0 + (step * 37.0) % 400.0;
                let traffic = 1.0 + (step * 3.0) % 5.0;
                let transit = distance / 20.0 + traffic * 4.0 - 20.0;
                ShipmentRecord {
                    shipment_id: format!("S-{i:03}"),
                    warehouse_id: format!("WH-{}", i % 3),
                    supplier: ["Acme", "Globex", "Initech"][i % 3].to_string(),
                    origin: "Reno".to_string(),
                    destination: "Boise".to_string(),
                    distance_km: distance,
                    expected_time: 10_000.0,
                    actual_time: 10_000.0 + transit,
                    cost: 100.0 + (step * 13.0) % 40.0,
                    sku_count: 2 + u32::try_from(i % 4).unwrap(),
                    traffic_index: traffic,
                }
            })
            .collect()
    }

    pub fn features_from(records: Vec<ShipmentRecord>) -> DerivedFeatures {
        derive(&RecordStore::from_records(records).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{features_from, varied_records};
    use super::*;

    struct FixedScorer;

    impl SignalScorer for FixedScorer {
        fn kind(&self) -> ScorerKind {
            ScorerKind::DelayRisk
        }

        fn score(&self, features: &DerivedFeatures) -> SignalOutcome {
            let scores = features
                .shipments()
                .keys()
                .map(|id| {
                    (
                        id.clone(),
                        SignalScore {
                            score: 0.9,
                            flagged: id.ends_with('1'),
                        },
                    )
                })
                .collect();
            SignalOutcome::Scored(SignalReport {
                scorer: ScorerKind::DelayRisk,
                scores,
                summary: SignalSummary::DelayRisk(RiskModelReport::default()),
            })
        }
    }

    #[test]
    fn stub_scorers_plug_into_signal_sets() {
        let features = features_from(varied_records(12));
        let scorers: Vec<Box<dyn SignalScorer>> = vec![Box::new(FixedScorer)];
        let set = SignalSet::from_scorers(&features, &scorers);
        let report = set.get(ScorerKind::DelayRisk).and_then(SignalOutcome::report).unwrap();
        assert_eq!(report.flagged(), vec!["S-001", "S-011"]);
        assert!(set.get(ScorerKind::Anomaly).is_none());
    }

    #[test]
    fn small_datasets_yield_no_signal() {
        let features = features_from(varied_records(4));
        let set = SignalSet::compute(&features, &ScorerConfig::default(), 7);
        for kind in ScorerKind::ALL {
            let outcome = set.get(kind).unwrap();
            assert_eq!(
                outcome,
                &SignalOutcome::NoSignal(InsufficientData {
                    scorer: kind,
                    required: 10,
                    available: 4,
                })
            );
        }
    }

    #[test]
    fn empty_store_is_insufficient_even_without_a_floor() {
        let features = features_from(Vec::new());
        let cfg = ScorerConfig {
            min_records: 0,
            ..ScorerConfig::default()
        };
        let anomaly = AnomalyScorer::new(&cfg, 1).score(&features);
        assert_eq!(
            anomaly,
            SignalOutcome::NoSignal(InsufficientData {
                scorer: ScorerKind::Anomaly,
                required: 1,
                available: 0,
            })
        );
        let set = SignalSet::compute(&features, &cfg, 1);
        for kind in ScorerKind::ALL {
            assert!(matches!(set.get(kind), Some(SignalOutcome::NoSignal(_))));
        }
    }

    #[test]
    fn scoring_leaves_features_untouched() {
        let features = features_from(varied_records(30));
        let before = features.fingerprint();
        let first = SignalSet::compute(&features, &ScorerConfig::default(), 11);
        let second = SignalSet::compute(&features, &ScorerConfig::default(), 11);
        assert_eq!(features.fingerprint(), before);
        assert_eq!(first, second);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_scoring_matches_sequential() {
        let features = std::sync::Arc::new(features_from(varied_records(25)));
        let cfg = ScorerConfig::default();
        let sequential = SignalSet::compute(&features, &cfg, 3);
        let concurrent = compute_signals_async(features, cfg, 3).await;
        assert_eq!(sequential, concurrent);
    }
}
