//! One mission being investigated: the loaded store, its derived features and
//! KPIs, lazily computed signals, and the hint and submit entry points.
//!
//! Everything a session holds is read-only after construction. Drill-down
//! views in the UI layer work on copies.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::constants::{EVENT_MISSION_HINT, EVENT_MISSION_LOAD, EVENT_MISSION_SUBMIT};
use crate::features::DerivedFeatures;
use crate::grading::{GradedResult, GradingEngine, GradingError, SubmissionAttempt};
use crate::hypothesis::RootCause;
use crate::kpi::KpiSummary;
use crate::mission::{FocusMetric, HintError, HintReveal, MissionDefinition};
use crate::records::RecordStore;
use crate::scoring::{ScoreBreakdown, ScoringEngine};
use crate::seed::mission_seed;
use crate::signals::{InsufficientData, ScorerKind, SignalOutcome, SignalSet};

/// One labelled value in a metric ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub label: String,
    pub value: f64,
}

/// Data that accompanies a hint reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HintDetail {
    None,
    /// Entities ordered from most to least suspicious.
    Ranking {
        metric: FocusMetric,
        rows: Vec<MetricRow>,
    },
    Correlation {
        value: f64,
    },
    Flagged {
        scorer: ScorerKind,
        shipment_ids: Vec<String>,
    },
    NoSignal(InsufficientData),
}

/// What the UI renders for a requested hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintContent {
    pub hint_id: String,
    pub cost: u32,
    pub reveal: HintReveal,
    pub detail: HintDetail,
}

/// Graded and scored result of one submit action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub submission: SubmissionAttempt,
    pub graded: GradedResult,
    pub score: ScoreBreakdown,
}

/// A loaded mission ready for investigation.
#[derive(Debug)]
pub struct MissionSession {
    mission: Arc<MissionDefinition>,
    store: Arc<RecordStore>,
    features: Arc<DerivedFeatures>,
    kpis: KpiSummary,
    signals: OnceLock<SignalSet>,
    seed: u64,
    config: EngineConfig,
}

impl MissionSession {
    /// Derive features and KPIs for a validated store.
    #[must_use]
    pub fn new(mission: Arc<MissionDefinition>, store: RecordStore, config: &EngineConfig) -> Self {
        let features = DerivedFeatures::derive(&store, &config.features);
        let kpis = KpiSummary::summarize(&features);
        let seed = mission_seed(mission.mission_id(), config.scorers.seed);
        log::info!(
            "{EVENT_MISSION_LOAD} mission={} dataset={} records={} suppliers={} warehouses={} fingerprint={:016x}",
            mission.mission_id(),
            mission.dataset(),
            store.len(),
            features.suppliers().len(),
            features.warehouses().len(),
            features.fingerprint()
        );
        Self {
            mission,
            store: Arc::new(store),
            features: Arc::new(features),
            kpis,
            signals: OnceLock::new(),
            seed,
            config: config.clone(),
        }
    }

    /// Install signals computed elsewhere, e.g. concurrently at load time.
    /// Ignored when signals were already computed.
    #[must_use]
    pub fn with_signals(self, signals: SignalSet) -> Self {
        let _ = self.signals.set(signals);
        self
    }

    #[must_use]
    pub fn mission(&self) -> &MissionDefinition {
        &self.mission
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    #[must_use]
    pub const fn features(&self) -> &Arc<DerivedFeatures> {
        &self.features
    }

    #[must_use]
    pub const fn kpis(&self) -> &KpiSummary {
        &self.kpis
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Signals, computed on first use.
    pub fn signals(&self) -> &SignalSet {
        self.signals
            .get_or_init(|| SignalSet::compute(&self.features, &self.config.scorers, self.seed))
    }

    /// Resolve a hint into its reveal plus supporting data.
    ///
    /// # Errors
    ///
    /// Returns [`HintError::UnknownHint`] for ids the mission does not define.
    pub fn request_hint(&self, hint_id: &str) -> Result<HintContent, HintError> {
        let hint = self.mission.hint(hint_id)?;
        let detail = match hint.reveal() {
            HintReveal::FocusMetric { metric } => self.metric_detail(*metric),
            HintReveal::FlaggedShipments { scorer } => match self.signals().get(*scorer) {
                Some(SignalOutcome::Scored(report)) => HintDetail::Flagged {
                    scorer: *scorer,
                    shipment_ids: report.flagged().into_iter().map(str::to_string).collect(),
                },
                Some(SignalOutcome::NoSignal(err)) => HintDetail::NoSignal(err.clone()),
                None => HintDetail::None,
            },
            HintReveal::Category { .. }
            | HintReveal::RouteOrigin { .. }
            | HintReveal::Shortlist { .. } => HintDetail::None,
        };
        log::info!(
            "{EVENT_MISSION_HINT} mission={} hint={} cost={}",
            self.mission.mission_id(),
            hint.hint_id(),
            hint.cost()
        );
        Ok(HintContent {
            hint_id: hint.hint_id().to_string(),
            cost: hint.cost(),
            reveal: hint.reveal().clone(),
            detail,
        })
    }

    fn metric_detail(&self, metric: FocusMetric) -> HintDetail {
        let mut rows: Vec<MetricRow> = match metric {
            FocusMetric::SupplierScore => self
                .features
                .suppliers()
                .iter()
                .map(|(name, s)| MetricRow {
                    label: name.clone(),
                    value: s.supplier_score,
                })
                .collect(),
            FocusMetric::WarehouseLoad => self
                .features
                .warehouses()
                .iter()
                .map(|(id, w)| MetricRow {
                    label: id.clone(),
                    value: w.warehouse_load_score,
                })
                .collect(),
            FocusMetric::RouteDelay => self
                .features
                .routes()
                .iter()
                .map(|r| MetricRow {
                    label: format!("{} -> {}", r.origin, r.destination),
                    value: r.delay_rate,
                })
                .collect(),
            FocusMetric::CostDelayCorrelation => {
                return HintDetail::Correlation {
                    value: self.kpis.cost_delay_correlation,
                };
            }
        };
        // Scores rank worst-first ascending; delay rates descending.
        let descending = metric == FocusMetric::RouteDelay;
        rows.sort_by(|a, b| {
            let order = a.value.total_cmp(&b.value);
            let order = if descending { order.reverse() } else { order };
            order.then_with(|| a.label.cmp(&b.label))
        });
        HintDetail::Ranking { metric, rows }
    }

    /// Build an attempt for this mission and grade it.
    ///
    /// # Errors
    ///
    /// Returns a [`GradingError`] for unknown hints or missing prerequisites.
    pub fn submit<I, S>(
        &self,
        hypothesis: RootCause,
        hints_used: I,
        elapsed_time: Duration,
    ) -> Result<SubmissionOutcome, GradingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let submission = SubmissionAttempt::new(
            self.mission.mission_id(),
            hypothesis,
            hints_used,
            elapsed_time,
        );
        self.grade(&submission)
    }

    /// Grade and score an existing attempt. Repeat calls return identical
    /// outcomes.
    ///
    /// # Errors
    ///
    /// Returns a [`GradingError`] when the attempt targets another mission,
    /// names unknown hints, or skips a prerequisite.
    pub fn grade(&self, submission: &SubmissionAttempt) -> Result<SubmissionOutcome, GradingError> {
        let graded = GradingEngine::new(&self.config.grading).grade_with_evidence(
            submission,
            &self.mission,
            &self.features,
        )?;
        let score = ScoringEngine::new(&self.config.scoring).score(&graded, submission, &self.mission)?;
        log::info!(
            "{EVENT_MISSION_SUBMIT} mission={} tier={} accuracy={:.2} hints={} final_score={} rating={} result={:016x}",
            self.mission.mission_id(),
            graded.correctness_tier.as_str(),
            graded.accuracy_score,
            score.hints_used,
            score.final_score,
            score.rating,
            graded.fingerprint()
        );
        Ok(SubmissionOutcome {
            submission: submission.clone(),
            graded,
            score,
        })
    }

    /// Hint ids still open given the hints already taken.
    #[must_use]
    pub fn available_hints(&self, used: &BTreeSet<String>) -> Vec<String> {
        self.mission
            .available_hints(used)
            .into_iter()
            .map(|h| h.hint_id().to_string())
            .collect()
    }
}
