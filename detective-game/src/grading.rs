//! Grading engine: correctness of a submitted hypothesis against a mission.
//!
//! Grading is pure. The same submission graded twice against the same
//! mission yields the same [`GradedResult`]; no hint state is consumed.
//! Hint penalties are left to the scoring engine.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::hash::Hasher;
use std::time::Duration;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::config::GradingConfig;
use crate::features::DerivedFeatures;
use crate::hypothesis::{HypothesisError, RootCause, same_entity};
use crate::mission::{FocusMetric, HintError, MissionDefinition};

/// How correct a hypothesis is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectnessTier {
    Exact,
    Partial,
    Incorrect,
}

impl CorrectnessTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Partial => "partial",
            Self::Incorrect => "incorrect",
        }
    }
}

/// Which mission assertion a hypothesis was matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MatchedAssertion {
    GroundTruth,
    /// Index into the mission's accepted alternatives.
    Alternative { index: usize },
}

/// One diverging field: what the matched assertion expected and what the
/// player submitted. Absent fields render as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

pub type Explanation = SmallVec<[FieldDelta; 2]>;

/// Whose entity an evidence note describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSubject {
    Submitted,
    Truth,
}

/// Derived metric for one entity, shown next to the verdict. Never affects
/// accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceNote {
    pub subject: EvidenceSubject,
    pub entity: String,
    pub metric: FocusMetric,
    /// `None` when the entity does not appear in the dataset.
    pub value: Option<f64>,
}

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResult {
    pub mission_id: String,
    pub correctness_tier: CorrectnessTier,
    pub matched_assertion: Option<MatchedAssertion>,
    pub accuracy_score: f64,
    pub explanation: Explanation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceNote>,
}

impl GradedResult {
    /// Stable 64-bit digest for telemetry and replay checks.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&bytes);
        hasher.finish()
    }
}

/// One submit action. Immutable once graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAttempt {
    pub mission_id: String,
    pub submitted_hypothesis: RootCause,
    pub hints_used: BTreeSet<String>,
    pub elapsed_time: Duration,
}

impl SubmissionAttempt {
    #[must_use]
    pub fn new<I, S>(
        mission_id: impl Into<String>,
        submitted_hypothesis: RootCause,
        hints_used: I,
        elapsed_time: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mission_id: mission_id.into(),
            submitted_hypothesis,
            hints_used: hints_used
                .into_iter()
                .map(|h| h.into().trim().to_string())
                .collect(),
            elapsed_time,
        }
    }

    /// Build an attempt from an untrusted JSON hypothesis and elapsed seconds.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::MalformedHypothesis`] when the hypothesis has
    /// the wrong shape and [`GradingError::InvalidElapsed`] for a negative or
    /// non-finite elapsed time.
    pub fn from_value<I, S>(
        mission_id: impl Into<String>,
        hypothesis: &Value,
        hints_used: I,
        elapsed_seconds: f64,
    ) -> Result<Self, GradingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hypothesis = RootCause::from_value(hypothesis)?;
        let elapsed = Duration::try_from_secs_f64(elapsed_seconds).map_err(|_| {
            GradingError::InvalidElapsed {
                seconds: elapsed_seconds,
            }
        })?;
        Ok(Self::new(mission_id, hypothesis, hints_used, elapsed))
    }
}

/// Submissions the engine refuses to grade. Shown to the player as an
/// invalid submission, never scored.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GradingError {
    #[error("invalid submission: {0}")]
    MalformedHypothesis(#[from] HypothesisError),
    #[error("invalid submission: mission '{mission_id}' has no hint '{hint_id}'")]
    UnknownHint { mission_id: String, hint_id: String },
    #[error("invalid submission: hint '{hint_id}' was used without '{requires}'")]
    MissingPrerequisite { hint_id: String, requires: String },
    #[error("invalid submission: attempt targets mission '{actual}', not '{expected}'")]
    MissionMismatch { expected: String, actual: String },
    #[error("invalid submission: elapsed time {seconds} is not a non-negative duration")]
    InvalidElapsed { seconds: f64 },
}

impl From<HintError> for GradingError {
    fn from(err: HintError) -> Self {
        match err {
            HintError::UnknownHint {
                mission_id,
                hint_id,
            } => Self::UnknownHint {
                mission_id,
                hint_id,
            },
            HintError::MissingPrerequisite { hint_id, requires } => {
                Self::MissingPrerequisite { hint_id, requires }
            }
        }
    }
}

/// Grades hypotheses with a configurable partial-credit weight.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingEngine {
    partial_credit: f64,
}

impl Default for GradingEngine {
    fn default() -> Self {
        Self::new(&GradingConfig::default())
    }
}

impl GradingEngine {
    #[must_use]
    pub const fn new(cfg: &GradingConfig) -> Self {
        Self {
            partial_credit: cfg.partial_credit,
        }
    }

    #[must_use]
    pub const fn partial_credit(&self) -> f64 {
        self.partial_credit
    }

    /// Grade a submission against its mission.
    ///
    /// Matching order: exact ground truth, exact alternatives in definition
    /// order, then a category-only match (ground truth first) for partial
    /// credit; anything else is incorrect.
    ///
    /// # Errors
    ///
    /// Returns a [`GradingError`] when the attempt names another mission or
    /// its hints are unknown or used without their prerequisites.
    pub fn grade(
        &self,
        submission: &SubmissionAttempt,
        mission: &MissionDefinition,
    ) -> Result<GradedResult, GradingError> {
        if !same_entity(&submission.mission_id, mission.mission_id()) {
            return Err(GradingError::MissionMismatch {
                expected: mission.mission_id().to_string(),
                actual: submission.mission_id.clone(),
            });
        }
        mission.hint_penalty(&submission.hints_used)?;

        let hypothesis = &submission.submitted_hypothesis;
        let truth = mission.ground_truth();
        let alternatives = mission.accepted_alternatives();

        let exact = if hypothesis == truth {
            Some(MatchedAssertion::GroundTruth)
        } else {
            alternatives
                .iter()
                .position(|alt| hypothesis == alt)
                .map(|index| MatchedAssertion::Alternative { index })
        };
        if let Some(matched) = exact {
            return Ok(GradedResult {
                mission_id: mission.mission_id().to_string(),
                correctness_tier: CorrectnessTier::Exact,
                matched_assertion: Some(matched),
                accuracy_score: 1.0,
                explanation: Explanation::new(),
                evidence: Vec::new(),
            });
        }

        let category_match = if hypothesis.same_category(truth) {
            Some((MatchedAssertion::GroundTruth, truth))
        } else {
            alternatives
                .iter()
                .enumerate()
                .find(|(_, alt)| hypothesis.same_category(alt))
                .map(|(index, alt)| (MatchedAssertion::Alternative { index }, alt))
        };

        let result = match category_match {
            Some((matched, assertion)) => GradedResult {
                mission_id: mission.mission_id().to_string(),
                correctness_tier: CorrectnessTier::Partial,
                matched_assertion: Some(matched),
                accuracy_score: self.partial_credit,
                explanation: field_deltas(assertion, hypothesis),
                evidence: Vec::new(),
            },
            None => GradedResult {
                mission_id: mission.mission_id().to_string(),
                correctness_tier: CorrectnessTier::Incorrect,
                matched_assertion: None,
                accuracy_score: 0.0,
                explanation: field_deltas(truth, hypothesis),
                evidence: Vec::new(),
            },
        };
        Ok(result)
    }

    /// Grade and attach metric evidence for the submitted and true entities.
    ///
    /// # Errors
    ///
    /// Same as [`GradingEngine::grade`].
    pub fn grade_with_evidence(
        &self,
        submission: &SubmissionAttempt,
        mission: &MissionDefinition,
        features: &DerivedFeatures,
    ) -> Result<GradedResult, GradingError> {
        let mut result = self.grade(submission, mission)?;
        let hypothesis = &submission.submitted_hypothesis;
        result
            .evidence
            .push(evidence(EvidenceSubject::Submitted, hypothesis, features));
        if hypothesis != mission.ground_truth() {
            result.evidence.push(evidence(
                EvidenceSubject::Truth,
                mission.ground_truth(),
                features,
            ));
        }
        Ok(result)
    }
}

/// Fields where `actual` diverges from `expected`, category first.
fn field_deltas(expected: &RootCause, actual: &RootCause) -> Explanation {
    let mut deltas = Explanation::new();
    if !expected.same_category(actual) {
        deltas.push(FieldDelta {
            field: "category".to_string(),
            expected: expected.category().as_str().to_string(),
            actual: actual.category().as_str().to_string(),
        });
    }
    let expected_fields = expected.fields();
    let extra = actual
        .fields()
        .into_iter()
        .filter(|(name, _)| !expected_fields.iter().any(|(e, _)| e == name));
    for (name, value) in expected_fields.iter().copied() {
        let submitted = actual.field(name).unwrap_or_default();
        if !same_entity(value, submitted) {
            deltas.push(FieldDelta {
                field: name.to_string(),
                expected: value.to_string(),
                actual: submitted.to_string(),
            });
        }
    }
    for (name, value) in extra {
        deltas.push(FieldDelta {
            field: name.to_string(),
            expected: String::new(),
            actual: value.to_string(),
        });
    }
    deltas
}

fn evidence(
    subject: EvidenceSubject,
    cause: &RootCause,
    features: &DerivedFeatures,
) -> EvidenceNote {
    let (metric, value) = match cause {
        RootCause::Supplier { entity } => {
            (FocusMetric::SupplierScore, features.supplier_score(entity))
        }
        RootCause::Warehouse { entity } => (
            FocusMetric::WarehouseLoad,
            features.warehouse_load_score(entity),
        ),
        RootCause::Route {
            origin,
            destination,
        } => (
            FocusMetric::RouteDelay,
            features.route(origin, destination).map(|r| r.delay_rate),
        ),
    };
    EvidenceNote {
        subject,
        entity: cause.entity_label(),
        metric,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::MissionSpec;
    use serde_json::json;

    fn mission() -> MissionDefinition {
        let spec: MissionSpec = serde_json::from_value(json!({
            "mission_id": "acme",
            "dataset": "acme-backorders",
            "ground_truth": {"category": "supplier", "entity": "Acme"},
            "accepted_alternatives": [
                {"category": "route", "origin": "Reno", "destination": "Boise"},
                {"category": "route", "origin": "Reno", "destination": "Denver"}
            ],
            "hints": [
                {"hint_id": "category", "reveals": {"kind": "category"}},
                {"hint_id": "metric", "requires": "category",
                 "reveals": {"kind": "focus_metric", "metric": "supplier_score"}}
            ]
        }))
        .unwrap();
        MissionDefinition::load(&spec).unwrap()
    }

    fn attempt(hypothesis: RootCause) -> SubmissionAttempt {
        SubmissionAttempt::new("acme", hypothesis, Vec::<String>::new(), Duration::from_secs(60))
    }

    #[test]
    fn exact_ground_truth_beats_everything() {
        let graded = GradingEngine::default()
            .grade(&attempt(RootCause::supplier("ACME ")), &mission())
            .unwrap();
        assert_eq!(graded.correctness_tier, CorrectnessTier::Exact);
        assert_eq!(graded.matched_assertion, Some(MatchedAssertion::GroundTruth));
        assert!((graded.accuracy_score - 1.0).abs() < f64::EPSILON);
        assert!(graded.explanation.is_empty());
    }

    #[test]
    fn alternatives_match_in_definition_order() {
        let graded = GradingEngine::default()
            .grade(&attempt(RootCause::route("Reno", "Denver")), &mission())
            .unwrap();
        assert_eq!(graded.correctness_tier, CorrectnessTier::Exact);
        assert_eq!(
            graded.matched_assertion,
            Some(MatchedAssertion::Alternative { index: 1 })
        );

        let partial = GradingEngine::default()
            .grade(&attempt(RootCause::route("Reno", "Austin")), &mission())
            .unwrap();
        assert_eq!(partial.correctness_tier, CorrectnessTier::Partial);
        assert_eq!(
            partial.matched_assertion,
            Some(MatchedAssertion::Alternative { index: 0 })
        );
        assert_eq!(partial.explanation.len(), 1);
        assert_eq!(partial.explanation[0].field, "destination");
    }

    #[test]
    fn wrong_entity_earns_configured_partial_credit() {
        let engine = GradingEngine::new(&GradingConfig {
            partial_credit: 0.25,
        });
        let graded = engine
            .grade(&attempt(RootCause::supplier("Globex")), &mission())
            .unwrap();
        assert_eq!(graded.correctness_tier, CorrectnessTier::Partial);
        assert!((graded.accuracy_score - 0.25).abs() < f64::EPSILON);
        assert_eq!(
            graded.explanation.as_slice(),
            &[FieldDelta {
                field: "entity".into(),
                expected: "Acme".into(),
                actual: "Globex".into()
            }]
        );
    }

    #[test]
    fn incorrect_lists_category_and_entity_deltas() {
        let graded = GradingEngine::default()
            .grade(&attempt(RootCause::warehouse("WH-02")), &mission())
            .unwrap();
        assert_eq!(graded.correctness_tier, CorrectnessTier::Incorrect);
        assert_eq!(graded.matched_assertion, None);
        assert!(graded.accuracy_score.abs() < f64::EPSILON);
        let fields: Vec<&str> = graded.explanation.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["category", "entity"]);
        assert_eq!(graded.explanation[0].expected, "supplier");
        assert_eq!(graded.explanation[0].actual, "warehouse");
    }

    #[test]
    fn rejects_invalid_submissions() {
        let engine = GradingEngine::default();
        let mut wrong_mission = attempt(RootCause::supplier("Acme"));
        wrong_mission.mission_id = "other".into();
        assert!(matches!(
            engine.grade(&wrong_mission, &mission()),
            Err(GradingError::MissionMismatch { .. })
        ));

        let skipped = SubmissionAttempt::new(
            "acme",
            RootCause::supplier("Acme"),
            ["metric"],
            Duration::ZERO,
        );
        assert_eq!(
            engine.grade(&skipped, &mission()),
            Err(GradingError::MissingPrerequisite {
                hint_id: "metric".into(),
                requires: "category".into()
            })
        );

        let unknown =
            SubmissionAttempt::new("acme", RootCause::supplier("Acme"), ["x"], Duration::ZERO);
        assert!(matches!(
            engine.grade(&unknown, &mission()),
            Err(GradingError::UnknownHint { .. })
        ));

        assert!(matches!(
            SubmissionAttempt::from_value("acme", &json!({"category": "supplier"}), ["category"], 5.0),
            Err(GradingError::MalformedHypothesis(_))
        ));
        assert!(matches!(
            SubmissionAttempt::from_value(
                "acme",
                &json!({"category": "supplier", "entity": "Acme"}),
                Vec::<String>::new(),
                -1.0
            ),
            Err(GradingError::InvalidElapsed { .. })
        ));
    }

    #[test]
    fn grading_twice_is_identical() {
        let engine = GradingEngine::default();
        let submission = SubmissionAttempt::new(
            "acme",
            RootCause::supplier("Globex"),
            ["category", "metric"],
            Duration::from_secs(90),
        );
        let first = engine.grade(&submission, &mission()).unwrap();
        let second = engine.grade(&submission, &mission()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }
}
