//! Mission definitions and the mission catalog.
//!
//! A mission is loaded once from a declarative [`MissionSpec`] and is then
//! immutable. Hint reveals are resolved against the ground truth at load
//! time into [`HintReveal`] values, whose variants can only carry partial
//! information: a category, an origin, a shortlist of two or more names, or a
//! pointer at a metric or scorer.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::constants::{DEFAULT_HINT_COST, SHORTLIST_MIN_CANDIDATES};
use crate::hypothesis::{CauseCategory, HypothesisError, RootCause, same_entity};
use crate::signals::ScorerKind;

/// Player-facing difficulty label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Rookie,
    Analyst,
    Detective,
}

/// Derived metric a hint can point the player at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMetric {
    SupplierScore,
    WarehouseLoad,
    RouteDelay,
    CostDelayCorrelation,
}

/// What a hint reveals, as written in mission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevealSpec {
    /// The ground truth's cause category.
    Category,
    FocusMetric { metric: FocusMetric },
    /// The origin of a route cause.
    RouteOrigin,
    /// Names to choose between; must include the true entity.
    Shortlist { candidates: Vec<String> },
    FlaggedShipments { scorer: ScorerKind },
}

/// One hint as written in mission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintSpec {
    pub hint_id: String,
    /// Missing costs fall back to the configured default.
    #[serde(default)]
    pub cost: Option<i64>,
    pub reveals: RevealSpec,
    #[serde(default)]
    pub requires: Option<String>,
}

/// A mission as written in mission configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSpec {
    pub mission_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub dataset: String,
    pub ground_truth: Value,
    #[serde(default)]
    pub accepted_alternatives: Vec<Value>,
    #[serde(default)]
    pub hints: Vec<HintSpec>,
}

/// Resolved hint content; never the full answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HintReveal {
    Category { category: CauseCategory },
    FocusMetric { metric: FocusMetric },
    RouteOrigin { origin: String },
    /// Sorted alphabetically so the true entity's position carries nothing.
    Shortlist { candidates: Vec<String> },
    FlaggedShipments { scorer: ScorerKind },
}

/// A hint with its cost and prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    hint_id: String,
    cost: u32,
    requires: Option<String>,
    reveal: HintReveal,
}

impl Hint {
    #[must_use]
    pub fn hint_id(&self) -> &str {
        &self.hint_id
    }

    #[must_use]
    pub const fn cost(&self) -> u32 {
        self.cost
    }

    #[must_use]
    pub fn requires(&self) -> Option<&str> {
        self.requires.as_deref()
    }

    #[must_use]
    pub const fn reveal(&self) -> &HintReveal {
        &self.reveal
    }
}

/// Fatal problems in a mission definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MissionConfigError {
    #[error("mission catalog is not valid JSON: {0}")]
    Parse(String),
    #[error("mission id must not be empty")]
    EmptyMissionId,
    #[error("duplicate mission id '{0}'")]
    DuplicateMission(String),
    #[error("mission '{mission_id}' does not reference a dataset")]
    MissingDataset { mission_id: String },
    #[error("mission '{mission_id}' has a malformed ground truth: {source}")]
    MalformedGroundTruth {
        mission_id: String,
        source: HypothesisError,
    },
    #[error("mission '{mission_id}' accepted alternative #{index} is malformed: {source}")]
    MalformedAlternative {
        mission_id: String,
        index: usize,
        source: HypothesisError,
    },
    #[error("mission '{mission_id}' has a hint with an empty id")]
    EmptyHintId { mission_id: String },
    #[error("mission '{mission_id}' defines hint '{hint_id}' twice")]
    DuplicateHint { mission_id: String, hint_id: String },
    #[error("mission '{mission_id}' hint '{hint_id}' has negative cost {cost}")]
    NegativeHintCost {
        mission_id: String,
        hint_id: String,
        cost: i64,
    },
    #[error("mission '{mission_id}' hint '{hint_id}' cost {cost} is out of range")]
    HintCostOutOfRange {
        mission_id: String,
        hint_id: String,
        cost: i64,
    },
    #[error("mission '{mission_id}' hint '{hint_id}' requires unknown hint '{requires}'")]
    UnknownHintReference {
        mission_id: String,
        hint_id: String,
        requires: String,
    },
    #[error("mission '{mission_id}' hint '{hint_id}' has an invalid reveal: {reason}")]
    InvalidReveal {
        mission_id: String,
        hint_id: String,
        reason: &'static str,
    },
}

/// Hint lookups that fail against a loaded mission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HintError {
    #[error("mission '{mission_id}' has no hint '{hint_id}'")]
    UnknownHint { mission_id: String, hint_id: String },
    #[error("hint '{hint_id}' requires hint '{requires}' first")]
    MissingPrerequisite { hint_id: String, requires: String },
}

/// An immutable, validated mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionDefinition {
    mission_id: String,
    title: String,
    difficulty: Difficulty,
    dataset: String,
    ground_truth: RootCause,
    accepted_alternatives: Vec<RootCause>,
    hints: Vec<Hint>,
}

impl MissionDefinition {
    /// Load a mission using the default hint cost.
    ///
    /// # Errors
    ///
    /// Returns a [`MissionConfigError`] describing the first problem found.
    pub fn load(spec: &MissionSpec) -> Result<Self, MissionConfigError> {
        Self::load_with_default_cost(spec, DEFAULT_HINT_COST)
    }

    /// Load a mission; hints without an explicit cost use `default_cost`.
    ///
    /// # Errors
    ///
    /// Returns a [`MissionConfigError`] when the ground truth or an
    /// alternative is malformed, a hint id is empty or duplicated, a cost is
    /// negative, a prerequisite is unknown, or a reveal cannot be resolved
    /// without leaking the full answer.
    pub fn load_with_default_cost(
        spec: &MissionSpec,
        default_cost: u32,
    ) -> Result<Self, MissionConfigError> {
        let mission_id = spec.mission_id.trim().to_string();
        if mission_id.is_empty() {
            return Err(MissionConfigError::EmptyMissionId);
        }
        let dataset = spec.dataset.trim().to_string();
        if dataset.is_empty() {
            return Err(MissionConfigError::MissingDataset { mission_id });
        }

        let ground_truth = RootCause::from_value(&spec.ground_truth).map_err(|source| {
            MissionConfigError::MalformedGroundTruth {
                mission_id: mission_id.clone(),
                source,
            }
        })?;
        let accepted_alternatives = spec
            .accepted_alternatives
            .iter()
            .enumerate()
            .map(|(index, value)| {
                RootCause::from_value(value).map_err(|source| {
                    MissionConfigError::MalformedAlternative {
                        mission_id: mission_id.clone(),
                        index,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut hints = Vec::with_capacity(spec.hints.len());
        for hint in &spec.hints {
            let hint_id = hint.hint_id.trim().to_string();
            if hint_id.is_empty() {
                return Err(MissionConfigError::EmptyHintId { mission_id });
            }
            let cost = resolve_cost(&mission_id, &hint_id, hint.cost, default_cost)?;
            let requires = match hint.requires.as_deref().map(str::trim) {
                None => None,
                Some(req) if seen.contains(req) => Some(req.to_string()),
                Some(req) => {
                    return Err(MissionConfigError::UnknownHintReference {
                        mission_id,
                        hint_id,
                        requires: req.to_string(),
                    });
                }
            };
            let reveal = resolve_reveal(&hint.reveals, &ground_truth).map_err(|reason| {
                MissionConfigError::InvalidReveal {
                    mission_id: mission_id.clone(),
                    hint_id: hint_id.clone(),
                    reason,
                }
            })?;
            if !seen.insert(hint_id.clone()) {
                return Err(MissionConfigError::DuplicateHint {
                    mission_id,
                    hint_id,
                });
            }
            hints.push(Hint {
                hint_id,
                cost,
                requires,
                reveal,
            });
        }

        Ok(Self {
            mission_id,
            title: spec.title.trim().to_string(),
            difficulty: spec.difficulty,
            dataset,
            ground_truth,
            accepted_alternatives,
            hints,
        })
    }

    /// Parse a single mission spec from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`MissionConfigError::Parse`] for malformed JSON, otherwise the
    /// validation errors of [`MissionDefinition::load`].
    pub fn from_json(json: &str) -> Result<Self, MissionConfigError> {
        let spec: MissionSpec =
            serde_json::from_str(json).map_err(|err| MissionConfigError::Parse(err.to_string()))?;
        Self::load(&spec)
    }

    #[must_use]
    pub fn mission_id(&self) -> &str {
        &self.mission_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub const fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// The authoritative answer. Graders read it; hints never do.
    #[must_use]
    pub const fn ground_truth(&self) -> &RootCause {
        &self.ground_truth
    }

    #[must_use]
    pub fn accepted_alternatives(&self) -> &[RootCause] {
        &self.accepted_alternatives
    }

    /// Hints in definition order.
    #[must_use]
    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    /// Look up a hint.
    ///
    /// # Errors
    ///
    /// Returns [`HintError::UnknownHint`] when the mission defines no such hint.
    pub fn hint(&self, hint_id: &str) -> Result<&Hint, HintError> {
        self.hints
            .iter()
            .find(|h| h.hint_id == hint_id.trim())
            .ok_or_else(|| HintError::UnknownHint {
                mission_id: self.mission_id.clone(),
                hint_id: hint_id.to_string(),
            })
    }

    /// # Errors
    ///
    /// Returns [`HintError::UnknownHint`] when the mission defines no such hint.
    pub fn hint_cost(&self, hint_id: &str) -> Result<u32, HintError> {
        self.hint(hint_id).map(Hint::cost)
    }

    /// # Errors
    ///
    /// Returns [`HintError::UnknownHint`] when the mission defines no such hint.
    pub fn reveal(&self, hint_id: &str) -> Result<&HintReveal, HintError> {
        self.hint(hint_id).map(Hint::reveal)
    }

    /// Hints not yet used whose prerequisite has been used.
    #[must_use]
    pub fn available_hints(&self, used: &BTreeSet<String>) -> Vec<&Hint> {
        self.hints
            .iter()
            .filter(|h| !used.contains(&h.hint_id))
            .filter(|h| h.requires.as_ref().is_none_or(|req| used.contains(req)))
            .collect()
    }

    /// Check a set of used hints and sum their costs.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown hint id or a hint whose prerequisite is
    /// missing from the set.
    pub fn hint_penalty(&self, used: &BTreeSet<String>) -> Result<u32, HintError> {
        used.iter().try_fold(0u32, |total, hint_id| {
            let hint = self.hint(hint_id)?;
            if let Some(requires) = &hint.requires
                && !used.contains(requires)
            {
                return Err(HintError::MissingPrerequisite {
                    hint_id: hint.hint_id.clone(),
                    requires: requires.clone(),
                });
            }
            Ok(total.saturating_add(hint.cost))
        })
    }
}

fn resolve_cost(
    mission_id: &str,
    hint_id: &str,
    cost: Option<i64>,
    default_cost: u32,
) -> Result<u32, MissionConfigError> {
    let Some(cost) = cost else {
        return Ok(default_cost);
    };
    if cost < 0 {
        return Err(MissionConfigError::NegativeHintCost {
            mission_id: mission_id.to_string(),
            hint_id: hint_id.to_string(),
            cost,
        });
    }
    u32::try_from(cost).map_err(|_| MissionConfigError::HintCostOutOfRange {
        mission_id: mission_id.to_string(),
        hint_id: hint_id.to_string(),
        cost,
    })
}

fn resolve_reveal(spec: &RevealSpec, truth: &RootCause) -> Result<HintReveal, &'static str> {
    Ok(match spec {
        RevealSpec::Category => HintReveal::Category {
            category: truth.category(),
        },
        RevealSpec::FocusMetric { metric } => HintReveal::FocusMetric { metric: *metric },
        RevealSpec::FlaggedShipments { scorer } => HintReveal::FlaggedShipments { scorer: *scorer },
        RevealSpec::RouteOrigin => match truth {
            RootCause::Route { origin, .. } => HintReveal::RouteOrigin {
                origin: origin.clone(),
            },
            _ => return Err("route_origin needs a route ground truth"),
        },
        RevealSpec::Shortlist { candidates } => {
            let (RootCause::Supplier { entity } | RootCause::Warehouse { entity }) = truth else {
                return Err("shortlist needs a supplier or warehouse ground truth");
            };
            let mut distinct: Vec<String> = Vec::new();
            for candidate in candidates.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
                if !distinct.iter().any(|d| same_entity(d, candidate)) {
                    distinct.push(candidate.to_string());
                }
            }
            if distinct.len() < SHORTLIST_MIN_CANDIDATES {
                return Err("shortlist needs at least two distinct candidates");
            }
            if !distinct.iter().any(|d| same_entity(d, entity)) {
                return Err("shortlist must include the true entity");
            }
            distinct.sort_by_key(|c| c.to_ascii_lowercase());
            HintReveal::Shortlist {
                candidates: distinct,
            }
        }
    })
}

/// Summary row for mission pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionSummary {
    pub mission_id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub dataset: String,
    pub hint_count: usize,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    missions: Vec<MissionSpec>,
}

/// Immutable set of loaded missions, in definition order.
#[derive(Debug, Clone, Default)]
pub struct MissionCatalog {
    missions: Vec<Arc<MissionDefinition>>,
}

impl MissionCatalog {
    /// Validate every spec; any failure rejects the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns the first [`MissionConfigError`] found, including duplicate
    /// mission ids.
    pub fn from_specs(specs: &[MissionSpec], default_cost: u32) -> Result<Self, MissionConfigError> {
        let mut missions: Vec<Arc<MissionDefinition>> = Vec::with_capacity(specs.len());
        for spec in specs {
            let mission = MissionDefinition::load_with_default_cost(spec, default_cost)?;
            if missions.iter().any(|m| m.mission_id == mission.mission_id) {
                return Err(MissionConfigError::DuplicateMission(mission.mission_id));
            }
            missions.push(Arc::new(mission));
        }
        Ok(Self { missions })
    }

    /// Parse a `{ "missions": [...] }` document.
    ///
    /// # Errors
    ///
    /// Returns [`MissionConfigError::Parse`] for malformed JSON, otherwise the
    /// first validation failure.
    pub fn from_json(json: &str, default_cost: u32) -> Result<Self, MissionConfigError> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|err| MissionConfigError::Parse(err.to_string()))?;
        Self::from_specs(&doc.missions, default_cost)
    }

    #[must_use]
    pub fn get(&self, mission_id: &str) -> Option<Arc<MissionDefinition>> {
        self.missions
            .iter()
            .find(|m| m.mission_id == mission_id.trim())
            .cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<MissionSummary> {
        self.missions
            .iter()
            .map(|m| MissionSummary {
                mission_id: m.mission_id.clone(),
                title: m.title.clone(),
                difficulty: m.difficulty,
                dataset: m.dataset.clone(),
                hint_count: m.hints.len(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MissionDefinition>> {
        self.missions.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.missions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }
}
