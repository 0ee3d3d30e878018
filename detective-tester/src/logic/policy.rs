use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use detective_game::{
    CauseCategory, HintDetail, HintReveal, MissionSession, RootCause, ShipmentFeatures,
    derive_stream_seed,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const GUESSER_STREAM: &[u8] = b"tester.guesser";

/// What a [`InvestigatorPolicy`] decided to submit.
#[derive(Debug, Clone)]
pub struct Investigation {
    pub hints: Vec<String>,
    pub hypothesis: RootCause,
    pub rationale: Option<String>,
}

/// Policy interface for scripted investigators.
pub trait InvestigatorPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Work the mission and pick a hypothesis. `None` when the mission offers
    /// nothing this policy can try.
    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation>;
}

/// Built-in investigator strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvestigatorStrategy {
    /// Reads every hint and reasons from the derived metrics.
    Sleuth,
    /// Submits the ground truth without hints.
    Insider,
    /// Buys every hint, then submits the ground truth.
    HintHungry,
    /// Right category, wrong entity.
    NearMiss,
    /// A category no assertion uses.
    RedHerring,
    /// Seeded random hints and hypothesis.
    Guesser,
}

impl InvestigatorStrategy {
    pub const ALL: [Self; 6] = [
        Self::Sleuth,
        Self::Insider,
        Self::HintHungry,
        Self::NearMiss,
        Self::RedHerring,
        Self::Guesser,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Sleuth => "Sleuth",
            Self::Insider => "Insider",
            Self::HintHungry => "Hint Hungry",
            Self::NearMiss => "Near Miss",
            Self::RedHerring => "Red Herring",
            Self::Guesser => "Guesser",
        }
    }

    /// CLI key, e.g. `hint-hungry`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Sleuth => "sleuth",
            Self::Insider => "insider",
            Self::HintHungry => "hint-hungry",
            Self::NearMiss => "near-miss",
            Self::RedHerring => "red-herring",
            Self::Guesser => "guesser",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.key().eq_ignore_ascii_case(raw))
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn InvestigatorPolicy + Send> {
        match self {
            Self::Sleuth => Box::new(SleuthPolicy),
            Self::Insider => Box::new(InsiderPolicy),
            Self::HintHungry => Box::new(HintHungryPolicy),
            Self::NearMiss => Box::new(NearMissPolicy),
            Self::RedHerring => Box::new(RedHerringPolicy),
            Self::Guesser => Box::new(GuesserPolicy::new(seed)),
        }
    }
}

impl fmt::Display for InvestigatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct SleuthPolicy;
struct InsiderPolicy;
struct HintHungryPolicy;
struct NearMissPolicy;
struct RedHerringPolicy;

struct GuesserPolicy {
    rng: ChaCha20Rng,
}

impl GuesserPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(derive_stream_seed(seed, GUESSER_STREAM)),
        }
    }
}

/// Everything the hints revealed so far.
#[derive(Debug, Default)]
struct Clues {
    category: Option<CauseCategory>,
    origin: Option<String>,
    shortlist: Vec<String>,
    flagged: Vec<String>,
}

impl Clues {
    fn absorb(&mut self, reveal: &HintReveal, detail: &HintDetail) {
        match reveal {
            HintReveal::Category { category } => self.category = Some(*category),
            HintReveal::RouteOrigin { origin } => {
                self.category = Some(CauseCategory::Route);
                self.origin = Some(origin.clone());
            }
            HintReveal::Shortlist { candidates } => self.shortlist.clone_from(candidates),
            HintReveal::FocusMetric { .. } | HintReveal::FlaggedShipments { .. } => {}
        }
        if let HintDetail::Flagged { shipment_ids, .. } = detail {
            self.flagged.extend(shipment_ids.iter().cloned());
        }
    }

    fn summary(&self) -> String {
        format!(
            "category {} origin {} shortlist {} flagged {}",
            self.category.map_or("?", CauseCategory::as_str),
            self.origin.as_deref().unwrap_or("?"),
            self.shortlist.len(),
            self.flagged.len()
        )
    }
}

impl InvestigatorPolicy for SleuthPolicy {
    fn name(&self) -> &'static str {
        "Sleuth"
    }

    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation> {
        let hints = every_hint(session);
        let mut clues = Clues::default();
        for hint_id in &hints {
            let content = session.request_hint(hint_id).ok()?;
            clues.absorb(&content.reveal, &content.detail);
        }
        let category = clues
            .category
            .or_else(|| flagged_majority(session, &clues.flagged))
            .unwrap_or(CauseCategory::Supplier);
        let hypothesis = weakest_entity(session, category, &clues)?;
        Some(Investigation {
            hints,
            hypothesis,
            rationale: Some(clues.summary()),
        })
    }
}

impl InvestigatorPolicy for InsiderPolicy {
    fn name(&self) -> &'static str {
        "Insider"
    }

    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation> {
        Some(Investigation {
            hints: Vec::new(),
            hypothesis: session.mission().ground_truth().clone(),
            rationale: None,
        })
    }
}

impl InvestigatorPolicy for HintHungryPolicy {
    fn name(&self) -> &'static str {
        "Hint Hungry"
    }

    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation> {
        let hints = every_hint(session);
        for hint_id in &hints {
            session.request_hint(hint_id).ok()?;
        }
        Some(Investigation {
            rationale: Some(format!("{} hints", hints.len())),
            hints,
            hypothesis: session.mission().ground_truth().clone(),
        })
    }
}

impl InvestigatorPolicy for NearMissPolicy {
    fn name(&self) -> &'static str {
        "Near Miss"
    }

    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation> {
        let mission = session.mission();
        let truth = mission.ground_truth();
        let hypothesis = entities(session, truth.category())
            .into_iter()
            .find(|candidate| {
                candidate != truth && !mission.accepted_alternatives().contains(candidate)
            })?;
        Some(Investigation {
            hints: Vec::new(),
            hypothesis,
            rationale: Some(format!("decoy for {}", truth.entity_label())),
        })
    }
}

impl InvestigatorPolicy for RedHerringPolicy {
    fn name(&self) -> &'static str {
        "Red Herring"
    }

    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation> {
        let mission = session.mission();
        let used: BTreeSet<CauseCategory> = std::iter::once(mission.ground_truth())
            .chain(mission.accepted_alternatives())
            .map(RootCause::category)
            .collect();
        let category = CauseCategory::ALL
            .into_iter()
            .find(|c| !used.contains(c))?;
        let hypothesis = entities(session, category).into_iter().next()?;
        Some(Investigation {
            hints: Vec::new(),
            hypothesis,
            rationale: Some(format!("unused category {category}")),
        })
    }
}

impl InvestigatorPolicy for GuesserPolicy {
    fn name(&self) -> &'static str {
        "Guesser"
    }

    fn investigate(&mut self, session: &MissionSession) -> Option<Investigation> {
        let mut used: BTreeSet<String> = BTreeSet::new();
        let mut hints = Vec::new();
        loop {
            let open = session.available_hints(&used);
            if open.is_empty() || self.rng.gen_bool(0.4) {
                break;
            }
            let pick = open[self.rng.gen_range(0..open.len())].clone();
            used.insert(pick.clone());
            hints.push(pick);
        }

        let category = CauseCategory::ALL[self.rng.gen_range(0..CauseCategory::ALL.len())];
        let pool = entities(session, category);
        if pool.is_empty() {
            return None;
        }
        let hypothesis = pool[self.rng.gen_range(0..pool.len())].clone();
        Some(Investigation {
            hints,
            hypothesis,
            rationale: Some(format!("picked from {} {category} candidates", pool.len())),
        })
    }
}

/// Every hint in an order that satisfies prerequisites.
fn every_hint(session: &MissionSession) -> Vec<String> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut order = Vec::new();
    while let Some(next) = session.available_hints(&used).into_iter().next() {
        used.insert(next.clone());
        order.push(next);
    }
    order
}

/// Every entity of a category present in the mission data.
fn entities(session: &MissionSession, category: CauseCategory) -> Vec<RootCause> {
    let features = session.features();
    match category {
        CauseCategory::Supplier => features
            .suppliers()
            .keys()
            .map(RootCause::supplier)
            .collect(),
        CauseCategory::Warehouse => features
            .warehouses()
            .keys()
            .map(RootCause::warehouse)
            .collect(),
        CauseCategory::Route => features
            .routes()
            .iter()
            .map(|r| RootCause::route(&r.origin, &r.destination))
            .collect(),
    }
}

/// Category whose single worst entity owns the most flagged shipments.
fn flagged_majority(session: &MissionSession, flagged: &[String]) -> Option<CauseCategory> {
    if flagged.is_empty() {
        return None;
    }
    let features = session.features();
    let top_share = |key: fn(&ShipmentFeatures) -> String| {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for shipment in flagged.iter().filter_map(|id| features.shipment(id)) {
            *counts.entry(key(shipment)).or_default() += 1;
        }
        counts.into_values().max().unwrap_or(0)
    };
    [
        (CauseCategory::Route, top_share(|s| format!("{}|{}", s.origin, s.destination))),
        (CauseCategory::Warehouse, top_share(|s| s.warehouse_id.clone())),
        (CauseCategory::Supplier, top_share(|s| s.supplier.clone())),
    ]
    .into_iter()
    .max_by_key(|(_, share)| *share)
    .map(|(category, _)| category)
}

/// Lowest-scoring supplier or warehouse, or the route with the worst delay
/// rate, restricted by whatever the hints narrowed down.
fn weakest_entity(
    session: &MissionSession,
    category: CauseCategory,
    clues: &Clues,
) -> Option<RootCause> {
    let features = session.features();
    let shortlisted = |name: &str| {
        clues.shortlist.is_empty() || clues.shortlist.iter().any(|c| c.eq_ignore_ascii_case(name))
    };
    match category {
        CauseCategory::Supplier => features
            .suppliers()
            .iter()
            .filter(|(name, _)| shortlisted(name.as_str()))
            .min_by(|a, b| a.1.supplier_score.total_cmp(&b.1.supplier_score))
            .map(|(name, _)| RootCause::supplier(name)),
        CauseCategory::Warehouse => features
            .warehouses()
            .iter()
            .filter(|(id, _)| shortlisted(id.as_str()))
            .min_by(|a, b| a.1.warehouse_load_score.total_cmp(&b.1.warehouse_load_score))
            .map(|(id, _)| RootCause::warehouse(id)),
        CauseCategory::Route => features
            .routes()
            .iter()
            .filter(|r| {
                clues
                    .origin
                    .as_deref()
                    .is_none_or(|origin| r.origin.eq_ignore_ascii_case(origin))
            })
            .min_by(|a, b| {
                b.delay_rate
                    .total_cmp(&a.delay_rate)
                    .then_with(|| b.shipments.cmp(&a.shipments))
            })
            .map(|r| RootCause::route(&r.origin, &r.destination)),
    }
}
