use anyhow::{Result, bail, ensure};
use colored::Colorize;
use detective_game::{
    CorrectnessTier, DataLoader, EngineConfig, LoadError, MissionEngine, MissionSession,
    PerformanceRating, SubmissionOutcome,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::policy::{Investigation, InvestigatorStrategy};

const DETERMINISM_SCENARIO: &str = "Determinism";
const MINUTES_PER_HINT: u64 = 3;

/// One graded submission inside a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub seed: u64,
    pub hypothesis: String,
    pub hints_used: Vec<String>,
    pub tier: CorrectnessTier,
    pub final_score: u32,
    pub rating: PerformanceRating,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub mission_id: String,
    pub policy: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    /// Iterations where the policy had nothing to try on this mission.
    pub skipped_iterations: usize,
    pub failures: Vec<String>,
    pub runs: Vec<RunSummary>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

impl ScenarioResult {
    fn new(mission_id: &str, policy: &str, seed: u64, iterations: usize) -> Self {
        Self {
            scenario_name: format!("{mission_id} / {policy}"),
            mission_id: mission_id.to_string(),
            policy: policy.to_string(),
            seed,
            passed: true,
            iterations_run: iterations,
            successful_iterations: 0,
            skipped_iterations: 0,
            failures: Vec::new(),
            runs: Vec::new(),
            average_duration: Duration::ZERO,
            performance_data: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.passed = self.failures.is_empty();
        self.average_duration = if self.performance_data.is_empty() {
            Duration::ZERO
        } else {
            self.performance_data.iter().sum::<Duration>()
                / u32::try_from(self.performance_data.len()).unwrap_or(1)
        };
        self
    }

    /// Best final score across graded runs.
    #[must_use]
    pub fn best_score(&self) -> Option<u32> {
        self.runs.iter().map(|r| r.final_score).max()
    }
}

/// Plays scripted investigators against missions from one data source.
pub struct MissionTester<L> {
    loader: L,
    config: EngineConfig,
    verbose: bool,
}

impl<L> MissionTester<L>
where
    L: DataLoader + Clone,
{
    pub const fn new(loader: L, config: EngineConfig, verbose: bool) -> Self {
        Self {
            loader,
            config,
            verbose,
        }
    }

    fn engine(&self, seed: u64) -> Result<MissionEngine<L>, LoadError> {
        let mut config = self.config.clone();
        config.scorers.seed = seed;
        MissionEngine::with_config(self.loader.clone(), config)
    }

    #[cfg(feature = "async")]
    async fn open(&self, mission_id: &str, seed: u64) -> Result<MissionSession, LoadError> {
        self.engine(seed)?.load_mission_async(mission_id).await
    }

    #[cfg(not(feature = "async"))]
    async fn open(&self, mission_id: &str, seed: u64) -> Result<MissionSession, LoadError> {
        self.engine(seed)?.load_mission(mission_id)
    }

    pub async fn run_scenario(
        &self,
        mission_id: &str,
        strategy: InvestigatorStrategy,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing mission: {} (policy: {} seed: {})",
                    mission_id.bright_white(),
                    strategy,
                    seed
                );
            }
            results.push(self.run_single_scenario(mission_id, strategy, seed, iterations).await);
        }

        results
    }

    async fn run_single_scenario(
        &self,
        mission_id: &str,
        strategy: InvestigatorStrategy,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut result = ScenarioResult::new(mission_id, strategy.label(), seed, iterations);

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            match self.play(mission_id, strategy, iteration_seed).await {
                Ok(Some(run)) => {
                    result.successful_iterations += 1;
                    let duration = start_time.elapsed();
                    result.performance_data.push(duration);
                    if self.verbose {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?}) {} -> {} {} points",
                            i + 1,
                            iterations,
                            run.hypothesis,
                            run.tier.as_str(),
                            run.final_score
                        );
                    }
                    result.runs.push(run);
                }
                Ok(None) => {
                    result.skipped_iterations += 1;
                    result.successful_iterations += 1;
                    if self.verbose {
                        println!(
                            "  ⏭️  Iteration {}/{} skipped: {} has nothing to try",
                            i + 1,
                            iterations,
                            strategy
                        );
                    }
                }
                Err(err) => {
                    let message = format!(
                        "Iteration {} (policy {}, seed {}): {err:#}",
                        i + 1,
                        strategy.label(),
                        iteration_seed
                    );
                    if self.verbose {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            message.clone().red()
                        );
                    }
                    result.failures.push(message);
                }
            }
        }

        result.finish()
    }

    async fn play(
        &self,
        mission_id: &str,
        strategy: InvestigatorStrategy,
        seed: u64,
    ) -> Result<Option<RunSummary>> {
        let session = self.open(mission_id, seed).await?;
        let mut policy = strategy.create_policy(seed);
        let Some(investigation) = policy.investigate(&session) else {
            log::debug!("{} skipped mission {mission_id}", policy.name());
            return Ok(None);
        };

        let minutes = MINUTES_PER_HINT * (1 + u64::try_from(investigation.hints.len()).unwrap_or(0));
        let outcome = session.submit(
            investigation.hypothesis.clone(),
            investigation.hints.iter().cloned(),
            Duration::from_secs(minutes * 60),
        )?;

        check_invariants(&session, &outcome)?;
        check_expectation(strategy, &session, &investigation, &outcome)?;

        Ok(Some(RunSummary {
            seed,
            hypothesis: investigation.hypothesis.to_string(),
            hints_used: investigation.hints,
            tier: outcome.graded.correctness_tier,
            final_score: outcome.score.final_score,
            rating: outcome.score.rating,
            rationale: investigation.rationale,
        }))
    }

    /// Load each mission twice per seed and compare everything derived.
    pub async fn check_determinism(&self, mission_id: &str, seeds: &[u64]) -> Vec<ScenarioResult> {
        let mut results = Vec::new();
        for &seed in seeds {
            let mut result = ScenarioResult::new(mission_id, DETERMINISM_SCENARIO, seed, 1);
            let start_time = Instant::now();
            match self.compare_loads(mission_id, seed).await {
                Ok(()) => {
                    result.successful_iterations = 1;
                    result.performance_data.push(start_time.elapsed());
                }
                Err(err) => result.failures.push(format!("seed {seed}: {err:#}")),
            }
            results.push(result.finish());
        }
        results
    }

    async fn compare_loads(&self, mission_id: &str, seed: u64) -> Result<()> {
        let first = self.open(mission_id, seed).await?;
        let second = self.open(mission_id, seed).await?;
        ensure!(
            first.features().fingerprint() == second.features().fingerprint(),
            "derived features differ between loads"
        );
        ensure!(first.kpis() == second.kpis(), "KPI summaries differ between loads");
        ensure!(
            first.signals() == second.signals(),
            "signal flags differ between loads"
        );

        let truth = first.mission().ground_truth().clone();
        let a = first.submit(truth.clone(), Vec::<String>::new(), Duration::ZERO)?;
        let b = second.submit(truth, Vec::<String>::new(), Duration::ZERO)?;
        ensure!(
            a.graded.fingerprint() == b.graded.fingerprint(),
            "graded results differ between loads"
        );
        Ok(())
    }
}

/// Properties every graded submission must hold.
fn check_invariants(session: &MissionSession, outcome: &SubmissionOutcome) -> Result<()> {
    let regraded = session.grade(&outcome.submission)?;
    ensure!(&regraded == outcome, "grading the same attempt twice differed");

    let graded = &outcome.graded;
    let score = &outcome.score;
    ensure!(
        (0.0..=1.0).contains(&graded.accuracy_score),
        "accuracy {} outside [0, 1]",
        graded.accuracy_score
    );
    ensure!(
        score.final_score <= session.config().scoring.max_points,
        "final score {} exceeds the maximum",
        score.final_score
    );
    ensure!(score.time_bonus == 0, "time bonus {} awarded", score.time_bonus);

    let penalty = session
        .mission()
        .hint_penalty(&outcome.submission.hints_used)?;
    ensure!(
        score.hint_penalty == penalty,
        "hint penalty {} but hints cost {penalty}",
        score.hint_penalty
    );
    ensure!(
        score.final_score == score.base_points.saturating_sub(penalty) + score.time_bonus,
        "final score {} does not follow from base {} and penalty {penalty}",
        score.final_score,
        score.base_points
    );
    Ok(())
}

/// What each scripted investigator is supposed to achieve.
fn check_expectation(
    strategy: InvestigatorStrategy,
    session: &MissionSession,
    investigation: &Investigation,
    outcome: &SubmissionOutcome,
) -> Result<()> {
    let tier = outcome.graded.correctness_tier;
    let max_points = session.config().scoring.max_points;
    match strategy {
        InvestigatorStrategy::Sleuth => {
            ensure!(
                tier == CorrectnessTier::Exact,
                "sleuth concluded {} ({})",
                investigation.hypothesis,
                tier.as_str()
            );
        }
        InvestigatorStrategy::Insider => {
            ensure!(tier == CorrectnessTier::Exact, "ground truth graded {}", tier.as_str());
            ensure!(
                outcome.score.final_score == max_points,
                "hint-free exact answer scored {}",
                outcome.score.final_score
            );
            ensure!(
                outcome.score.rating == PerformanceRating::Excellent,
                "rating {} for a perfect score",
                outcome.score.rating
            );
        }
        InvestigatorStrategy::HintHungry => {
            let total: u32 = session.mission().hints().iter().map(|h| h.cost()).sum();
            ensure!(
                investigation.hints.len() == session.mission().hints().len(),
                "only {} of {} hints reachable",
                investigation.hints.len(),
                session.mission().hints().len()
            );
            ensure!(tier == CorrectnessTier::Exact, "ground truth graded {}", tier.as_str());
            ensure!(
                outcome.score.final_score == max_points.saturating_sub(total),
                "expected {} after {total} in hints, got {}",
                max_points.saturating_sub(total),
                outcome.score.final_score
            );
        }
        InvestigatorStrategy::NearMiss => {
            ensure!(tier == CorrectnessTier::Partial, "decoy graded {}", tier.as_str());
            let credit = session.config().grading.partial_credit;
            ensure!(
                (outcome.graded.accuracy_score - credit).abs() < f64::EPSILON,
                "partial accuracy {} instead of {credit}",
                outcome.graded.accuracy_score
            );
            ensure!(
                !outcome.graded.explanation.is_empty(),
                "partial result carries no explanation"
            );
        }
        InvestigatorStrategy::RedHerring => {
            if tier != CorrectnessTier::Incorrect || outcome.score.final_score != 0 {
                bail!(
                    "unrelated category graded {} for {} points",
                    tier.as_str(),
                    outcome.score.final_score
                );
            }
        }
        InvestigatorStrategy::Guesser => {}
    }
    Ok(())
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}
