//! Final point calculation for a graded submission.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ScoringConfig;
use crate::constants::{RATING_AVERAGE_MIN, RATING_EXCELLENT_MIN, RATING_GOOD_MIN};
use crate::grading::{GradedResult, GradingError, SubmissionAttempt};
use crate::mission::MissionDefinition;
use crate::numbers::round_f64_to_u32;

/// Feedback band for the results screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceRating {
    Excellent,
    Good,
    Average,
    NeedsWork,
}

impl PerformanceRating {
    /// Band for a score expressed as a percentage of the maximum.
    #[must_use]
    pub const fn from_percent(percent: u32) -> Self {
        if percent >= RATING_EXCELLENT_MIN {
            Self::Excellent
        } else if percent >= RATING_GOOD_MIN {
            Self::Good
        } else if percent >= RATING_AVERAGE_MIN {
            Self::Average
        } else {
            Self::NeedsWork
        }
    }
}

impl std::fmt::Display for PerformanceRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Average => write!(f, "average"),
            Self::NeedsWork => write!(f, "needs_work"),
        }
    }
}

/// Every term that went into a final score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_points: u32,
    pub hint_penalty: u32,
    pub hints_used: usize,
    /// Always 0; elapsed time is recorded but not scored.
    pub time_bonus: u32,
    pub elapsed_time: Duration,
    pub final_score: u32,
    pub rating: PerformanceRating,
}

/// Combines accuracy with hint costs into player-facing points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringEngine {
    max_points: u32,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl ScoringEngine {
    #[must_use]
    pub const fn new(cfg: &ScoringConfig) -> Self {
        Self {
            max_points: cfg.max_points,
        }
    }

    /// `round(max_points * accuracy) - hint_penalty`, floored at 0.
    #[must_use]
    pub fn final_score(&self, accuracy: f64, hint_penalty: u32) -> u32 {
        let base = round_f64_to_u32(f64::from(self.max_points) * accuracy.clamp(0.0, 1.0));
        base.saturating_sub(hint_penalty)
    }

    /// Elapsed time does not earn points yet.
    #[must_use]
    pub const fn time_bonus(&self, _elapsed: Duration) -> u32 {
        0
    }

    /// Score a graded submission. Hint penalty is the sum of the mission's
    /// costs for the hints used.
    ///
    /// # Errors
    ///
    /// Returns a [`GradingError`] when the submission names a hint the
    /// mission does not define or skips a prerequisite.
    pub fn score(
        &self,
        graded: &GradedResult,
        submission: &SubmissionAttempt,
        mission: &MissionDefinition,
    ) -> Result<ScoreBreakdown, GradingError> {
        let hint_penalty = mission.hint_penalty(&submission.hints_used)?;
        let base_points =
            round_f64_to_u32(f64::from(self.max_points) * graded.accuracy_score.clamp(0.0, 1.0));
        let time_bonus = self.time_bonus(submission.elapsed_time);
        let final_score = self
            .final_score(graded.accuracy_score, hint_penalty)
            .saturating_add(time_bonus);
        let percent = round_f64_to_u32(
            f64::from(final_score) * 100.0 / f64::from(self.max_points.max(1)),
        );
        Ok(ScoreBreakdown {
            base_points,
            hint_penalty,
            hints_used: submission.hints_used.len(),
            time_bonus,
            elapsed_time: submission.elapsed_time,
            final_score,
            rating: PerformanceRating::from_percent(percent),
        })
    }
}
