//! Delay-risk scorer: a ridge regression of transit time on distance, cost,
//! SKU count and traffic, squashed into a [0, 1] risk per shipment.
//!
//! Inputs are standardized before fitting so the coefficients double as
//! feature importance. Risk is the logistic of the predicted transit time in
//! standard deviations from the mission mean, so it rises strictly with the
//! predicted delay.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    ScorerKind, SignalOutcome, SignalReport, SignalScore, SignalScorer, SignalSummary,
    require_records,
};
use crate::config::ScorerConfig;
use crate::constants::PIVOT_EPSILON;
use crate::features::{DerivedFeatures, ShipmentFeatures};
use crate::numbers::usize_to_f64;

const INPUTS: usize = 4;
const INPUT_NAMES: [&str; INPUTS] = ["distance_km", "cost", "sku_count", "traffic_index"];

fn inputs(shipment: &ShipmentFeatures) -> [f64; INPUTS] {
    [
        shipment.distance_km,
        shipment.cost,
        f64::from(shipment.sku_count),
        shipment.traffic_index,
    ]
}

/// Standardized coefficient of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub coefficient: f64,
    /// Share of total absolute coefficient mass, in [0, 1].
    pub weight: f64,
}

/// Fit quality and importance of the delay-risk model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskModelReport {
    /// Sorted by descending absolute coefficient.
    pub importance: Vec<FeatureImportance>,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

/// Ridge-regression risk model refit per mission.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayRiskScorer {
    min_records: usize,
    flag_threshold: f64,
    ridge: f64,
}

impl DelayRiskScorer {
    #[must_use]
    pub fn new(cfg: &ScorerConfig) -> Self {
        Self {
            min_records: cfg.min_records,
            flag_threshold: cfg.risk_flag_threshold,
            ridge: cfg.ridge.max(0.0),
        }
    }
}

struct Column {
    mean: f64,
    std: f64,
}

fn column_stats(values: impl Iterator<Item = f64> + Clone, count: f64) -> Column {
    let mean = values.clone().sum::<f64>() / count;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    Column {
        mean,
        std: var.sqrt(),
    }
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: [[f64; INPUTS]; INPUTS], mut b: [f64; INPUTS]) -> Option<[f64; INPUTS]> {
    for col in 0..INPUTS {
        let pivot = (col..INPUTS).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..INPUTS {
            let factor = a[row][col] / a[col][col];
            for k in col..INPUTS {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; INPUTS];
    for row in (0..INPUTS).rev() {
        let tail: f64 = (row + 1..INPUTS).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl SignalScorer for DelayRiskScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::DelayRisk
    }

    fn score(&self, features: &DerivedFeatures) -> SignalOutcome {
        if let Err(err) = require_records(ScorerKind::DelayRisk, features, self.min_records) {
            return SignalOutcome::NoSignal(err);
        }

        let shipments: Vec<&ShipmentFeatures> = features.shipments().values().collect();
        let count = usize_to_f64(shipments.len());
        let raw: Vec<[f64; INPUTS]> = shipments.iter().map(|s| inputs(s)).collect();
        let target: Vec<f64> = shipments.iter().map(|s| s.transit_time).collect();

        let columns: Vec<Column> = (0..INPUTS)
            .map(|j| column_stats(raw.iter().map(move |x| x[j]), count))
            .collect();
        let y = column_stats(target.iter().copied(), count);

        let z: Vec<[f64; INPUTS]> = raw
            .iter()
            .map(|x| {
                let mut row = [0.0; INPUTS];
                for (j, col) in columns.iter().enumerate() {
                    if col.std > 0.0 {
                        row[j] = (x[j] - col.mean) / col.std;
                    }
                }
                row
            })
            .collect();

        let mut gram = [[0.0; INPUTS]; INPUTS];
        let mut moment = [0.0; INPUTS];
        for (row, t) in z.iter().zip(&target) {
            for i in 0..INPUTS {
                moment[i] += row[i] * (t - y.mean) / count;
                for j in 0..INPUTS {
                    gram[i][j] += row[i] * row[j] / count;
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            gram[i][i] += if col.std > 0.0 { self.ridge } else { 1.0 };
        }
        let coefficients = solve(gram, moment).unwrap_or([0.0; INPUTS]);

        let predicted: Vec<f64> = z
            .iter()
            .map(|row| y.mean + row.iter().zip(&coefficients).map(|(v, c)| v * c).sum::<f64>())
            .collect();

        let scores: BTreeMap<String, SignalScore> = shipments
            .iter()
            .zip(&predicted)
            .map(|(s, pred)| {
                let risk = if y.std > 0.0 {
                    logistic((pred - y.mean) / y.std)
                } else {
                    0.5
                };
                (
                    s.shipment_id.clone(),
                    SignalScore {
                        score: risk,
                        flagged: risk >= self.flag_threshold,
                    },
                )
            })
            .collect();

        let report = model_report(&coefficients, &predicted, &target, y.mean);
        SignalOutcome::Scored(SignalReport {
            scorer: ScorerKind::DelayRisk,
            scores,
            summary: SignalSummary::DelayRisk(report),
        })
    }
}

fn model_report(
    coefficients: &[f64; INPUTS],
    predicted: &[f64],
    target: &[f64],
    target_mean: f64,
) -> RiskModelReport {
    let count = usize_to_f64(target.len());
    let mass: f64 = coefficients.iter().map(|c| c.abs()).sum();
    let mut importance: Vec<FeatureImportance> = INPUT_NAMES
        .iter()
        .zip(coefficients)
        .map(|(name, c)| FeatureImportance {
            feature: (*name).to_string(),
            coefficient: *c,
            weight: if mass > 0.0 { c.abs() / mass } else { 0.0 },
        })
        .collect();
    importance.sort_by(|a, b| {
        b.coefficient
            .abs()
            .total_cmp(&a.coefficient.abs())
            .then_with(|| a.feature.cmp(&b.feature))
    });

    let (mut abs_err, mut sq_err, mut total) = (0.0, 0.0, 0.0);
    for (p, t) in predicted.iter().zip(target) {
        abs_err += (t - p).abs();
        sq_err += (t - p).powi(2);
        total += (t - target_mean).powi(2);
    }
    RiskModelReport {
        importance,
        mae: abs_err / count,
        rmse: (sq_err / count).sqrt(),
        r2: if total > 0.0 { 1.0 - sq_err / total } else { 0.0 },
    }
}
