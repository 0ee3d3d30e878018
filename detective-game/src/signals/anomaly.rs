//! Isolation-forest anomaly scorer.
//!
//! Each tree isolates a random subsample by splitting on a random feature at
//! a uniform threshold between the sample's bounds. Outliers isolate in few
//! splits, so a short average path maps to a high score. Trees draw from a
//! `ChaCha20Rng` stream derived from the mission seed, which keeps flags
//! reproducible across runs and platforms.
use rand::{Rng, SeedableRng, seq::index};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    ScorerKind, SignalOutcome, SignalReport, SignalScore, SignalScorer, SignalSummary,
    require_records,
};
use crate::config::ScorerConfig;
use crate::constants::{ANOMALY_INSIGHT_TOP, ANOMALY_STREAM_DOMAIN, EULER_GAMMA};
use crate::features::{DerivedFeatures, ShipmentFeatures};
use crate::numbers::{ceil_f64_to_usize, ratio, usize_to_f64};
use crate::seed::derive_stream_seed;

const FEATURE_COUNT: usize = 4;
const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["transit_time", "cost", "traffic_index", "sku_count"];

type Point = [f64; FEATURE_COUNT];

fn point(shipment: &ShipmentFeatures) -> Point {
    [
        shipment.transit_time,
        shipment.cost,
        shipment.traffic_index,
        f64::from(shipment.sku_count),
    ]
}

/// Mean of one feature across the anomalous and the normal shipments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContrast {
    pub feature: String,
    pub anomalous_mean: f64,
    pub normal_mean: f64,
    /// `(anomalous - normal) / |normal|` as a percentage; 0 when normal is 0.
    pub percent_difference: f64,
}

/// Dataset-level view of what the anomaly scorer found.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyInsights {
    pub anomaly_count: usize,
    pub anomaly_percent: f64,
    pub contrasts: Vec<FeatureContrast>,
    /// Most anomalous shipment ids, highest score first.
    pub top_shipments: Vec<String>,
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average unsuccessful-search path length in a binary search tree of `n`
/// nodes; normalizes isolation depth.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = usize_to_f64(n);
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build(points: &[Point], sample: Vec<usize>, depth: usize, limit: usize, rng: &mut ChaCha20Rng) -> Node {
    if depth >= limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    let mut splittable: Vec<(usize, f64, f64)> = Vec::with_capacity(FEATURE_COUNT);
    for feature in 0..FEATURE_COUNT {
        let (min, max) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            (lo.min(points[i][feature]), hi.max(points[i][feature]))
        });
        if min < max {
            splittable.push((feature, min, max));
        }
    }
    if splittable.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) =
        sample.into_iter().partition(|&i| points[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(points, left, depth + 1, limit, rng)),
        right: Box::new(build(points, right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, point: &Point, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => usize_to_f64(depth) + average_path(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if point[*feature] <= *threshold { left } else { right };
            path_length(next, point, depth + 1)
        }
    }
}

/// Seeded isolation forest over transit time, cost, traffic and SKU count.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyScorer {
    min_records: usize,
    contamination: f64,
    trees: usize,
    sample_size: usize,
    stream_seed: u64,
}

impl AnomalyScorer {
    #[must_use]
    pub fn new(cfg: &ScorerConfig, mission_seed: u64) -> Self {
        Self {
            min_records: cfg.min_records,
            contamination: cfg.contamination,
            trees: cfg.trees.max(1),
            sample_size: cfg.sample_size.max(2),
            stream_seed: derive_stream_seed(mission_seed, ANOMALY_STREAM_DOMAIN),
        }
    }

    /// Score every point; higher is more anomalous, within (0, 1].
    fn forest_scores(&self, points: &[Point]) -> Vec<f64> {
        let n = points.len();
        let psi = self.sample_size.min(n);
        let limit = ceil_f64_to_usize(usize_to_f64(psi).log2());
        let mut rng = ChaCha20Rng::seed_from_u64(self.stream_seed);

        let forest: Vec<Node> = (0..self.trees)
            .map(|_| {
                let sample = index::sample(&mut rng, n, psi).into_vec();
                build(points, sample, 0, limit, &mut rng)
            })
            .collect();

        let norm = average_path(psi);
        let trees = usize_to_f64(forest.len());
        points
            .iter()
            .map(|p| {
                let mean = forest.iter().map(|tree| path_length(tree, p, 0)).sum::<f64>() / trees;
                if norm > 0.0 { 2f64.powf(-mean / norm) } else { 0.5 }
            })
            .collect()
    }

    fn flag_count(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        ceil_f64_to_usize(self.contamination * usize_to_f64(n)).clamp(1, n)
    }
}

impl SignalScorer for AnomalyScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Anomaly
    }

    fn score(&self, features: &DerivedFeatures) -> SignalOutcome {
        if let Err(err) = require_records(ScorerKind::Anomaly, features, self.min_records) {
            return SignalOutcome::NoSignal(err);
        }

        let shipments: Vec<&ShipmentFeatures> = features.shipments().values().collect();
        let points: Vec<Point> = shipments.iter().map(|s| point(s)).collect();
        let raw = self.forest_scores(&points);

        let mut ranked: Vec<usize> = (0..shipments.len()).collect();
        ranked.sort_by(|&a, &b| {
            raw[b]
                .total_cmp(&raw[a])
                .then_with(|| shipments[a].shipment_id.cmp(&shipments[b].shipment_id))
        });
        let flag_count = self.flag_count(shipments.len());
        let mut flagged = vec![false; shipments.len()];
        for &i in ranked.iter().take(flag_count) {
            flagged[i] = true;
        }

        let scores: BTreeMap<String, SignalScore> = shipments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                (
                    s.shipment_id.clone(),
                    SignalScore {
                        score: raw[i],
                        flagged: flagged[i],
                    },
                )
            })
            .collect();

        let insights = AnomalyInsights {
            anomaly_count: flag_count,
            anomaly_percent: ratio(usize_to_f64(flag_count), usize_to_f64(shipments.len())) * 100.0,
            contrasts: contrasts(&points, &flagged),
            top_shipments: ranked
                .iter()
                .take(ANOMALY_INSIGHT_TOP)
                .map(|&i| shipments[i].shipment_id.clone())
                .collect(),
        };

        SignalOutcome::Scored(SignalReport {
            scorer: ScorerKind::Anomaly,
            scores,
            summary: SignalSummary::Anomaly(insights),
        })
    }
}

fn contrasts(points: &[Point], flagged: &[bool]) -> Vec<FeatureContrast> {
    let anomalous = flagged.iter().filter(|f| **f).count();
    let normal = points.len() - anomalous;
    FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(feature, name)| {
            let (mut a_sum, mut n_sum) = (0.0, 0.0);
            for (p, is_anomaly) in points.iter().zip(flagged) {
                if *is_anomaly {
                    a_sum += p[feature];
                } else {
                    n_sum += p[feature];
                }
            }
            let anomalous_mean = ratio(a_sum, usize_to_f64(anomalous));
            let normal_mean = ratio(n_sum, usize_to_f64(normal));
            FeatureContrast {
                feature: (*name).to_string(),
                anomalous_mean,
                normal_mean,
                percent_difference: ratio(anomalous_mean - normal_mean, normal_mean.abs()) * 100.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::{features_from, varied_records};

    fn with_outlier() -> DerivedFeatures {
        let mut records = varied_records(24);
        let outlier = &mut records[7];
        outlier.actual_time = outlier.expected_time + 900.0;
        outlier.cost = 5_000.0;
        outlier.traffic_index = 9.5;
        outlier.sku_count = 60;
        features_from(records)
    }

    fn report(outcome: &SignalOutcome) -> &SignalReport {
        outcome.report().expect("scored")
    }

    #[test]
    fn extreme_shipment_ranks_first_and_is_flagged() {
        let features = with_outlier();
        let scorer = AnomalyScorer::new(&ScorerConfig::default(), 42);
        let outcome = scorer.score(&features);
        let report = report(&outcome);
        assert_eq!(report.flagged()[0], "S-007");
        assert!(report.score("S-007").unwrap().flagged);
        // ceil(0.1 * 24)
        assert_eq!(report.flagged().len(), 3);
        for score in report.scores.values() {
            assert!(score.score > 0.0 && score.score <= 1.0);
        }
    }

    #[test]
    fn same_seed_reproduces_identical_flags() {
        let features = with_outlier();
        let cfg = ScorerConfig::default();
        let a = AnomalyScorer::new(&cfg, 99).score(&features);
        let b = AnomalyScorer::new(&cfg, 99).score(&features);
        assert_eq!(a, b);
        let c = AnomalyScorer::new(&cfg, 100).score(&features);
        assert_ne!(report(&a).scores, report(&c).scores);
    }

    #[test]
    fn insights_contrast_anomalous_against_normal() {
        let features = with_outlier();
        let outcome = AnomalyScorer::new(&ScorerConfig::default(), 42).score(&features);
        let SignalSummary::Anomaly(insights) = &report(&outcome).summary else {
            panic!("anomaly summary expected");
        };
        assert_eq!(insights.anomaly_count, 3);
        assert!((insights.anomaly_percent - 12.5).abs() < 1e-9);
        assert_eq!(insights.top_shipments.len(), ANOMALY_INSIGHT_TOP);
        assert_eq!(insights.top_shipments[0], "S-007");
        let cost = insights
            .contrasts
            .iter()
            .find(|c| c.feature == "cost")
            .unwrap();
        assert!(cost.anomalous_mean > cost.normal_mean);
        assert!(cost.percent_difference > 100.0);
    }

    #[test]
    fn identical_points_share_one_score() {
        let mut records = varied_records(12);
        for record in &mut records {
            record.actual_time = record.expected_time + 5.0;
            record.cost = 100.0;
            record.traffic_index = 2.0;
            record.sku_count = 3;
        }
        let outcome = AnomalyScorer::new(&ScorerConfig::default(), 1).score(&features_from(records));
        let report = report(&outcome);
        let first = report.scores.values().next().unwrap().score;
        assert!(report.scores.values().all(|s| (s.score - first).abs() < f64::EPSILON));
        // Ties resolve by shipment id.
        assert_eq!(report.flagged(), vec!["S-000", "S-001"]);
    }

    #[test]
    fn path_normalizer_matches_known_values() {
        assert!(average_path(1).abs() < f64::EPSILON);
        assert!((average_path(2) - 1.0).abs() < f64::EPSILON);
        assert!((average_path(256) - 10.244_770_920_116_851).abs() < 1e-6);
    }
}
