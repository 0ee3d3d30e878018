//! Mission-level KPI summary shown on the investigation dashboard.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::features::DerivedFeatures;
use crate::numbers::{ratio, usize_to_f64};

/// Headline numbers for one mission dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_shipments: usize,
    /// Shipments that arrived late (the order backlog).
    pub late_shipments: usize,
    pub percent_delayed: f64,
    /// Mean lateness in minutes among late shipments.
    pub average_delay_minutes: f64,
    pub cost_delay_correlation: f64,
    /// On-time percentage per supplier.
    pub supplier_reliability: BTreeMap<String, f64>,
}

impl KpiSummary {
    #[must_use]
    pub fn summarize(features: &DerivedFeatures) -> Self {
        let shipments = features.shipments();
        let total = shipments.len();
        let late: Vec<f64> = shipments
            .values()
            .filter(|s| s.delay_flag)
            .map(|s| s.transit_time)
            .collect();
        let costs: Vec<f64> = shipments.values().map(|s| s.cost).collect();
        let delays: Vec<f64> = shipments.values().map(|s| s.delay_minutes()).collect();

        let supplier_reliability = features
            .suppliers()
            .iter()
            .map(|(name, stats)| (name.clone(), (1.0 - stats.delay_rate) * 100.0))
            .collect();

        Self {
            total_shipments: total,
            late_shipments: late.len(),
            percent_delayed: ratio(usize_to_f64(late.len()), usize_to_f64(total)) * 100.0,
            average_delay_minutes: ratio(late.iter().sum(), usize_to_f64(late.len())),
            cost_delay_correlation: pearson(&costs, &delays),
            supplier_reliability,
        }
    }
}

/// Pearson correlation; 0 when fewer than two pairs or either side is flat.
#[must_use]
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let count = usize_to_f64(n);
    let mean_x = xs[..n].iter().sum::<f64>() / count;
    let mean_y = ys[..n].iter().sum::<f64>() / count;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}
