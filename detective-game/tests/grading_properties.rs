use std::time::Duration;

use detective_game::{
    CorrectnessTier, GradingEngine, MatchedAssertion, MissionDefinition, MissionSpec, RecordStore,
    RootCause, ScoringEngine, SubmissionAttempt, ViolationKind,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::{Value, json};

fn acme_mission(alternatives: Value) -> MissionDefinition {
    let spec: MissionSpec = serde_json::from_value(json!({
        "mission_id": "acme",
        "title": "Acme",
        "dataset": "acme-backorders",
        "ground_truth": {"category": "supplier", "entity": "Acme"},
        "accepted_alternatives": alternatives,
        "hints": [
            {"hint_id": "h1", "reveals": {"kind": "category"}},
            {"hint_id": "h2", "reveals": {"kind": "focus_metric", "metric": "supplier_score"}},
            {"hint_id": "h3", "reveals": {"kind": "shortlist", "candidates": ["Acme", "Globex"]}}
        ]
    }))
    .unwrap();
    MissionDefinition::load(&spec).unwrap()
}

fn play(mission: &MissionDefinition, hypothesis: RootCause, hints: &[&str]) -> (CorrectnessTier, f64, u32) {
    let submission = SubmissionAttempt::new(
        "acme",
        hypothesis,
        hints.iter().copied(),
        Duration::from_secs(120),
    );
    let graded = GradingEngine::default().grade(&submission, mission).unwrap();
    let score = ScoringEngine::default()
        .score(&graded, &submission, mission)
        .unwrap();
    (graded.correctness_tier, graded.accuracy_score, score.final_score)
}

#[test]
fn scenario_a_exact_answer_scores_full_marks() {
    let mission = acme_mission(json!([]));
    let (tier, accuracy, score) = play(&mission, RootCause::supplier("Acme"), &[]);
    assert_eq!(tier, CorrectnessTier::Exact);
    assert!((accuracy - 1.0).abs() < f64::EPSILON);
    assert_eq!(score, 100);
}

#[test]
fn scenario_b_wrong_supplier_is_partial() {
    let mission = acme_mission(json!([]));
    let (tier, accuracy, score) = play(&mission, RootCause::supplier("Globex"), &[]);
    assert_eq!(tier, CorrectnessTier::Partial);
    assert!((accuracy - 0.5).abs() < f64::EPSILON);
    assert_eq!(score, 50);
}

#[test]
fn scenario_c_wrong_category_is_incorrect() {
    let mission = acme_mission(json!([]));
    let (tier, accuracy, score) = play(&mission, RootCause::warehouse("WH-02"), &[]);
    assert_eq!(tier, CorrectnessTier::Incorrect);
    assert!(accuracy.abs() < f64::EPSILON);
    assert_eq!(score, 0);
}

#[test]
fn scenario_d_three_hints_cost_thirty_points() {
    let mission = acme_mission(json!([]));
    let (tier, _, score) = play(&mission, RootCause::supplier("Acme"), &["h3", "h1", "h2"]);
    assert_eq!(tier, CorrectnessTier::Exact);
    assert_eq!(score, 70);
}

#[test]
fn scenario_e_negative_distance_rejects_the_whole_load() {
    let good = json!({
        "shipment_id": "S-1", "warehouse_id": "WH-1", "supplier": "Acme",
        "origin": "Reno", "destination": "Boise", "distance_km": 100,
        "expected_time": 0, "actual_time": 30, "cost": 10, "sku_count": 1,
        "traffic_index": 1.0
    });
    let mut bad = good.clone();
    bad["shipment_id"] = json!("S-2");
    bad["distance_km"] = json!(-4.5);

    let err = RecordStore::load(&[good, bad]).unwrap_err();
    assert_eq!(err.violations.len(), 1);
    let violation = &err.violations[0];
    assert_eq!(violation.shipment_id.as_deref(), Some("S-2"));
    assert_eq!(violation.field, "distance_km");
    assert_eq!(violation.kind, ViolationKind::Negative);
}

#[test]
fn exact_match_wins_even_when_alternatives_overlap() {
    let mission = acme_mission(json!([
        {"category": "supplier", "entity": "Acme"},
        {"category": "supplier", "entity": "Globex"}
    ]));
    let submission = SubmissionAttempt::new(
        "acme",
        RootCause::supplier("acme"),
        Vec::<String>::new(),
        Duration::ZERO,
    );
    let graded = GradingEngine::default().grade(&submission, &mission).unwrap();
    assert_eq!(graded.correctness_tier, CorrectnessTier::Exact);
    assert_eq!(graded.matched_assertion, Some(MatchedAssertion::GroundTruth));
}

#[test]
fn grading_is_idempotent_and_scores_never_negative() {
    let mission = acme_mission(json!([{"category": "route", "origin": "Reno", "destination": "Boise"}]));
    let candidates = [
        RootCause::supplier("Acme"),
        RootCause::supplier("Initech"),
        RootCause::warehouse("WH-09"),
        RootCause::route("Reno", "Boise"),
        RootCause::route("Reno", "Austin"),
    ];
    let hint_sets: [&[&str]; 4] = [&[], &["h1"], &["h1", "h2"], &["h1", "h2", "h3"]];
    let mut rng = ChaCha20Rng::seed_from_u64(0x5EED);
    let engine = GradingEngine::default();
    let scoring = ScoringEngine::default();
    for _ in 0..64 {
        let hypothesis = candidates[rng.gen_range(0..candidates.len())].clone();
        let hints = hint_sets[rng.gen_range(0..hint_sets.len())];
        let submission = SubmissionAttempt::new(
            "acme",
            hypothesis,
            hints.iter().copied(),
            Duration::from_millis(rng.gen_range(0..600_000)),
        );
        let first = engine.grade(&submission, &mission).unwrap();
        let second = engine.grade(&submission, &mission).unwrap();
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.accuracy_score));
        let a = scoring.score(&first, &submission, &mission).unwrap();
        let b = scoring.score(&second, &submission, &mission).unwrap();
        assert_eq!(a, b);
        assert!(a.final_score <= 100);
        assert_eq!(a.time_bonus, 0);
    }
}
