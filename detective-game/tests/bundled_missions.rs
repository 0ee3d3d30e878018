use std::collections::BTreeSet;
use std::time::Duration;

use detective_game::{
    CorrectnessTier, EmbeddedLoader, EvidenceSubject, FocusMetric, HintDetail,
    HintReveal, MissionEngine, MissionSession, PerformanceRating, RootCause, ScorerKind,
    SignalOutcome,
};

fn engine() -> MissionEngine<EmbeddedLoader> {
    MissionEngine::new(EmbeddedLoader::new()).unwrap()
}

fn session(mission_id: &str) -> MissionSession {
    engine().load_mission(mission_id).unwrap()
}

fn ranking(session: &MissionSession, hint_id: &str) -> Vec<(String, f64)> {
    match session.request_hint(hint_id).unwrap().detail {
        HintDetail::Ranking { rows, .. } => rows.into_iter().map(|r| (r.label, r.value)).collect(),
        other => panic!("expected ranking, got {other:?}"),
    }
}

#[test]
fn catalog_lists_bundled_missions_in_order() {
    let engine = engine();
    let ids: Vec<String> = engine
        .catalog()
        .list()
        .into_iter()
        .map(|m| m.mission_id)
        .collect();
    assert_eq!(ids, vec!["acme-backorders", "wh04-overload", "i80-gridlock"]);
    assert!(engine.catalog().list().iter().all(|m| m.hint_count == 3));
}

#[test]
fn acme_backorders_points_at_acme_freight() {
    let session = session("acme-backorders");
    assert_eq!(session.store().len(), 40);
    assert_eq!(
        session.request_hint("category").unwrap().reveal,
        HintReveal::Category {
            category: detective_game::CauseCategory::Supplier
        }
    );
    let rows = ranking(&session, "reliability");
    assert_eq!(rows[0].0, "Acme Freight");
    assert!(rows.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(
        session.request_hint("shortlist").unwrap().reveal,
        HintReveal::Shortlist {
            candidates: vec!["Acme Freight".into(), "Initech Supply".into()]
        }
    );

    let outcome = session
        .submit(
            RootCause::supplier("acme freight"),
            ["category", "reliability", "shortlist"],
            Duration::from_secs(300),
        )
        .unwrap();
    assert_eq!(outcome.graded.correctness_tier, CorrectnessTier::Exact);
    assert_eq!(outcome.score.hint_penalty, 30);
    assert_eq!(outcome.score.final_score, 70);
    assert_eq!(outcome.score.rating, PerformanceRating::Good);
    let note = &outcome.graded.evidence[0];
    assert_eq!(note.subject, EvidenceSubject::Submitted);
    assert_eq!(note.metric, FocusMetric::SupplierScore);
    assert!(note.value.unwrap() < 0.3);
}

#[test]
fn wh04_overload_accepts_the_lane_alternative() {
    let session = session("wh04-overload");
    let rows = ranking(&session, "load");
    assert_eq!(rows[0].0, "WH-04");

    let outliers = session.request_hint("outliers").unwrap();
    assert_eq!(outliers.cost, 10);
    match outliers.detail {
        HintDetail::Flagged {
            scorer,
            shipment_ids,
        } => {
            assert_eq!(scorer, ScorerKind::Anomaly);
            // ceil(0.1 * 42)
            assert_eq!(shipment_ids.len(), 5);
            for id in &shipment_ids {
                assert!(session.store().get(id).is_some());
            }
        }
        other => panic!("expected flagged shipments, got {other:?}"),
    }

    let lane = session
        .submit(
            RootCause::route("Sacramento", "Denver"),
            ["outliers"],
            Duration::from_secs(600),
        )
        .unwrap();
    assert_eq!(lane.graded.correctness_tier, CorrectnessTier::Exact);
    assert_eq!(lane.score.final_score, 90);

    let other_dock = session
        .submit(RootCause::warehouse("WH-01"), Vec::<String>::new(), Duration::ZERO)
        .unwrap();
    assert_eq!(other_dock.graded.correctness_tier, CorrectnessTier::Partial);
    assert_eq!(other_dock.score.final_score, 50);
}

#[test]
fn i80_gridlock_ranks_the_blocked_lane_first() {
    let session = session("i80-gridlock");
    assert_eq!(
        session.request_hint("origin").unwrap().reveal,
        HintReveal::RouteOrigin {
            origin: "Chicago".into()
        }
    );
    let rows = ranking(&session, "lanes");
    assert_eq!(rows[0].0, "Chicago -> Denver");
    assert!((rows[0].1 - 1.0).abs() < f64::EPSILON);

    match session.request_hint("risk").unwrap().detail {
        HintDetail::Flagged { scorer, .. } => assert_eq!(scorer, ScorerKind::DelayRisk),
        other => panic!("expected flagged shipments, got {other:?}"),
    }

    let used: BTreeSet<String> = ["origin".to_string()].into();
    assert_eq!(session.available_hints(&used), vec!["risk", "lanes"]);

    let skipped = session.submit(
        RootCause::route("Chicago", "Denver"),
        ["lanes"],
        Duration::ZERO,
    );
    assert!(skipped.is_err());

    let supplier = session
        .submit(
            RootCause::supplier("Globex Logistics"),
            Vec::<String>::new(),
            Duration::ZERO,
        )
        .unwrap();
    assert_eq!(supplier.graded.correctness_tier, CorrectnessTier::Exact);
    assert_eq!(supplier.score.final_score, 100);
}

#[test]
fn loading_twice_reproduces_features_and_signals() {
    let engine = engine();
    for summary in engine.catalog().list() {
        let first = engine.load_mission(&summary.mission_id).unwrap();
        let second = engine.load_mission(&summary.mission_id).unwrap();
        assert_eq!(first.features().fingerprint(), second.features().fingerprint());
        assert_eq!(first.kpis(), second.kpis());
        assert_eq!(first.signals(), second.signals());
        for kind in ScorerKind::ALL {
            assert!(matches!(
                first.signals().get(kind),
                Some(SignalOutcome::Scored(_))
            ));
        }
    }
}

#[test]
fn final_score_is_accuracy_minus_ten_per_hint() {
    let engine = engine();
    for summary in engine.catalog().list() {
        let session = engine.load_mission(&summary.mission_id).unwrap();
        let mission = session.mission();
        assert!(mission.hints().iter().all(|h| h.cost() == 10));

        let truth = mission.ground_truth().clone();
        let mut used: Vec<String> = Vec::new();
        loop {
            let outcome = session
                .submit(truth.clone(), used.clone(), Duration::ZERO)
                .unwrap();
            let expected = (100.0 * outcome.graded.accuracy_score).round() as u32;
            let expected = expected.saturating_sub(10 * used.len() as u32);
            assert_eq!(
                outcome.score.final_score, expected,
                "{} with hints {used:?}",
                summary.mission_id
            );
            let taken: BTreeSet<String> = used.iter().cloned().collect();
            let Some(next) = session.available_hints(&taken).into_iter().next() else {
                break;
            };
            used.push(next);
        }
        assert_eq!(used.len(), summary.hint_count);
    }
}

#[test]
fn kpis_summarize_the_backlog() {
    let session = session("wh04-overload");
    let kpis = session.kpis();
    assert_eq!(kpis.total_shipments, 42);
    assert!(kpis.late_shipments >= 14);
    assert!(kpis.percent_delayed > 30.0);
    assert!(kpis.average_delay_minutes > 0.0);
    assert_eq!(kpis.supplier_reliability.len(), 4);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn concurrent_signals_match_lazy_signals() {
    let engine = engine();
    let eager = engine.load_mission_async("i80-gridlock").await.unwrap();
    let lazy = engine.load_mission("i80-gridlock").unwrap();
    assert_eq!(eager.signals(), lazy.signals());
}
