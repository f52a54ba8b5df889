// Scan and resolve round-trip against a real Neo4j.
//
// Requirements: Docker (for Neo4j via testcontainers) OR `NEO4J_TEST_URI` env var.
//
// Run with: cargo test -p precog-engine --test scan_test

use precog_common::{PrecogError, Thresholds, Verdict};
use precog_engine::ScanEngine;
use precog_graph::{CitySynthesizer, GraphClient, SynthesisConfig, Trend};
use precog_model::ScoringBackend;

async fn seeded_city() -> (impl std::any::Any, GraphClient) {
    let (container, client) = precog_graph::testutil::neo4j_container().await;
    let config = SynthesisConfig {
        num_citizens: 10,
        num_locations: 2,
        seed: Some(41),
        ..SynthesisConfig::default()
    };
    let mut synth = CitySynthesizer::new(client.clone(), config);
    synth.generate().await.expect("city generation failed");
    (container, client)
}

fn engine(client: &GraphClient) -> ScanEngine {
    ScanEngine::new(
        client.clone(),
        ScoringBackend::Heuristic,
        Thresholds::default(),
        2026,
    )
}

#[tokio::test]
async fn scan_produces_a_classified_audited_report() {
    let (_container, client) = seeded_city().await;
    let engine = engine(&client);

    let report = engine.scan(0).await.expect("scan failed");
    assert_eq!(report.citizen_id, 0);
    assert!(!report.citizen_name.is_empty());
    assert!((0.0..=1.0).contains(&report.probability));
    assert!((0.0..=1.0).contains(&report.confidence));

    // verdict agrees with the default thresholds
    let expected = if report.probability >= 0.85 {
        Verdict::Intervene
    } else if report.probability >= 0.60 {
        Verdict::Watchlist
    } else {
        Verdict::Safe
    };
    assert_eq!(report.verdict, expected);

    // the scan landed in the audit trail
    let dossier = engine.dossier(0, 10, 30).await.expect("dossier failed");
    assert_eq!(dossier.records.len(), 1);
    assert_eq!(dossier.records[0].probability, report.probability);
    assert_eq!(dossier.trend, Trend::Stable);
}

#[tokio::test]
async fn unknown_subject_is_reported_not_scored() {
    let (_container, client) = seeded_city().await;
    let engine = engine(&client);

    let err = engine.scan(4242).await.unwrap_err();
    assert!(matches!(err, PrecogError::SubjectNotFound(4242)));

    // and nothing was appended for it
    let err = engine.dossier(4242, 10, 30).await.unwrap_err();
    assert!(matches!(err, PrecogError::SubjectNotFound(4242)));
}

#[tokio::test]
async fn resolve_distinguishes_its_failure_shapes() {
    let (_container, client) = seeded_city().await;
    let engine = engine(&client);

    // no scan yet: resolving an existing subject is a distinct failure
    let err = engine.resolve(3).await.unwrap_err();
    assert!(matches!(err, PrecogError::NoActiveIntervention(3)));

    let err = engine.resolve(4242).await.unwrap_err();
    assert!(matches!(err, PrecogError::SubjectNotFound(4242)));
}

#[tokio::test]
async fn repeated_scans_accumulate_history() {
    let (_container, client) = seeded_city().await;
    let engine = engine(&client);

    for _ in 0..3 {
        engine.scan(5).await.expect("scan failed");
    }
    let dossier = engine.dossier(5, 10, 30).await.expect("dossier failed");
    assert_eq!(dossier.records.len(), 3);
    assert!(dossier.rolling_average.is_some());
}
