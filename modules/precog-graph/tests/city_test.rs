#![cfg(feature = "test-utils")]

// End-to-end city tests against a real Neo4j.
//
// Requirements: Docker (for Neo4j via testcontainers) OR `NEO4J_TEST_URI` env var.
//
// Run with: cargo test -p precog-graph --features test-utils --test city_test

use chrono::Utc;
use uuid::Uuid;

use precog_common::{
    PredictionRecord, PredictionStatus, ScoreMethod, Verdict, HIGH_RISK_SEED,
};
use precog_graph::{
    query, CitySynthesizer, FeatureHydrator, GraphClient, GraphReader, PredictionAuditor,
    ResolveOutcome, SynthesisConfig,
};

const SEED: u64 = 20260827;

fn small_config() -> SynthesisConfig {
    SynthesisConfig {
        num_citizens: 10,
        num_locations: 2,
        node_batch_size: 500,
        edge_batch_size: 1000,
        seed: Some(SEED),
    }
}

async fn generate(client: &GraphClient) -> precog_graph::CityStats {
    let mut synth = CitySynthesizer::new(client.clone(), small_config());
    synth.generate().await.expect("city generation failed")
}

fn intervene_record(citizen_id: i64) -> PredictionRecord {
    PredictionRecord {
        id: Uuid::new_v4(),
        citizen_id,
        probability: 0.92,
        confidence: 0.84,
        verdict: Verdict::Intervene,
        method: ScoreMethod::Heuristic,
        timestamp: Utc::now(),
        status: PredictionStatus::Active,
        resolved_at: None,
    }
}

#[tokio::test]
async fn seeded_generation_is_deterministic_and_consistent() {
    let (_container, client) = precog_graph::testutil::neo4j_container().await;

    let first = generate(&client).await;
    assert_eq!(first.citizens, 10);
    assert_eq!(first.locations, 2);

    // same seed, same city
    let second = generate(&client).await;
    assert_eq!(second.citizens, first.citizens);
    assert_eq!(second.social_links, first.social_links);
    assert_eq!(second.routines, first.routines);
    assert_eq!(second.crimes, first.crimes);

    // every KNOWS endpoint must be a citizen that exists
    let q = query(
        "MATCH (a)-[:KNOWS]->(b)
         WHERE NOT (a:Citizen) OR NOT (b:Citizen)
         RETURN count(*) AS n",
    );
    let mut stream = client.inner().execute(q).await.expect("query failed");
    let dangling: i64 = stream
        .next()
        .await
        .expect("stream failed")
        .map(|row| row.get("n").unwrap_or(0))
        .unwrap_or(0);
    assert_eq!(dangling, 0);

    // crimes exist exactly when some citizen carries a high risk seed
    let reader = GraphReader::new(client.clone());
    let high_risk = reader
        .high_risk_citizen_ids(HIGH_RISK_SEED)
        .await
        .expect("risk query failed");
    assert_eq!(second.crimes > 0, !high_risk.is_empty());
}

#[tokio::test]
async fn hydration_maps_every_citizen_exactly_once() {
    let (_container, client) = precog_graph::testutil::neo4j_container().await;
    generate(&client).await;

    let hydrator = FeatureHydrator::new(client.clone(), 2026);
    let hydrated = hydrator.hydrate().await.expect("hydration failed");

    assert_eq!(hydrated.tensors.num_nodes, 10);
    assert_eq!(hydrated.node_index.len(), 10);
    for (i, id) in hydrated.tensors.node_ids.iter().enumerate() {
        assert_eq!(hydrated.node_index[id], i);
    }

    // feature rows are finite and the normalized columns stay in [0, 1]
    for i in 0..hydrated.tensors.num_nodes {
        let row = hydrated.tensors.row(i);
        assert!(row.iter().all(|v| v.is_finite()));
        for &v in &row[..4] {
            assert!((0.0..=1.0).contains(&v), "column out of range: {v}");
        }
    }
}

#[tokio::test]
async fn resolve_round_trip_and_isolation() {
    let (_container, client) = precog_graph::testutil::neo4j_container().await;
    generate(&client).await;

    let auditor = PredictionAuditor::new(client.clone());

    // two subjects flagged independently
    assert!(auditor.record_prediction(&intervene_record(0)).await.unwrap());
    assert!(auditor.record_prediction(&intervene_record(1)).await.unwrap());

    let active = auditor.active_interventions().await.unwrap();
    assert_eq!(active.len(), 2);

    let outcome = auditor.resolve(0, Utc::now()).await.unwrap();
    assert_eq!(outcome, ResolveOutcome::Resolved { updated: 1 });

    // double resolve reports the distinct empty case
    let outcome = auditor.resolve(0, Utc::now()).await.unwrap();
    assert_eq!(outcome, ResolveOutcome::NoActiveIntervention);

    // the other subject's record is untouched
    let active = auditor.active_interventions().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].citizen_id, 1);

    // unknown subjects are their own failure shape
    let outcome = auditor.resolve(9999, Utc::now()).await.unwrap();
    assert_eq!(outcome, ResolveOutcome::SubjectNotFound);

    // the resolved record survives in history with its transition stamped
    let history = auditor.history(0, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PredictionStatus::Resolved);
    assert!(history[0].resolved_at.is_some());
}

#[tokio::test]
async fn investigated_flag_is_the_only_crime_mutation() {
    let (_container, client) = precog_graph::testutil::neo4j_container().await;
    let stats = generate(&client).await;
    if stats.crimes == 0 {
        return;
    }

    let q = query("MATCH (cr:Crime) RETURN cr.id AS id LIMIT 1");
    let mut stream = client.inner().execute(q).await.expect("query failed");
    let id: String = stream
        .next()
        .await
        .expect("stream failed")
        .map(|row| row.get("id").unwrap_or_default())
        .unwrap_or_default();
    let crime_id = Uuid::parse_str(&id).expect("crime id is a uuid");

    let writer = precog_graph::GraphWriter::new(client.clone());
    assert!(writer.mark_crime_investigated(crime_id).await.unwrap());
    assert!(!writer.mark_crime_investigated(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn repeated_scans_append_rather_than_update() {
    let (_container, client) = precog_graph::testutil::neo4j_container().await;
    generate(&client).await;

    let auditor = PredictionAuditor::new(client.clone());
    for _ in 0..3 {
        auditor.record_prediction(&intervene_record(2)).await.unwrap();
    }

    let history = auditor.history(2, 10).await.unwrap();
    assert_eq!(history.len(), 3);

    let counts = auditor.verdict_counts(1, Utc::now()).await.unwrap();
    assert_eq!(counts.get("INTERVENE"), Some(&3));

    let avg = auditor.rolling_average(2, 1, Utc::now()).await.unwrap();
    assert!(avg.is_some());
    assert!((avg.unwrap() - 0.92).abs() < 1e-9);
}
