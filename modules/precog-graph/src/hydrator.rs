use std::collections::HashMap;

use neo4rs::query;
use tracing::info;

use precog_common::{CrimeSummary, PrecogError};
use precog_model::GraphTensors;

use crate::GraphClient;

/// Width of one citizen's feature row.
pub const FEATURE_DIM: usize = 5;

const FALLBACK_AGE_YEARS: f64 = 30.0;

/// Normalized feature row. `criminal_influence` stays a raw count; the other
/// columns are clamped into [0, 1].
pub fn feature_row(
    current_year: i32,
    born: Option<i64>,
    knows_degree: i64,
    visits: i64,
    avg_env_exposure: f64,
    criminal_influence: i64,
) -> [f32; FEATURE_DIM] {
    let age = match born {
        Some(b) => (current_year as f64 - b as f64).max(0.0),
        None => FALLBACK_AGE_YEARS,
    };
    let age_norm = (age / 100.0).clamp(0.0, 1.0);
    let social = ((1.0 + knows_degree as f64).ln() / 5.0).clamp(0.0, 1.0);
    let routine = (visits as f64 / 20.0).clamp(0.0, 1.0);
    [
        age_norm as f32,
        social as f32,
        routine as f32,
        avg_env_exposure as f32,
        criminal_influence as f32,
    ]
}

/// One citizen's aggregates as they come back from the graph.
#[derive(Debug, Clone)]
pub struct CitizenAggregates {
    pub id: i64,
    pub born: Option<i64>,
    pub knows_degree: i64,
    pub visits: i64,
    pub avg_env_exposure: f64,
    pub criminal_influence: i64,
    pub label: u8,
}

/// Tensor bundle plus the id→row map it was built with. The map is the only
/// way scores get matched back to citizens, so it is built once and shared.
#[derive(Debug)]
pub struct HydratedGraph {
    pub tensors: GraphTensors,
    pub node_index: HashMap<i64, usize>,
}

/// Pure assembly step: rows + raw KNOWS pairs → tensors. Edges whose
/// endpoints are not in the row set are dropped.
pub fn assemble(
    current_year: i32,
    rows: &[CitizenAggregates],
    knows_pairs: &[(i64, i64)],
) -> Result<HydratedGraph, PrecogError> {
    if rows.is_empty() {
        return Err(PrecogError::Hydration(
            "no citizens in the graph, nothing to hydrate".into(),
        ));
    }

    let node_index: HashMap<i64, usize> =
        rows.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

    let mut features = Vec::with_capacity(rows.len() * FEATURE_DIM);
    let mut labels = Vec::with_capacity(rows.len());
    for r in rows {
        features.extend(feature_row(
            current_year,
            r.born,
            r.knows_degree,
            r.visits,
            r.avg_env_exposure,
            r.criminal_influence,
        ));
        labels.push(r.label);
    }

    let mut edge_sources = Vec::with_capacity(knows_pairs.len());
    let mut edge_targets = Vec::with_capacity(knows_pairs.len());
    for (from, to) in knows_pairs {
        if let (Some(&s), Some(&t)) = (node_index.get(from), node_index.get(to)) {
            edge_sources.push(s as u32);
            edge_targets.push(t as u32);
        }
    }

    let node_ids = rows.iter().map(|r| r.id).collect();
    let tensors = GraphTensors::new(
        node_ids,
        FEATURE_DIM,
        features,
        edge_sources,
        edge_targets,
        labels,
    )?;
    Ok(HydratedGraph { tensors, node_index })
}

/// Graph → tensor conversion. Reads the aggregates per citizen in ascending
/// id order so repeated runs over the same city produce identical row maps.
pub struct FeatureHydrator {
    client: GraphClient,
    current_year: i32,
}

impl FeatureHydrator {
    pub fn new(client: GraphClient, current_year: i32) -> Self {
        Self { client, current_year }
    }

    pub async fn hydrate(&self) -> Result<HydratedGraph, PrecogError> {
        let rows = self.fetch_aggregates().await.map_err(PrecogError::database)?;
        let pairs = self.fetch_knows_pairs().await.map_err(PrecogError::database)?;
        let hydrated = assemble(self.current_year, &rows, &pairs)?;
        info!(
            nodes = hydrated.tensors.num_nodes,
            edges = hydrated.tensors.edge_count(),
            "graph hydrated"
        );
        Ok(hydrated)
    }

    /// Feature row for a single subject, for the scan path. `None` when the
    /// citizen does not exist.
    pub async fn subject_features(
        &self,
        citizen_id: i64,
    ) -> Result<Option<[f32; FEATURE_DIM]>, PrecogError> {
        let q = query(
            "MATCH (c:Citizen {id: $cid})
             OPTIONAL MATCH (c)-[:KNOWS]-(friend:Citizen)
             WITH c, count(DISTINCT friend) AS knows
             OPTIONAL MATCH (c)-[:VISITS]->(l:Location)
             WITH c, knows, count(DISTINCT l) AS visits,
                  coalesce(avg(l.env_risk), 0.0) AS avg_env
             OPTIONAL MATCH (c)-[:KNOWS]-(criminal:Citizen)-[:COMMITTED_CRIME]->()
             RETURN c.born AS born, knows, visits, avg_env,
                    count(DISTINCT criminal) AS criminal_influence",
        )
        .param("cid", citizen_id);

        let mut stream = self
            .client
            .graph
            .execute(q)
            .await
            .map_err(PrecogError::database)?;
        match stream.next().await.map_err(PrecogError::database)? {
            Some(row) => Ok(Some(feature_row(
                self.current_year,
                row.get::<i64>("born").ok(),
                row.get("knows").unwrap_or(0),
                row.get("visits").unwrap_or(0),
                row.get("avg_env").unwrap_or(0.0),
                row.get("criminal_influence").unwrap_or(0),
            ))),
            None => Ok(None),
        }
    }

    /// Shape of the synthesized crime history: counts by crime type and
    /// location type, mean severity.
    pub async fn crime_patterns(&self) -> Result<CrimeSummary, PrecogError> {
        let by_type = self
            .grouped_counts("MATCH (cr:Crime) RETURN cr.crime_type AS key, count(cr) AS n")
            .await?;
        let by_location_type = self
            .grouped_counts(
                "MATCH (:Crime)-[:LOCATION_OF]->(l:Location)
                 RETURN l.loc_type AS key, count(*) AS n",
            )
            .await?;
        let total = by_type.values().sum();

        let q = query("MATCH (cr:Crime) RETURN coalesce(avg(cr.severity), 0.0) AS s");
        let mut stream = self
            .client
            .graph
            .execute(q)
            .await
            .map_err(PrecogError::database)?;
        let mean_severity = match stream.next().await.map_err(PrecogError::database)? {
            Some(row) => row.get("s").unwrap_or(0.0),
            None => 0.0,
        };

        Ok(CrimeSummary { total, by_type, by_location_type, mean_severity })
    }

    async fn fetch_aggregates(&self) -> Result<Vec<CitizenAggregates>, neo4rs::Error> {
        let q = query(
            "MATCH (c:Citizen)
             OPTIONAL MATCH (c)-[:KNOWS]-(friend:Citizen)
             WITH c, count(DISTINCT friend) AS knows
             OPTIONAL MATCH (c)-[:VISITS]->(l:Location)
             WITH c, knows, count(DISTINCT l) AS visits,
                  coalesce(avg(l.env_risk), 0.0) AS avg_env
             OPTIONAL MATCH (c)-[:KNOWS]-(criminal:Citizen)-[:COMMITTED_CRIME]->()
             WITH c, knows, visits, avg_env,
                  count(DISTINCT criminal) AS criminal_influence
             OPTIONAL MATCH (c)-[crime:COMMITTED_CRIME]->()
             RETURN c.id AS id, c.born AS born, knows, visits, avg_env,
                    criminal_influence,
                    CASE WHEN count(crime) > 0 THEN 1 ELSE 0 END AS label
             ORDER BY c.id",
        );

        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            out.push(CitizenAggregates {
                id: row.get("id").unwrap_or_default(),
                born: row.get::<i64>("born").ok(),
                knows_degree: row.get("knows").unwrap_or(0),
                visits: row.get("visits").unwrap_or(0),
                avg_env_exposure: row.get("avg_env").unwrap_or(0.0),
                criminal_influence: row.get("criminal_influence").unwrap_or(0),
                label: row.get::<i64>("label").unwrap_or(0) as u8,
            });
        }
        Ok(out)
    }

    async fn fetch_knows_pairs(&self) -> Result<Vec<(i64, i64)>, neo4rs::Error> {
        let q = query(
            "MATCH (a:Citizen)-[:KNOWS]->(b:Citizen)
             RETURN a.id AS src, b.id AS dst",
        );
        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            out.push((
                row.get("src").unwrap_or_default(),
                row.get("dst").unwrap_or_default(),
            ));
        }
        Ok(out)
    }

    async fn grouped_counts(
        &self,
        cypher: &str,
    ) -> Result<std::collections::BTreeMap<String, u64>, PrecogError> {
        let mut out = std::collections::BTreeMap::new();
        let mut stream = self
            .client
            .graph
            .execute(query(cypher))
            .await
            .map_err(PrecogError::database)?;
        while let Some(row) = stream.next().await.map_err(PrecogError::database)? {
            let key: String = row.get("key").unwrap_or_default();
            let n: i64 = row.get("n").unwrap_or(0);
            out.insert(key, n.max(0) as u64);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(id: i64) -> CitizenAggregates {
        CitizenAggregates {
            id,
            born: Some(1990),
            knows_degree: 0,
            visits: 0,
            avg_env_exposure: 0.0,
            criminal_influence: 0,
            label: 0,
        }
    }

    #[test]
    fn feature_row_normalizes_and_clamps() {
        let row = feature_row(2026, Some(1990), 0, 0, 0.35, 3);
        assert!((row[0] - 0.36).abs() < 1e-6);
        assert_eq!(row[1], 0.0);
        assert_eq!(row[2], 0.0);
        assert!((row[3] - 0.35).abs() < 1e-6);
        assert_eq!(row[4], 3.0);

        // 150-year-old with a huge network and routine still lands in [0,1]
        let row = feature_row(2026, Some(1876), 10_000, 500, 0.9, 12);
        assert_eq!(row[0], 1.0);
        assert_eq!(row[1], 1.0);
        assert_eq!(row[2], 1.0);
        assert_eq!(row[4], 12.0);
    }

    #[test]
    fn missing_birth_year_defaults_to_thirty() {
        let row = feature_row(2026, None, 0, 0, 0.0, 0);
        assert!((row[0] - 0.30).abs() < 1e-6);
    }

    #[test]
    fn node_index_is_a_bijection_over_input_ids() {
        let rows: Vec<_> = [7, 12, 99].into_iter().map(agg).collect();
        let h = assemble(2026, &rows, &[]).unwrap();

        assert_eq!(h.node_index.len(), rows.len());
        for (i, r) in rows.iter().enumerate() {
            assert_eq!(h.node_index[&r.id], i);
            assert_eq!(h.tensors.node_ids[i], r.id);
        }
    }

    #[test]
    fn knows_pairs_map_through_the_index() {
        let rows: Vec<_> = [10, 20, 30].into_iter().map(agg).collect();
        let h = assemble(2026, &rows, &[(10, 20), (30, 10)]).unwrap();

        assert_eq!(h.tensors.edge_sources, vec![0, 2]);
        assert_eq!(h.tensors.edge_targets, vec![1, 0]);
    }

    #[test]
    fn unknown_edge_endpoints_are_dropped() {
        let rows: Vec<_> = [1, 2].into_iter().map(agg).collect();
        let h = assemble(2026, &rows, &[(1, 2), (1, 999), (999, 2)]).unwrap();
        assert_eq!(h.tensors.edge_count(), 1);
    }

    #[test]
    fn empty_edge_set_yields_empty_index() {
        let rows: Vec<_> = [1, 2].into_iter().map(agg).collect();
        let h = assemble(2026, &rows, &[]).unwrap();
        assert_eq!(h.tensors.edge_count(), 0);
    }

    #[test]
    fn empty_citizen_set_is_an_error() {
        let err = assemble(2026, &[], &[]).unwrap_err();
        assert!(matches!(err, PrecogError::Hydration(_)));
    }
}
