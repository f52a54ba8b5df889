use neo4rs::{query, BoltFloat, BoltInteger, BoltMap, BoltString, BoltType};
use tracing::{info, warn};
use uuid::Uuid;

use precog_common::{Citizen, Frequency, Location};

use crate::GraphClient;

/// Write-side wrapper for the graph. Owns constraint setup, the wipe used
/// before regeneration, and the batched UNWIND upserts the synthesizer
/// feeds. A failed batch aborts the whole write; there is no partial resume.
pub struct GraphWriter {
    client: GraphClient,
}

/// One synthesized crime, staged for a batch write.
#[derive(Debug, Clone)]
pub struct CrimeSeed {
    pub id: Uuid,
    pub citizen_id: i64,
    pub location_id: String,
    pub crime_type: String,
    pub severity: i64,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub description: String,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Create uniqueness constraints and the risk index. Best-effort
    /// idempotent: an "already exists" failure is logged and skipped.
    pub async fn ensure_constraints(&self) -> Result<(), neo4rs::Error> {
        let statements = [
            "CREATE CONSTRAINT citizen_id IF NOT EXISTS FOR (c:Citizen) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT location_id IF NOT EXISTS FOR (l:Location) REQUIRE l.id IS UNIQUE",
            "CREATE CONSTRAINT crime_id IF NOT EXISTS FOR (cr:Crime) REQUIRE cr.id IS UNIQUE",
            "CREATE CONSTRAINT prediction_id IF NOT EXISTS FOR (p:Prediction) REQUIRE p.id IS UNIQUE",
            "CREATE INDEX citizen_risk IF NOT EXISTS FOR (c:Citizen) ON (c.risk_seed)",
            "CREATE INDEX prediction_subject IF NOT EXISTS FOR (p:Prediction) ON (p.citizen_id)",
        ];
        for stmt in statements {
            if let Err(e) = self.client.run(query(stmt)).await {
                warn!(error = %e, "Constraint setup skipped (likely already exists)");
            }
        }
        info!("Constraints and indexes ensured");
        Ok(())
    }

    /// Wipe the whole city. Callers regenerate from scratch after any failed
    /// synthesis run.
    pub async fn clear_city(&self) -> Result<(), neo4rs::Error> {
        self.client.run(query("MATCH (n) DETACH DELETE n")).await?;
        info!("Graph cleared");
        Ok(())
    }

    pub async fn insert_locations(
        &self,
        locations: &[Location],
        batch_size: usize,
    ) -> Result<(), neo4rs::Error> {
        let rows: Vec<BoltType> = locations
            .iter()
            .map(|l| {
                bolt_map(vec![
                    ("id", bolt_str(&l.id)),
                    ("name", bolt_str(&l.name)),
                    ("loc_type", bolt_str(&l.loc_type)),
                    ("env_risk", bolt_float(l.env_risk)),
                    ("lat", bolt_float(l.lat)),
                    ("lng", bolt_float(l.lng)),
                ])
            })
            .collect();

        self.run_batched(
            "UNWIND $batch AS row
             MERGE (l:Location {id: row.id})
             SET l.name = row.name, l.loc_type = row.loc_type,
                 l.env_risk = row.env_risk, l.lat = row.lat, l.lng = row.lng",
            rows,
            batch_size,
        )
        .await?;
        info!(count = locations.len(), "Locations written");
        Ok(())
    }

    pub async fn insert_citizens(
        &self,
        citizens: &[Citizen],
        batch_size: usize,
    ) -> Result<(), neo4rs::Error> {
        let rows: Vec<BoltType> = citizens
            .iter()
            .map(|c| {
                bolt_map(vec![
                    ("id", bolt_int(c.id)),
                    ("name", bolt_str(&c.name)),
                    ("born", bolt_int(c.born as i64)),
                    ("risk_seed", bolt_float(c.risk_seed)),
                    ("job", bolt_str(&c.job)),
                    ("address", bolt_str(&c.address)),
                    ("status", bolt_str(&c.status.to_string())),
                ])
            })
            .collect();

        self.run_batched(
            "UNWIND $batch AS row
             MERGE (c:Citizen {id: row.id})
             SET c.name = row.name, c.born = row.born,
                 c.risk_seed = row.risk_seed, c.job = row.job,
                 c.address = row.address, c.status = row.status",
            rows,
            batch_size,
        )
        .await?;
        info!(count = citizens.len(), "Citizens written");
        Ok(())
    }

    /// KNOWS edges are directional and deliberately NOT deduplicated:
    /// repeated generator runs may stack duplicates.
    pub async fn insert_knows(
        &self,
        edges: &[(i64, i64, i64)],
        batch_size: usize,
    ) -> Result<(), neo4rs::Error> {
        let rows: Vec<BoltType> = edges
            .iter()
            .map(|(from, to, since)| {
                bolt_map(vec![
                    ("p1", bolt_int(*from)),
                    ("p2", bolt_int(*to)),
                    ("since", bolt_int(*since)),
                ])
            })
            .collect();

        self.run_batched(
            "UNWIND $batch AS row
             MATCH (a:Citizen {id: row.p1}), (b:Citizen {id: row.p2})
             CREATE (a)-[:KNOWS {since: row.since}]->(b)",
            rows,
            batch_size,
        )
        .await?;
        info!(count = edges.len(), "KNOWS edges written");
        Ok(())
    }

    pub async fn insert_visits(
        &self,
        visits: &[(i64, String, Frequency)],
        batch_size: usize,
    ) -> Result<(), neo4rs::Error> {
        let rows: Vec<BoltType> = visits
            .iter()
            .map(|(cid, lid, freq)| {
                bolt_map(vec![
                    ("cid", bolt_int(*cid)),
                    ("lid", bolt_str(lid)),
                    ("frequency", bolt_str(&freq.to_string())),
                ])
            })
            .collect();

        self.run_batched(
            "UNWIND $batch AS row
             MATCH (c:Citizen {id: row.cid})
             MATCH (l:Location {id: row.lid})
             CREATE (c)-[:VISITS {frequency: row.frequency}]->(l)",
            rows,
            batch_size,
        )
        .await?;
        info!(count = visits.len(), "VISITS edges written");
        Ok(())
    }

    /// Write crimes as first-class nodes with PERPETRATOR_OF / LOCATION_OF
    /// edges, plus the denormalized COMMITTED_CRIME shortcut that degree and
    /// label queries read.
    pub async fn insert_crimes(
        &self,
        crimes: &[CrimeSeed],
        batch_size: usize,
    ) -> Result<(), neo4rs::Error> {
        let rows: Vec<BoltType> = crimes
            .iter()
            .map(|cr| {
                bolt_map(vec![
                    ("id", bolt_str(&cr.id.to_string())),
                    ("cid", bolt_int(cr.citizen_id)),
                    ("lid", bolt_str(&cr.location_id)),
                    ("crime_type", bolt_str(&cr.crime_type)),
                    ("severity", bolt_int(cr.severity)),
                    ("date", bolt_str(&cr.date)),
                    ("description", bolt_str(&cr.description)),
                ])
            })
            .collect();

        self.run_batched(
            "UNWIND $batch AS row
             MATCH (c:Citizen {id: row.cid})
             MATCH (l:Location {id: row.lid})
             CREATE (cr:Crime {
                 id: row.id,
                 crime_type: row.crime_type,
                 severity: row.severity,
                 date: row.date,
                 description: row.description,
                 investigated: false
             })
             CREATE (c)-[:PERPETRATOR_OF]->(cr)
             CREATE (cr)-[:LOCATION_OF]->(l)
             CREATE (c)-[:COMMITTED_CRIME {
                 date: row.date, crime_type: row.crime_type, severity: row.severity
             }]->(l)",
            rows,
            batch_size,
        )
        .await?;
        info!(count = crimes.len(), "Crimes written");
        Ok(())
    }

    /// Flip the one mutable flag a Crime carries.
    pub async fn mark_crime_investigated(&self, crime_id: Uuid) -> Result<bool, neo4rs::Error> {
        let q = query(
            "MATCH (cr:Crime {id: $id})
             SET cr.investigated = true
             RETURN count(cr) AS n",
        )
        .param("id", crime_id.to_string());
        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            return Ok(row.get::<i64>("n").unwrap_or(0) > 0);
        }
        Ok(false)
    }

    /// Chunk rows and run the statement per chunk. The first failed chunk
    /// aborts; the run is not resumable.
    async fn run_batched(
        &self,
        cypher: &str,
        rows: Vec<BoltType>,
        batch_size: usize,
    ) -> Result<(), neo4rs::Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch_size = batch_size.max(1);
        for chunk in rows.chunks(batch_size) {
            let q = query(cypher).param("batch", chunk.to_vec());
            self.client.run(q).await?;
        }
        Ok(())
    }
}

// --- Bolt parameter helpers ---

fn bolt_str(s: &str) -> BoltType {
    BoltType::String(BoltString::from(s))
}

fn bolt_int(i: i64) -> BoltType {
    BoltType::Integer(BoltInteger::new(i))
}

fn bolt_float(f: f64) -> BoltType {
    BoltType::Float(BoltFloat::new(f))
}

fn bolt_map(entries: Vec<(&str, BoltType)>) -> BoltType {
    BoltType::Map(BoltMap::from_iter(
        entries
            .into_iter()
            .map(|(k, v)| (BoltString::from(k), v)),
    ))
}
