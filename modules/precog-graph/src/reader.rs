use neo4rs::query;
use tracing::info;

use precog_common::{CitizenStatus, SubjectProfile};

use crate::GraphClient;

/// Read-side wrapper for the graph. Maps rows into typed records and runs
/// the aggregate/enrichment queries the scan pipeline needs.
pub struct GraphReader {
    client: GraphClient,
}

impl GraphReader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Load one citizen enriched with derived network counts. Both
    /// `social_network_size` and `criminal_degree` are computed at read time
    /// over the undirected KNOWS neighborhood; neither is stored
    /// authoritatively.
    pub async fn subject_profile(
        &self,
        citizen_id: i64,
    ) -> Result<Option<SubjectProfile>, neo4rs::Error> {
        let q = query(
            "MATCH (c:Citizen {id: $cid})
             OPTIONAL MATCH (c)-[:KNOWS]-(friend:Citizen)
             WITH c, count(DISTINCT friend) AS social_network_size
             OPTIONAL MATCH (c)-[:KNOWS]-(criminal:Citizen)-[:COMMITTED_CRIME]->()
             WITH c, social_network_size, count(DISTINCT criminal) AS criminal_degree
             RETURN c.id AS id, c.name AS name, c.born AS born, c.job AS job,
                    c.status AS status, c.risk_seed AS risk_seed,
                    social_network_size, criminal_degree",
        )
        .param("cid", citizen_id);

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            let status: String = row.get("status").unwrap_or_default();
            return Ok(Some(SubjectProfile {
                id: row.get("id").unwrap_or(citizen_id),
                name: row.get("name").unwrap_or_default(),
                born: row.get::<i64>("born").ok().map(|y| y as i32),
                job: row.get::<String>("job").ok(),
                status: CitizenStatus::parse(&status).unwrap_or(CitizenStatus::Active),
                risk_seed: row.get("risk_seed").unwrap_or(0.0),
                social_network_size: row.get("social_network_size").unwrap_or(0),
                criminal_degree: row.get("criminal_degree").unwrap_or(0),
            }));
        }
        Ok(None)
    }

    pub async fn citizen_exists(&self, citizen_id: i64) -> Result<bool, neo4rs::Error> {
        let q = query("MATCH (c:Citizen {id: $cid}) RETURN count(c) AS n").param("cid", citizen_id);
        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            return Ok(row.get::<i64>("n").unwrap_or(0) > 0);
        }
        Ok(false)
    }

    /// Persist each citizen's criminal_degree as a cached property. The scan
    /// path recomputes it live; this cache only feeds offline inspection.
    pub async fn persist_criminal_degree(&self) -> Result<i64, neo4rs::Error> {
        let q = query(
            "MATCH (c:Citizen)
             OPTIONAL MATCH (c)-[:KNOWS]-(friend:Citizen)-[:COMMITTED_CRIME]->()
             WITH c, count(DISTINCT friend) AS criminal_friends
             SET c.criminal_degree = criminal_friends
             RETURN count(c) AS n",
        );
        let mut stream = self.client.graph.execute(q).await?;
        let updated = match stream.next().await? {
            Some(row) => row.get("n").unwrap_or(0),
            None => 0,
        };
        info!(updated, "criminal_degree cached on citizen nodes");
        Ok(updated)
    }

    /// Citizens whose hidden seed exceeds the threshold. Offline inspection
    /// only; never part of a scan response.
    pub async fn high_risk_citizen_ids(
        &self,
        threshold: f64,
    ) -> Result<Vec<(i64, f64)>, neo4rs::Error> {
        let q = query(
            "MATCH (c:Citizen)
             WHERE c.risk_seed > $threshold
             RETURN c.id AS id, c.risk_seed AS risk
             ORDER BY c.risk_seed DESC",
        )
        .param("threshold", threshold);

        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            out.push((
                row.get("id").unwrap_or_default(),
                row.get("risk").unwrap_or(0.0),
            ));
        }
        Ok(out)
    }

    /// All citizen ids, ascending. Drives bulk offline scoring.
    pub async fn citizen_ids(&self) -> Result<Vec<i64>, neo4rs::Error> {
        let q = query("MATCH (c:Citizen) RETURN c.id AS id ORDER BY c.id");
        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            out.push(row.get("id").unwrap_or_default());
        }
        Ok(out)
    }
}
