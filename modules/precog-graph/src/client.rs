use neo4rs::{query, ConfigBuilder, Graph};

/// Thin wrapper around neo4rs::Graph providing connection setup and the
/// run-and-drain helper every write path uses.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given credentials.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(10)
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Execute a statement and drain its stream, discarding rows.
    pub(crate) async fn run(&self, q: neo4rs::Query) -> Result<(), neo4rs::Error> {
        let mut stream = self.graph.execute(q).await?;
        while stream.next().await?.is_some() {}
        Ok(())
    }

    /// Execute a `RETURN count(*) AS n`-shaped statement and read the count.
    pub(crate) async fn count(&self, cypher: &str) -> Result<i64, neo4rs::Error> {
        let mut stream = self.graph.execute(query(cypher)).await?;
        if let Some(row) = stream.next().await? {
            return Ok(row.get("n").unwrap_or(0));
        }
        Ok(0)
    }
}
