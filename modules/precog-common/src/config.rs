use std::env;

use crate::error::PrecogError;
use crate::verdict::Thresholds;

/// Application configuration loaded from environment variables.
/// Every knob has a default so a local run against a stock Neo4j works
/// without any setup.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // Artifacts
    pub model_path: String,
    pub data_path: String,

    // Verdict thresholds
    pub thresholds: Thresholds,

    // Feature engineering
    pub current_year: i32,

    // Synthesizer
    pub num_citizens: usize,
    pub num_locations: usize,
    pub node_batch_size: usize,
    pub edge_batch_size: usize,
    pub seed: Option<u64>,

    // Training
    pub epochs: usize,
    pub hidden_dim: usize,
    pub learning_rate_g: f32,
    pub learning_rate_d: f32,
}

impl Config {
    pub fn from_env() -> Result<Self, PrecogError> {
        let thresholds = Thresholds::new(
            parsed_env("RISK_THRESHOLD_WATCHLIST", 0.60)?,
            parsed_env("RISK_THRESHOLD_INTERVENE", 0.85)?,
        )?;

        Ok(Self {
            neo4j_uri: env_or("NEO4J_URI", "bolt://localhost:7687"),
            neo4j_user: env_or("NEO4J_USER", "neo4j"),
            neo4j_password: env_or("NEO4J_PASSWORD", "password"),
            model_path: env_or("MODEL_PATH", "data/precog_models.json"),
            data_path: env_or("DATA_PATH", "data/precog_graph.json"),
            thresholds,
            current_year: parsed_env("CURRENT_YEAR", 2026)?,
            num_citizens: parsed_env("NUM_CITIZENS", 1000)?,
            num_locations: parsed_env("NUM_LOCATIONS", 50)?,
            node_batch_size: parsed_env("NODE_BATCH_SIZE", 500)?,
            edge_batch_size: parsed_env("EDGE_BATCH_SIZE", 1000)?,
            seed: match env::var("GENERATOR_SEED") {
                Ok(v) => Some(v.parse().map_err(|_| {
                    PrecogError::Config(format!("GENERATOR_SEED must be a u64, got {v:?}"))
                })?),
                Err(_) => None,
            },
            epochs: parsed_env("EPOCHS", 100)?,
            hidden_dim: parsed_env("HIDDEN_DIM", 64)?,
            learning_rate_g: parsed_env("LEARNING_RATE_G", 0.01)?,
            learning_rate_d: parsed_env("LEARNING_RATE_D", 0.01)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, PrecogError> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| PrecogError::Config(format!("{key} could not be parsed from {v:?}"))),
        Err(_) => Ok(default),
    }
}
