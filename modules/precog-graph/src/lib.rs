pub mod audit;
pub mod city;
pub mod client;
pub mod hydrator;
pub mod reader;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use audit::{
    trend, ActiveIntervention, BacktestReport, PredictionAuditor, ResolveOutcome, Trend,
    CRITICAL_PROBABILITY,
};
pub use city::{CityStats, CitySynthesizer, SynthesisConfig};
pub use client::GraphClient;
pub use hydrator::{FeatureHydrator, HydratedGraph, FEATURE_DIM};
pub use reader::GraphReader;
pub use writer::GraphWriter;

pub use neo4rs::query;
