use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use precog_common::{Config, BACKTEST_WINDOW_DAYS};
use precog_engine::{Evaluator, ScanEngine};
use precog_graph::{
    CitySynthesizer, FeatureHydrator, GraphClient, GraphReader, PredictionAuditor,
    SynthesisConfig,
};
use precog_model::{
    train_adversarial, Checkpoint, GraphTensors, LearnedScorer, ScoringBackend, SplitRatios,
    TrainConfig,
};

#[derive(Parser)]
#[command(name = "precog", about = "Graph-native crime-risk prediction pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wipe and regenerate the synthetic city
    GenerateCity {
        #[arg(long)]
        citizens: Option<usize>,
        #[arg(long)]
        locations: Option<usize>,
        /// Fixed seed for a reproducible city
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Convert the graph into the tensor artifact used for training
    Hydrate,
    /// Train the adversarial pair from the tensor artifact
    Train {
        #[arg(long)]
        epochs: Option<u32>,
    },
    /// Offline score distribution and INTERVENE-precision backtest
    Evaluate {
        #[arg(long, default_value_t = BACKTEST_WINDOW_DAYS)]
        window_days: i64,
    },
    /// Score one subject and append the verdict to the audit trail
    Scan { citizen_id: i64 },
    /// Close out a subject's active interventions
    Resolve { citizen_id: i64 },
    /// City counts, verdict counts, and the active-intervention board
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("precog=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::GenerateCity { citizens, locations, seed } => {
            let client = connect(&config).await?;
            let synth_config = SynthesisConfig {
                num_citizens: citizens.unwrap_or(config.num_citizens),
                num_locations: locations.unwrap_or(config.num_locations),
                node_batch_size: config.node_batch_size,
                edge_batch_size: config.edge_batch_size,
                seed: seed.or(config.seed),
            };
            let mut synth = CitySynthesizer::new(client, synth_config);
            let stats = synth.generate().await?;
            println!(
                "city generated: {} citizens, {} locations, {} social links, {} routines, {} crimes by {} offenders (density {:.4})",
                stats.citizens,
                stats.locations,
                stats.social_links,
                stats.routines,
                stats.crimes,
                stats.unique_criminals,
                stats.network_density
            );
        }
        Command::Hydrate => {
            let client = connect(&config).await?;
            GraphReader::new(client.clone())
                .persist_criminal_degree()
                .await?;
            let hydrator = FeatureHydrator::new(client, config.current_year);
            let mut hydrated = hydrator.hydrate().await?;
            hydrated.tensors.split(SplitRatios::default(), config.seed);
            hydrated.tensors.save(&config.data_path)?;

            let stats = hydrated.tensors.column_stats();
            println!(
                "hydrated {} citizens / {} edges into {}",
                hydrated.tensors.num_nodes,
                hydrated.tensors.edge_count(),
                config.data_path
            );
            println!("feature means: {:?}", stats.mean);

            let patterns = hydrator.crime_patterns().await?;
            println!(
                "crime history: {} crimes, mean severity {:.2}, by type {:?}",
                patterns.total, patterns.mean_severity, patterns.by_type
            );
        }
        Command::Train { epochs } => {
            let tensors = GraphTensors::load(&config.data_path)
                .context("run `precog hydrate` before training")?;
            let train_config = TrainConfig {
                epochs: epochs.unwrap_or(config.epochs as u32),
                hidden_dim: config.hidden_dim,
                lr_proposer: config.learning_rate_g,
                lr_scorer: config.learning_rate_d,
                seed: config.seed,
            };
            let (proposer, scorer, report) = train_adversarial(&tensors, &train_config)?;
            Checkpoint::from_models(&proposer, &scorer).save(&config.model_path)?;
            println!(
                "trained {} epochs: scorer loss {:.4} -> {:.4}, val real-rate {:.2}, checkpoint at {}",
                report.epochs,
                report.first_scorer_loss,
                report.final_scorer_loss,
                report.val_real_rate,
                config.model_path
            );
        }
        Command::Evaluate { window_days } => {
            let scorer = LearnedScorer::from_checkpoint(&config.model_path)
                .context("run `precog train` before evaluating")?;
            let client = connect(&config).await?;
            let evaluator = Evaluator::new(client, config.current_year);
            let report = evaluator.evaluate(&scorer, window_days).await?;

            let s = report.scores;
            println!(
                "structural scores over {} citizens: mean {:.3} std {:.3} min {:.3} max {:.3}",
                s.count, s.mean, s.std, s.min, s.max
            );
            if let (Some(offender), Some(clean)) = (report.offender_mean, report.clean_mean) {
                println!("mean score, labeled offenders {offender:.3} vs others {clean:.3}");
            }
            match report.backtest.precision() {
                Some(p) => println!(
                    "backtest ({}d window): {}/{} INTERVENE verdicts followed by a crime (precision {:.2})",
                    report.backtest.window_days,
                    report.backtest.followed_by_crime,
                    report.backtest.intervene_total,
                    p
                ),
                None => println!("backtest: no INTERVENE verdicts recorded yet"),
            }
        }
        Command::Scan { citizen_id } => {
            let client = connect(&config).await?;
            let backend = ScoringBackend::from_checkpoint_or_heuristic(&config.model_path);
            let engine = ScanEngine::new(client, backend, config.thresholds, config.current_year);

            let report = engine.scan(citizen_id).await?;
            println!(
                "{} (citizen {}): {} p={:.3} confidence={:.2} [{}]",
                report.citizen_name,
                report.citizen_id,
                report.verdict,
                report.probability,
                report.confidence,
                report.method
            );

            let dossier = engine
                .dossier(citizen_id, 10, BACKTEST_WINDOW_DAYS)
                .await?;
            if dossier.records.len() > 1 {
                println!(
                    "history: {} scans, trend {}, {}d average {:.3}",
                    dossier.records.len(),
                    dossier.trend,
                    BACKTEST_WINDOW_DAYS,
                    dossier.rolling_average.unwrap_or(report.probability)
                );
            }
        }
        Command::Resolve { citizen_id } => {
            let client = connect(&config).await?;
            let backend = ScoringBackend::from_checkpoint_or_heuristic(&config.model_path);
            let engine = ScanEngine::new(client, backend, config.thresholds, config.current_year);
            let updated = engine.resolve(citizen_id).await?;
            println!("citizen {citizen_id}: {updated} intervention(s) resolved");
        }
        Command::Stats => {
            let client = connect(&config).await?;
            let synth = CitySynthesizer::new(client.clone(), SynthesisConfig::default());
            let stats = synth.stats().await?;
            println!(
                "{} citizens, {} locations, {} social links, {} routines, {} crimes by {} offenders (density {:.4})",
                stats.citizens,
                stats.locations,
                stats.social_links,
                stats.routines,
                stats.crimes,
                stats.unique_criminals,
                stats.network_density
            );

            let auditor = PredictionAuditor::new(client.clone());
            let counts = auditor
                .verdict_counts(BACKTEST_WINDOW_DAYS, chrono::Utc::now())
                .await?;
            println!("verdicts ({BACKTEST_WINDOW_DAYS}d): {counts:?}");

            let engine = ScanEngine::new(
                client,
                ScoringBackend::Heuristic,
                config.thresholds,
                config.current_year,
            );
            let board = engine.active_interventions().await?;
            let critical = board.iter().filter(|i| i.is_critical()).count();
            println!("active interventions: {} ({} critical)", board.len(), critical);
            for i in &board {
                println!(
                    "  citizen {} ({}) p={:.3} since {}",
                    i.citizen_id, i.citizen_name, i.probability, i.recorded_at
                );
            }
        }
    }
    Ok(())
}

async fn connect(config: &Config) -> Result<GraphClient> {
    info!(uri = %config.neo4j_uri, "connecting to graph");
    let client =
        GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
            .await?;
    Ok(client)
}
