pub mod config;
pub mod error;
pub mod types;
pub mod verdict;

pub use config::Config;
pub use error::PrecogError;
pub use types::{
    Citizen, CitizenStatus, Crime, CrimeSummary, Frequency, Location, PredictionRecord,
    PredictionStatus, ScanReport, ScoreMethod, SubjectProfile, Verdict,
};
pub use verdict::{classify, confidence, Thresholds};

/// Default probability threshold above which a subject lands on the watchlist.
pub const WATCHLIST_THRESHOLD: f64 = 0.60;

/// Default probability threshold above which intervention is mandated.
pub const INTERVENE_THRESHOLD: f64 = 0.85;

/// risk_seed above this value marks a citizen as a potential offender in the
/// synthetic ground truth. Also drives the homophily bonus during generation.
pub const HIGH_RISK_SEED: f64 = 0.6;

/// Window, in days, used when backtesting predictions against later crimes.
pub const BACKTEST_WINDOW_DAYS: i64 = 30;
