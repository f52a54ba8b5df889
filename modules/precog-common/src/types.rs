use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CitizenStatus {
    Active,
    Watchlist,
    Detained,
    Cleared,
}

impl std::fmt::Display for CitizenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CitizenStatus::Active => write!(f, "ACTIVE"),
            CitizenStatus::Watchlist => write!(f, "WATCHLIST"),
            CitizenStatus::Detained => write!(f, "DETAINED"),
            CitizenStatus::Cleared => write!(f, "CLEARED"),
        }
    }
}

impl CitizenStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(CitizenStatus::Active),
            "WATCHLIST" => Some(CitizenStatus::Watchlist),
            "DETAINED" => Some(CitizenStatus::Detained),
            "CLEARED" => Some(CitizenStatus::Cleared),
            _ => None,
        }
    }
}

/// Tiered outcome of a risk scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Safe,
    Watchlist,
    Intervene,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Watchlist => write!(f, "WATCHLIST"),
            Verdict::Intervene => write!(f, "INTERVENE"),
        }
    }
}

impl Verdict {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SAFE" => Some(Verdict::Safe),
            "WATCHLIST" => Some(Verdict::Watchlist),
            "INTERVENE" => Some(Verdict::Intervene),
            _ => None,
        }
    }
}

/// How a probability was produced. The two backends share one contract but
/// the audit trail records which one answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMethod {
    Learned,
    Heuristic,
}

impl std::fmt::Display for ScoreMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreMethod::Learned => write!(f, "learned"),
            ScoreMethod::Heuristic => write!(f, "heuristic"),
        }
    }
}

impl ScoreMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "learned" => Some(ScoreMethod::Learned),
            "heuristic" => Some(ScoreMethod::Heuristic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionStatus {
    Active,
    Resolved,
}

impl PredictionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PredictionStatus::Active),
            "RESOLVED" => Some(PredictionStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionStatus::Active => write!(f, "ACTIVE"),
            PredictionStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Visit cadence on a VISITS edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
        }
    }
}

// --- Entity records ---

/// A citizen node as stored in the graph. `risk_seed` is the hidden ground
/// truth written by the synthesizer; it never leaves the pipeline through a
/// scan response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citizen {
    pub id: i64,
    pub name: String,
    pub born: i32,
    pub job: String,
    pub address: String,
    pub status: CitizenStatus,
    pub risk_seed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub loc_type: String,
    pub env_risk: f64,
    pub lat: f64,
    pub lng: f64,
}

/// A historical crime. Immutable except for the `investigated` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crime {
    pub id: Uuid,
    pub crime_type: String,
    pub severity: i64,
    pub date: NaiveDate,
    pub description: String,
    pub investigated: bool,
    pub location_id: String,
    pub perpetrator_id: Option<i64>,
}

/// One row of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub citizen_id: i64,
    pub probability: f64,
    pub confidence: f64,
    pub verdict: Verdict,
    pub method: ScoreMethod,
    pub timestamp: DateTime<Utc>,
    pub status: PredictionStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Everything the scoring pipeline needs about one subject, enriched at read
/// time. `risk_seed` and `criminal_degree` stay server-side.
#[derive(Debug, Clone)]
pub struct SubjectProfile {
    pub id: i64,
    pub name: String,
    pub born: Option<i32>,
    pub job: Option<String>,
    pub status: CitizenStatus,
    pub risk_seed: f64,
    pub social_network_size: i64,
    pub criminal_degree: i64,
}

/// What a scan hands back to the caller. Deliberately excludes risk_seed and
/// criminal_degree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub citizen_id: i64,
    pub citizen_name: String,
    pub probability: f64,
    pub confidence: f64,
    pub verdict: Verdict,
    pub method: ScoreMethod,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate crime-pattern view produced during hydration QA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrimeSummary {
    pub total: u64,
    pub by_type: std::collections::BTreeMap<String, u64>,
    pub by_location_type: std::collections::BTreeMap<String, u64>,
    pub mean_severity: f64,
}
