use chrono::{DateTime, NaiveDateTime, Utc};
use neo4rs::query;
use tracing::info;
use uuid::Uuid;

use precog_common::{
    PredictionRecord, PredictionStatus, ScoreMethod, Verdict, BACKTEST_WINDOW_DAYS,
};

use crate::GraphClient;

/// Above this probability an active intervention is flagged critical.
pub const CRITICAL_PROBABILITY: f64 = 0.9;

const TREND_DELTA: f64 = 0.05;

/// Outcome of a resolve request, distinguished so callers can report the
/// two failure shapes separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved { updated: i64 },
    NoActiveIntervention,
    SubjectNotFound,
}

/// Direction of a subject's recent probability history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Rising => write!(f, "rising"),
            Trend::Falling => write!(f, "falling"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// One row of the active-intervention board.
#[derive(Debug, Clone)]
pub struct ActiveIntervention {
    pub citizen_id: i64,
    pub citizen_name: String,
    pub probability: f64,
    pub recorded_at: DateTime<Utc>,
}

impl ActiveIntervention {
    pub fn is_critical(&self) -> bool {
        self.probability > CRITICAL_PROBABILITY
    }
}

/// INTERVENE verdicts joined against crimes that actually followed.
#[derive(Debug, Clone, Copy)]
pub struct BacktestReport {
    pub window_days: i64,
    pub intervene_total: i64,
    pub followed_by_crime: i64,
}

impl BacktestReport {
    /// None when no INTERVENE verdict exists to measure against.
    pub fn precision(&self) -> Option<f64> {
        if self.intervene_total == 0 {
            None
        } else {
            Some(self.followed_by_crime as f64 / self.intervene_total as f64)
        }
    }
}

/// Latest-first probability history against the mean of what came before.
pub fn trend(records: &[PredictionRecord]) -> Trend {
    if records.len() < 2 {
        return Trend::Stable;
    }
    let latest = records[0].probability;
    let prior: f64 = records[1..].iter().map(|r| r.probability).sum::<f64>()
        / (records.len() - 1) as f64;
    if latest - prior > TREND_DELTA {
        Trend::Rising
    } else if prior - latest > TREND_DELTA {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

/// Append-only store of prediction records. Every scan appends one
/// :Prediction node linked to its subject; the only mutation ever applied
/// is the ACTIVE to RESOLVED transition.
pub struct PredictionAuditor {
    client: GraphClient,
}

impl PredictionAuditor {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Append one record. Returns false when the subject does not exist, in
    /// which case nothing was written.
    pub async fn record_prediction(
        &self,
        record: &PredictionRecord,
    ) -> Result<bool, neo4rs::Error> {
        let q = query(
            "MATCH (c:Citizen {id: $cid})
             CREATE (p:Prediction {
                 id: $id,
                 citizen_id: $cid,
                 probability: $probability,
                 confidence: $confidence,
                 verdict: $verdict,
                 method: $method,
                 timestamp: datetime($ts),
                 status: $status
             })
             CREATE (c)-[:SUBJECT_OF]->(p)
             RETURN count(p) AS n",
        )
        .param("cid", record.citizen_id)
        .param("id", record.id.to_string())
        .param("probability", record.probability)
        .param("confidence", record.confidence)
        .param("verdict", record.verdict.to_string())
        .param("method", record.method.to_string())
        .param("ts", format_ts(record.timestamp))
        .param("status", record.status.to_string());

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            return Ok(row.get::<i64>("n").unwrap_or(0) > 0);
        }
        Ok(false)
    }

    /// Most recent records for one subject, newest first.
    pub async fn history(
        &self,
        citizen_id: i64,
        limit: i64,
    ) -> Result<Vec<PredictionRecord>, neo4rs::Error> {
        let q = query(
            "MATCH (p:Prediction {citizen_id: $cid})
             RETURN p.id AS id, p.citizen_id AS citizen_id,
                    p.probability AS probability, p.confidence AS confidence,
                    p.verdict AS verdict, p.method AS method,
                    toString(p.timestamp) AS timestamp, p.status AS status,
                    CASE WHEN p.resolved_at IS NULL THEN null
                         ELSE toString(p.resolved_at) END AS resolved_at
             ORDER BY p.timestamp DESC
             LIMIT $limit",
        )
        .param("cid", citizen_id)
        .param("limit", limit.max(0));

        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            out.push(row_to_record(&row, citizen_id));
        }
        Ok(out)
    }

    /// Mean probability over the subject's records inside the trailing
    /// window. None when the window is empty.
    pub async fn rolling_average(
        &self,
        citizen_id: i64,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, neo4rs::Error> {
        let since = now - chrono::Duration::days(window_days);
        let q = query(
            "MATCH (p:Prediction {citizen_id: $cid})
             WHERE p.timestamp >= datetime($since)
             RETURN avg(p.probability) AS avg, count(p) AS n",
        )
        .param("cid", citizen_id)
        .param("since", format_ts(since));

        let mut stream = self.client.graph.execute(q).await?;
        if let Some(row) = stream.next().await? {
            if row.get::<i64>("n").unwrap_or(0) > 0 {
                return Ok(Some(row.get("avg").unwrap_or(0.0)));
            }
        }
        Ok(None)
    }

    /// Verdict counts over all records in the trailing window.
    pub async fn verdict_counts(
        &self,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<std::collections::BTreeMap<String, i64>, neo4rs::Error> {
        let since = now - chrono::Duration::days(window_days);
        let q = query(
            "MATCH (p:Prediction)
             WHERE p.timestamp >= datetime($since)
             RETURN p.verdict AS key, count(p) AS n",
        )
        .param("since", format_ts(since));

        let mut out = std::collections::BTreeMap::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            out.insert(
                row.get("key").unwrap_or_default(),
                row.get("n").unwrap_or(0),
            );
        }
        Ok(out)
    }

    /// Every subject currently under an unresolved INTERVENE verdict.
    pub async fn active_interventions(&self) -> Result<Vec<ActiveIntervention>, neo4rs::Error> {
        let q = query(
            "MATCH (c:Citizen)-[:SUBJECT_OF]->(p:Prediction {status: 'ACTIVE', verdict: 'INTERVENE'})
             RETURN p.citizen_id AS citizen_id, c.name AS name,
                    p.probability AS probability,
                    toString(p.timestamp) AS timestamp
             ORDER BY p.probability DESC",
        );

        let mut out = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            let ts: String = row.get("timestamp").unwrap_or_default();
            out.push(ActiveIntervention {
                citizen_id: row.get("citizen_id").unwrap_or_default(),
                citizen_name: row.get("name").unwrap_or_default(),
                probability: row.get("probability").unwrap_or(0.0),
                recorded_at: parse_ts(&ts).unwrap_or_else(Utc::now),
            });
        }
        Ok(out)
    }

    /// Flip the subject's ACTIVE INTERVENE records to RESOLVED. The two
    /// empty cases are reported distinctly.
    pub async fn resolve(
        &self,
        citizen_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, neo4rs::Error> {
        let exists = query("MATCH (c:Citizen {id: $cid}) RETURN count(c) AS n")
            .param("cid", citizen_id);
        let mut stream = self.client.graph.execute(exists).await?;
        let found = match stream.next().await? {
            Some(row) => row.get::<i64>("n").unwrap_or(0) > 0,
            None => false,
        };
        if !found {
            return Ok(ResolveOutcome::SubjectNotFound);
        }

        let q = query(
            "MATCH (p:Prediction {citizen_id: $cid, status: 'ACTIVE', verdict: 'INTERVENE'})
             SET p.status = 'RESOLVED', p.resolved_at = datetime($now)
             RETURN count(p) AS n",
        )
        .param("cid", citizen_id)
        .param("now", format_ts(now));

        let mut stream = self.client.graph.execute(q).await?;
        let updated = match stream.next().await? {
            Some(row) => row.get("n").unwrap_or(0),
            None => 0,
        };
        if updated == 0 {
            return Ok(ResolveOutcome::NoActiveIntervention);
        }
        info!(citizen_id, updated, "interventions resolved");
        Ok(ResolveOutcome::Resolved { updated })
    }

    /// Join INTERVENE verdicts to crimes committed strictly after the
    /// prediction and within the window. A rough precision proxy.
    pub async fn backtest(&self, window_days: i64) -> Result<BacktestReport, neo4rs::Error> {
        let window_days = if window_days > 0 { window_days } else { BACKTEST_WINDOW_DAYS };
        let q = query(
            "MATCH (p:Prediction {verdict: 'INTERVENE'})
             OPTIONAL MATCH (c:Citizen {id: p.citizen_id})-[crime:COMMITTED_CRIME]->()
               WHERE date(crime.date) > date(p.timestamp)
                 AND date(crime.date) <= date(p.timestamp) + duration({days: $window})
             WITH p, count(crime) AS hits
             RETURN count(p) AS total,
                    sum(CASE WHEN hits > 0 THEN 1 ELSE 0 END) AS followed",
        )
        .param("window", window_days);

        let mut stream = self.client.graph.execute(q).await?;
        let (total, followed) = match stream.next().await? {
            Some(row) => (
                row.get("total").unwrap_or(0),
                row.get("followed").unwrap_or(0),
            ),
            None => (0, 0),
        };
        Ok(BacktestReport {
            window_days,
            intervene_total: total,
            followed_by_crime: followed,
        })
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

fn row_to_record(row: &neo4rs::Row, citizen_id: i64) -> PredictionRecord {
    let id: String = row.get("id").unwrap_or_default();
    let verdict: String = row.get("verdict").unwrap_or_default();
    let method: String = row.get("method").unwrap_or_default();
    let status: String = row.get("status").unwrap_or_default();
    let timestamp: String = row.get("timestamp").unwrap_or_default();
    let resolved_at: Option<String> = row.get("resolved_at").ok();

    PredictionRecord {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        citizen_id: row.get("citizen_id").unwrap_or(citizen_id),
        probability: row.get("probability").unwrap_or(0.0),
        confidence: row.get("confidence").unwrap_or(0.0),
        verdict: Verdict::parse(&verdict).unwrap_or(Verdict::Safe),
        method: ScoreMethod::parse(&method).unwrap_or(ScoreMethod::Heuristic),
        timestamp: parse_ts(&timestamp).unwrap_or_else(Utc::now),
        status: PredictionStatus::parse(&status).unwrap_or(PredictionStatus::Active),
        resolved_at: resolved_at.as_deref().and_then(parse_ts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(probability: f64) -> PredictionRecord {
        PredictionRecord {
            id: Uuid::new_v4(),
            citizen_id: 1,
            probability,
            confidence: 0.5,
            verdict: Verdict::Safe,
            method: ScoreMethod::Heuristic,
            timestamp: Utc::now(),
            status: PredictionStatus::Active,
            resolved_at: None,
        }
    }

    #[test]
    fn trend_needs_two_records() {
        assert_eq!(trend(&[]), Trend::Stable);
        assert_eq!(trend(&[record(0.9)]), Trend::Stable);
    }

    #[test]
    fn trend_compares_latest_to_prior_mean() {
        // newest first
        let rising = [record(0.8), record(0.5), record(0.4)];
        assert_eq!(trend(&rising), Trend::Rising);

        let falling = [record(0.2), record(0.5), record(0.6)];
        assert_eq!(trend(&falling), Trend::Falling);

        let flat = [record(0.52), record(0.5), record(0.5)];
        assert_eq!(trend(&flat), Trend::Stable);
    }

    #[test]
    fn backtest_precision_handles_empty_population() {
        let empty = BacktestReport { window_days: 30, intervene_total: 0, followed_by_crime: 0 };
        assert_eq!(empty.precision(), None);

        let half = BacktestReport { window_days: 30, intervene_total: 4, followed_by_crime: 2 };
        assert_eq!(half.precision(), Some(0.5));
    }

    #[test]
    fn critical_flag_uses_strict_threshold() {
        let mut i = ActiveIntervention {
            citizen_id: 1,
            citizen_name: "x".into(),
            probability: 0.9,
            recorded_at: Utc::now(),
        };
        assert!(!i.is_critical());
        i.probability = 0.91;
        assert!(i.is_critical());
    }

    #[test]
    fn timestamp_format_round_trips() {
        let ts = Utc::now();
        let parsed = parse_ts(&format_ts(ts)).unwrap();
        assert!((parsed - ts).num_milliseconds().abs() < 1);
    }
}
