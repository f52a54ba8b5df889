//! Scan orchestration: subject lookup, feature fetch, scoring, verdict,
//! audit append. Scans are stateless; each call reads the graph fresh and
//! appends exactly one prediction record.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use precog_common::{
    classify, PrecogError, PredictionRecord, PredictionStatus, ScanReport, Thresholds,
};
use precog_graph::{
    trend, ActiveIntervention, FeatureHydrator, GraphClient, GraphReader, PredictionAuditor,
    ResolveOutcome, Trend, FEATURE_DIM,
};
use precog_model::ScoringBackend;

/// Prediction history view for one subject.
#[derive(Debug, Clone)]
pub struct SubjectDossier {
    pub citizen_id: i64,
    pub records: Vec<PredictionRecord>,
    pub trend: Trend,
    pub rolling_average: Option<f64>,
}

pub struct ScanEngine {
    reader: GraphReader,
    hydrator: FeatureHydrator,
    auditor: PredictionAuditor,
    backend: ScoringBackend,
    thresholds: Thresholds,
}

impl ScanEngine {
    pub fn new(
        client: GraphClient,
        backend: ScoringBackend,
        thresholds: Thresholds,
        current_year: i32,
    ) -> Self {
        Self {
            reader: GraphReader::new(client.clone()),
            hydrator: FeatureHydrator::new(client.clone(), current_year),
            auditor: PredictionAuditor::new(client),
            backend,
            thresholds,
        }
    }

    /// Score one subject and append the verdict to the audit trail. The
    /// report never carries the stored risk seed; a scoring failure inside a
    /// learned backend degrades to the heuristic rather than surfacing.
    pub async fn scan(&self, citizen_id: i64) -> Result<ScanReport, PrecogError> {
        let profile = self
            .reader
            .subject_profile(citizen_id)
            .await
            .map_err(PrecogError::database)?
            .ok_or(PrecogError::SubjectNotFound(citizen_id))?;

        let features = self
            .hydrator
            .subject_features(citizen_id)
            .await?
            .unwrap_or([0.0; FEATURE_DIM]);

        let outcome = self.backend.score_subject(&profile, &features);
        let verdict = classify(outcome.probability, self.thresholds);
        let now = Utc::now();

        let record = PredictionRecord {
            id: Uuid::new_v4(),
            citizen_id,
            probability: outcome.probability,
            confidence: outcome.confidence,
            verdict,
            method: outcome.method,
            timestamp: now,
            status: PredictionStatus::Active,
            resolved_at: None,
        };
        self.auditor
            .record_prediction(&record)
            .await
            .map_err(PrecogError::database)?;

        info!(
            citizen_id,
            probability = outcome.probability,
            verdict = %verdict,
            method = %outcome.method,
            "scan recorded"
        );
        Ok(ScanReport {
            citizen_id,
            citizen_name: profile.name,
            probability: outcome.probability,
            confidence: outcome.confidence,
            verdict,
            method: outcome.method,
            recorded_at: now,
        })
    }

    /// Close out a subject's active interventions. The two empty outcomes
    /// surface as distinct errors.
    pub async fn resolve(&self, citizen_id: i64) -> Result<i64, PrecogError> {
        match self
            .auditor
            .resolve(citizen_id, Utc::now())
            .await
            .map_err(PrecogError::database)?
        {
            ResolveOutcome::Resolved { updated } => Ok(updated),
            ResolveOutcome::NoActiveIntervention => {
                Err(PrecogError::NoActiveIntervention(citizen_id))
            }
            ResolveOutcome::SubjectNotFound => Err(PrecogError::SubjectNotFound(citizen_id)),
        }
    }

    /// Recent prediction history with its direction and windowed average.
    pub async fn dossier(
        &self,
        citizen_id: i64,
        limit: i64,
        window_days: i64,
    ) -> Result<SubjectDossier, PrecogError> {
        if !self
            .reader
            .citizen_exists(citizen_id)
            .await
            .map_err(PrecogError::database)?
        {
            return Err(PrecogError::SubjectNotFound(citizen_id));
        }
        let records = self
            .auditor
            .history(citizen_id, limit)
            .await
            .map_err(PrecogError::database)?;
        let rolling_average = self
            .auditor
            .rolling_average(citizen_id, window_days, Utc::now())
            .await
            .map_err(PrecogError::database)?;
        Ok(SubjectDossier {
            citizen_id,
            trend: trend(&records),
            records,
            rolling_average,
        })
    }

    /// Subjects currently under an unresolved INTERVENE verdict, highest
    /// probability first.
    pub async fn active_interventions(&self) -> Result<Vec<ActiveIntervention>, PrecogError> {
        self.auditor
            .active_interventions()
            .await
            .map_err(PrecogError::database)
    }
}
