//! Parley ingestion pipeline.
//!
//! Processes an ingestion request through:
//! 1. Validation
//! 2. Early duplicate check (skips inference for known ids)
//! 3. Knowledge extraction
//! 4. Transactional persistence

use std::sync::Arc;

use tracing::{debug, info};

use parley_core::error::ParleyError;
use parley_core::types::{IngestOutcome, IngestRequest};
use parley_storage::TranscriptRepository;

use crate::orchestrator::ExtractionOrchestrator;

/// The main ingestion pipeline.
pub struct IngestionPipeline {
    orchestrator: ExtractionOrchestrator,
    repo: Arc<TranscriptRepository>,
    min_transcript_chars: usize,
}

impl IngestionPipeline {
    pub fn new(
        orchestrator: ExtractionOrchestrator,
        repo: Arc<TranscriptRepository>,
        min_transcript_chars: usize,
    ) -> Self {
        Self {
            orchestrator,
            repo,
            min_transcript_chars,
        }
    }

    /// Ingest one transcript.
    ///
    /// Fails with a validation error before any inference call, with
    /// `DuplicateTranscript` if the id is already stored, with an extraction
    /// error naming the failing stage, or with a persistence error. Nothing
    /// is stored unless the whole request succeeds.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, ParleyError> {
        // Step 1: Validate.
        let new = request.validate(self.min_transcript_chars)?;
        debug!(transcript_id = %new.transcript_id, "Ingestion request validated");

        // Step 2: Reject known ids before paying for inference. The
        // transactional check in storage still decides races.
        let repo = self.repo.clone();
        let transcript_id = new.transcript_id.clone();
        let exists = tokio::task::spawn_blocking(move || repo.exists(&transcript_id))
            .await
            .map_err(|e| ParleyError::Persistence(format!("Storage task failed: {}", e)))??;
        if exists {
            info!(transcript_id = %new.transcript_id, "Duplicate transcript rejected");
            return Err(ParleyError::DuplicateTranscript(new.transcript_id));
        }

        // Step 3: Extract knowledge.
        let knowledge = self.orchestrator.extract(&new.transcript).await?;

        // Step 4: Persist everything atomically.
        let repo = self.repo.clone();
        let (id, knowledge) = tokio::task::spawn_blocking(move || {
            repo.ingest(&new, &knowledge).map(|id| (id, knowledge))
        })
        .await
        .map_err(|e| ParleyError::Persistence(format!("Storage task failed: {}", e)))??;

        Ok(IngestOutcome {
            id,
            status: "processed".to_string(),
            summary: knowledge.summary,
            insights: knowledge.insights,
            extracted: knowledge.entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{ExtractionStage, ParticipantInput};
    use parley_inference::{MockInference, MockOperation};
    use parley_storage::{Database, QueryService};

    struct Harness {
        db: Arc<Database>,
        mock: Arc<MockInference>,
        repo: Arc<TranscriptRepository>,
        queries: QueryService,
        pipeline: IngestionPipeline,
    }

    fn harness() -> Harness {
        let db = Arc::new(Database::in_memory().unwrap());
        let mock = Arc::new(MockInference::new(32));
        let repo = Arc::new(TranscriptRepository::new(db.clone()));
        let pipeline = IngestionPipeline::new(
            ExtractionOrchestrator::new(mock.clone()),
            repo.clone(),
            10,
        );
        Harness {
            db: db.clone(),
            mock,
            repo,
            queries: QueryService::new(db),
            pipeline,
        }
    }

    fn link_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM transcript_participants", [], |row| {
                row.get(0)
            })
            .map_err(|e| ParleyError::Persistence(e.to_string()))
        })
        .unwrap()
    }

    fn request(transcript_id: &str) -> IngestRequest {
        IngestRequest {
            transcript_id: Some(transcript_id.to_string()),
            title: Some("Beta launch sync".to_string()),
            occurred_at: Some("2024-03-01T10:00:00Z".to_string()),
            duration_minutes: Some(30.0),
            participants: Some(vec![ParticipantInput {
                name: Some("Ada".to_string()),
                email: Some("ada@example.com".to_string()),
                role: Some("host".to_string()),
            }]),
            transcript: Some(
                "We agreed to ship the beta on Friday. Ada will write the notes.".to_string(),
            ),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_persists_everything() {
        let h = harness();
        let outcome = h.pipeline.ingest(request("t-1")).await.unwrap();

        assert_eq!(outcome.status, "processed");
        assert!(!outcome.summary.is_empty());
        assert_eq!(outcome.extracted.decisions.len(), 1);

        let detail = h.repo.find_detail(outcome.id).unwrap();
        assert_eq!(detail.transcript_id, "t-1");
        assert_eq!(detail.participants.len(), 1);
        assert_eq!(detail.decisions.len(), 1);
        assert_eq!(h.repo.load_embeddings().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_inference_calls() {
        let h = harness();
        let mut req = request("t-1");
        req.transcript = Some("short".to_string());

        let err = h.pipeline.ingest(req).await.unwrap_err();
        assert!(matches!(err, ParleyError::Validation(_)));
        assert_eq!(h.mock.calls(MockOperation::Entities), 0);
        assert_eq!(h.mock.calls(MockOperation::Embedding), 0);
    }

    #[tokio::test]
    async fn test_duplicate_skips_inference() {
        let h = harness();
        h.pipeline.ingest(request("t-1")).await.unwrap();

        let err = h.pipeline.ingest(request("t-1")).await.unwrap_err();
        assert!(matches!(err, ParleyError::DuplicateTranscript(_)));
        assert_eq!(h.mock.calls(MockOperation::Entities), 1);
        assert_eq!(h.queries.stats().unwrap().transcripts, 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_stores_nothing() {
        let h = harness();
        h.mock.fail(MockOperation::Embedding);

        let err = h.pipeline.ingest(request("t-1")).await.unwrap_err();
        assert!(matches!(
            err,
            ParleyError::Extraction {
                stage: ExtractionStage::Embedding,
                ..
            }
        ));
        assert_eq!(h.queries.stats().unwrap(), Default::default());
        assert!(!h.repo.exists("t-1").unwrap());

        // A later retry with a healthy provider goes through.
        h.mock.recover(MockOperation::Embedding);
        assert!(h.pipeline.ingest(request("t-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_store_once() {
        let h = harness();
        let (a, b) = tokio::join!(
            h.pipeline.ingest(request("t-1")),
            h.pipeline.ingest(request("t-1"))
        );

        let results = [a, b];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(ParleyError::DuplicateTranscript(_))))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(dup, 1);

        let stats = h.queries.stats().unwrap();
        assert_eq!(stats.transcripts, 1);
        assert_eq!(stats.participants, 1);
        assert_eq!(stats.embeddings, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_ingests_share_new_participant() {
        let h = harness();
        let mut first = request("t-1");
        let mut second = request("t-2");
        for req in [&mut first, &mut second] {
            req.participants = Some(vec![ParticipantInput {
                name: Some("Newcomer".to_string()),
                email: Some("new@example.com".to_string()),
                role: None,
            }]);
        }

        let (a, b) = tokio::join!(h.pipeline.ingest(first), h.pipeline.ingest(second));
        let (a, b) = (a.unwrap(), b.unwrap());

        let stats = h.queries.stats().unwrap();
        assert_eq!(stats.transcripts, 2);
        assert_eq!(stats.participants, 1);
        assert_eq!(link_rows(&h.db), 2);

        let pa = h.repo.find_detail(a.id).unwrap().participants;
        let pb = h.repo.find_detail(b.id).unwrap().participants;
        assert_eq!(pa.len(), 1);
        assert_eq!(pa[0].id, pb[0].id);
        assert_eq!(pa[0].email, "new@example.com");
    }
}
