//! Grounded answer engine: append, run, wait, extract.
//!
//! Waiting is bounded by `max_wait`; past it the call fails with [`RagError::Timeout`] and the
//! chat boundary falls back like for any other run failure.

use crate::backend::{RagBackend, Run, RunStatus, RunStreamEvent};
use crate::config::RagSettings;
use crate::error::{RagError, RagResult};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Model name reported when the backend leaves it blank.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalAnswer {
    pub response: String,
    pub thread_id: String,
    /// File ids cited by the answer, in order of appearance, duplicates kept.
    pub citations: Vec<String>,
    pub model: String,
    pub status: RunStatus,
}

/// Incremental answer text; ends after the run completes, or with one error.
pub type AnswerStream = BoxStream<'static, RagResult<String>>;

pub struct GroundedAnswerEngine {
    backend: Arc<dyn RagBackend>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl GroundedAnswerEngine {
    pub fn new(backend: Arc<dyn RagBackend>, settings: &RagSettings) -> Self {
        Self::with_timing(backend, settings.poll_interval, settings.max_wait)
    }

    pub fn with_timing(backend: Arc<dyn RagBackend>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            backend,
            poll_interval,
            max_wait,
        }
    }

    pub async fn answer(&self, thread_id: &str, user_text: &str) -> RagResult<RetrievalAnswer> {
        self.backend.add_user_message(thread_id, user_text).await?;
        let run = self.backend.create_run(thread_id).await?;
        tracing::debug!(target: "folio::rag", thread_id = %thread_id, run_id = %run.id, "Run started");

        let run = tokio::time::timeout(self.max_wait, self.wait_for_run(thread_id, run))
            .await
            .map_err(|_| RagError::Timeout(self.max_wait))??;
        check_terminal(&run)?;

        let message = self
            .backend
            .latest_message(thread_id)
            .await?
            .filter(|m| m.is_assistant())
            .ok_or(RagError::NoAssistantReply)?;

        let model = if run.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            run.model.clone()
        };
        let answer = RetrievalAnswer {
            response: message.text(),
            thread_id: thread_id.to_string(),
            citations: message.citations(),
            model,
            status: run.status,
        };
        tracing::info!(
            target: "folio::rag",
            thread_id = %thread_id,
            run_id = %run.id,
            citations = answer.citations.len(),
            "Grounded answer ready"
        );
        Ok(answer)
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: Run) -> RagResult<Run> {
        while run.status.is_pending() {
            tokio::time::sleep(self.poll_interval).await;
            run = self.backend.retrieve_run(thread_id, &run.id).await?;
            tracing::debug!(target: "folio::rag", run_id = %run.id, status = ?run.status, "Polled run");
        }
        Ok(run)
    }

    /// Streamed variant of [`answer`](Self::answer). The deadline spans the whole stream.
    pub async fn answer_stream(&self, thread_id: &str, user_text: &str) -> RagResult<AnswerStream> {
        self.backend.add_user_message(thread_id, user_text).await?;
        let events = self.backend.stream_run(thread_id).await?;
        let deadline = Instant::now() + self.max_wait;
        let max_wait = self.max_wait;

        let texts = stream::unfold(Some(events), move |state| async move {
            let Some(mut events) = state else {
                return None;
            };
            let next = match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(next) => next,
                Err(_) => return Some((Err(RagError::Timeout(max_wait)), None)),
            };
            match next {
                Some(Ok(RunStreamEvent::TextDelta(text))) => Some((Ok(text), Some(events))),
                Some(Ok(RunStreamEvent::Completed(_))) | None => None,
                Some(Ok(RunStreamEvent::Terminated(run))) => {
                    let err = check_terminal(&run)
                        .err()
                        .unwrap_or(RagError::RunFailed(None));
                    Some((Err(err), None))
                }
                Some(Err(e)) => Some((Err(e), None)),
            }
        });
        Ok(texts.boxed())
    }
}

/// Map a settled run onto the error taxonomy. `completed` is the only success.
pub fn check_terminal(run: &Run) -> RagResult<()> {
    match run.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Failed => Err(RagError::RunFailed(
            run.last_error.as_ref().map(|e| e.message.clone()),
        )),
        RunStatus::Cancelled | RunStatus::Cancelling => Err(RagError::RunCancelled),
        RunStatus::Expired => Err(RagError::RunExpired),
        other => Err(RagError::RunFailed(Some(format!(
            "run ended with status {:?}",
            other
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalRunOutcome;
    use crate::backend::LocalRagBackend;
    use crate::corpus::KnowledgeDocument;

    async fn setup() -> (Arc<LocalRagBackend>, GroundedAnswerEngine, String) {
        let backend = Arc::new(LocalRagBackend::new());
        let doc = KnowledgeDocument {
            filename: "skills_backend.txt".into(),
            content: "Backend Skills\n- Python\n- FastAPI".into(),
        };
        let id = backend.upload_file(&doc).await.unwrap();
        backend.attach_files(&[id]).await.unwrap();
        let thread = backend.create_thread().await.unwrap();
        let engine = GroundedAnswerEngine::with_timing(
            backend.clone(),
            Duration::from_millis(5),
            Duration::from_secs(5),
        );
        (backend, engine, thread)
    }

    #[tokio::test]
    async fn answers_with_citations_and_model() {
        let (backend, engine, thread) = setup().await;
        let answer = engine.answer(&thread, "backend skills?").await.unwrap();
        assert!(answer.response.contains("Backend Skills"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.model, crate::backend::local::LOCAL_MODEL);
        assert_eq!(answer.status, RunStatus::Completed);
        assert_eq!(answer.thread_id, thread);
        assert_eq!(backend.user_message_count(), 1);
    }

    #[tokio::test]
    async fn terminal_statuses_map_to_taxonomy() {
        let (backend, engine, thread) = setup().await;

        backend.force_next_run(LocalRunOutcome::Terminal(RunStatus::Failed));
        let err = engine.answer(&thread, "skills").await.unwrap_err();
        assert!(matches!(err, RagError::RunFailed(Some(ref d)) if d == "Simulated run failure"));

        backend.force_next_run(LocalRunOutcome::Terminal(RunStatus::Cancelled));
        assert!(matches!(engine.answer(&thread, "skills").await, Err(RagError::RunCancelled)));

        backend.force_next_run(LocalRunOutcome::Terminal(RunStatus::Expired));
        assert!(matches!(engine.answer(&thread, "skills").await, Err(RagError::RunExpired)));

        backend.force_next_run(LocalRunOutcome::Silent);
        assert!(matches!(engine.answer(&thread, "skills").await, Err(RagError::NoAssistantReply)));

        // every attempt appended exactly one user message
        assert_eq!(backend.user_message_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_run_times_out() {
        let backend = Arc::new(LocalRagBackend::new());
        let thread = backend.create_thread().await.unwrap();
        let engine = GroundedAnswerEngine::with_timing(
            backend.clone(),
            Duration::from_secs(1),
            Duration::from_secs(30),
        );
        backend.force_next_run(LocalRunOutcome::Stall);
        let err = engine.answer(&thread, "anything").await.unwrap_err();
        assert!(matches!(err, RagError::Timeout(d) if d == Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let (backend, engine, thread) = setup().await;
        backend.force_next_run(LocalRunOutcome::Stall);
        let items: Vec<_> = engine.answer_stream(&thread, "skills").await.unwrap().collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(RagError::Timeout(_))));
    }

    #[tokio::test]
    async fn stream_yields_text_then_ends() {
        let (_backend, engine, thread) = setup().await;
        let items: Vec<_> = engine.answer_stream(&thread, "python").await.unwrap().collect().await;
        let text: String = items.into_iter().map(|i| i.unwrap()).collect();
        assert!(text.contains("Python"));
    }

    #[tokio::test]
    async fn failed_stream_ends_with_error() {
        let (backend, engine, thread) = setup().await;
        backend.force_next_run(LocalRunOutcome::Terminal(RunStatus::Expired));
        let items: Vec<_> = engine.answer_stream(&thread, "python").await.unwrap().collect().await;
        assert!(matches!(items.as_slice(), [Err(RagError::RunExpired)]));
    }
}
