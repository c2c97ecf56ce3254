//! Retrieval-augmented generation backend boundary.
//!
//! Threads, runs and messages follow the thread-based assistants model: a thread is an ordered
//! list of turns, a run consumes the thread and appends one grounded assistant message.
//! The retrieval index holds the published corpus files.

pub mod local;
pub mod openai;

use crate::config::{BackendKind, RagSettings};
use crate::corpus::KnowledgeDocument;
use crate::error::{RagError, RagResult};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use local::LocalRagBackend;
pub use openai::OpenAiAssistants;

/// Lifecycle of one backend run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Still worth polling.
    pub fn is_pending(self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    FileCitation { file_id: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text {
        value: String,
        annotations: Vec<Annotation>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    /// Text segments in order, joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { value, .. } => Some(value.as_str()),
                MessageContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every file citation across all text segments, in order, duplicates kept.
    pub fn citations(&self) -> Vec<String> {
        self.content
            .iter()
            .flat_map(|c| match c {
                MessageContent::Text { annotations, .. } => annotations.as_slice(),
                MessageContent::Other => &[][..],
            })
            .filter_map(|a| match a {
                Annotation::FileCitation { file_id } => Some(file_id.clone()),
                Annotation::Other => None,
            })
            .collect()
    }
}

/// Events of a streamed run, already reduced to what the chat path needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStreamEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// Run finished successfully.
    Completed(Run),
    /// Run ended in `failed`, `cancelled`, `expired` (or another non-success status).
    Terminated(Run),
}

pub type RunEventStream = BoxStream<'static, RagResult<RunStreamEvent>>;

/// One file currently attached to the retrieval index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    pub id: String,
}

#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn create_thread(&self) -> RagResult<String>;

    /// Confirms the thread exists; not-found class errors when it does not.
    async fn retrieve_thread(&self, thread_id: &str) -> RagResult<()>;

    async fn add_user_message(&self, thread_id: &str, text: &str) -> RagResult<()>;

    async fn create_run(&self, thread_id: &str) -> RagResult<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> RagResult<Run>;

    /// Newest message of the thread, if any.
    async fn latest_message(&self, thread_id: &str) -> RagResult<Option<ThreadMessage>>;

    /// Start a run and stream its events.
    async fn stream_run(&self, thread_id: &str) -> RagResult<RunEventStream>;

    /// Upload one document; returns the backend file id.
    async fn upload_file(&self, doc: &KnowledgeDocument) -> RagResult<String>;

    /// Attach uploaded files to the retrieval index; returns how many were ingested.
    async fn attach_files(&self, file_ids: &[String]) -> RagResult<usize>;

    async fn list_index_files(&self) -> RagResult<Vec<IndexFile>>;

    async fn remove_index_file(&self, file_id: &str) -> RagResult<()>;

    async fn index_file_count(&self) -> RagResult<usize>;
}

/// Backend selected by the settings: the local one, or the HTTP one when an API key is set.
pub fn build_backend(settings: &RagSettings) -> Option<Arc<dyn RagBackend>> {
    match settings.backend {
        BackendKind::Local => Some(Arc::new(LocalRagBackend::new())),
        BackendKind::OpenAi => match OpenAiAssistants::new(settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(RagError::BackendUnconfigured) => None,
            Err(e) => {
                tracing::warn!(target: "folio::rag", "RAG client unavailable: {}", e);
                None
            }
        },
    }
}
