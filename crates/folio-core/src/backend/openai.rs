//! OpenAI Assistants v2 over HTTP (reqwest).
//!
//! Threads, runs and messages live under `/threads`; the retrieval index is a vector store
//! fed through `/files` uploads and `/vector_stores/{id}/file_batches`.

use super::{
    Annotation, IndexFile, MessageContent, RagBackend, Run, RunEventStream, RunStreamEvent,
    ThreadMessage,
};
use crate::config::RagSettings;
use crate::corpus::KnowledgeDocument;
use crate::error::{RagError, RagResult};
use crate::sse::{SseDecoder, SseEvent, DONE_SENTINEL};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_PAGE_SIZE: usize = 100;

pub struct OpenAiAssistants {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    assistant_id: Option<String>,
    vector_store_id: Option<String>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl OpenAiAssistants {
    /// Needs at least the API key; thread operations also need the assistant id and index
    /// operations the vector store id (checked per call).
    pub fn new(settings: &RagSettings) -> RagResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(RagError::BackendUnconfigured)?;
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            assistant_id: settings.assistant_id.clone(),
            vector_store_id: settings.vector_store_id.clone(),
            poll_interval: settings.poll_interval,
            max_wait: settings.max_wait,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    fn assistant_id(&self) -> RagResult<&str> {
        self.assistant_id
            .as_deref()
            .ok_or(RagError::BackendUnconfigured)
    }

    fn vector_store_id(&self) -> RagResult<&str> {
        self.vector_store_id
            .as_deref()
            .ok_or(RagError::BackendUnconfigured)
    }

    async fn send(&self, req: RequestBuilder) -> RagResult<reqwest::Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> RagResult<T> {
        let resp = self.send(req).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Deserialize)]
struct WireId {
    id: String,
}

#[derive(Deserialize)]
struct WireList<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text { text: WireText },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireText {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireAnnotation {
    FileCitation { file_citation: WireFileRef },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireFileRef {
    file_id: String,
}

#[derive(Deserialize)]
struct WireMessageDelta {
    delta: WireDelta,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
struct WireFileCounts {
    #[serde(default)]
    completed: usize,
}

#[derive(Deserialize)]
struct WireFileBatch {
    id: String,
    status: String,
    file_counts: WireFileCounts,
}

#[derive(Deserialize)]
struct WireVectorStore {
    file_counts: WireFileCounts,
}

#[derive(Deserialize)]
struct WireStreamError {
    #[serde(default)]
    message: Option<String>,
}

impl From<WireContent> for MessageContent {
    fn from(c: WireContent) -> Self {
        match c {
            WireContent::Text { text } => MessageContent::Text {
                value: text.value.unwrap_or_default(),
                annotations: text
                    .annotations
                    .into_iter()
                    .map(|a| match a {
                        WireAnnotation::FileCitation { file_citation } => Annotation::FileCitation {
                            file_id: file_citation.file_id,
                        },
                        WireAnnotation::Other => Annotation::Other,
                    })
                    .collect(),
            },
            WireContent::Other => MessageContent::Other,
        }
    }
}

impl From<WireMessage> for ThreadMessage {
    fn from(m: WireMessage) -> Self {
        ThreadMessage {
            id: m.id,
            role: m.role,
            content: m.content.into_iter().map(MessageContent::from).collect(),
        }
    }
}

/// Outcome of one decoded run stream event.
enum Decoded {
    Event(RagResult<RunStreamEvent>),
    Done,
    Skip,
}

fn decode_stream_event(ev: &SseEvent) -> Decoded {
    let kind = ev.event.as_deref().unwrap_or("message");
    if kind == "done" || ev.data == DONE_SENTINEL {
        return Decoded::Done;
    }
    match kind {
        "thread.message.delta" => match serde_json::from_str::<WireMessageDelta>(&ev.data) {
            Ok(delta) => {
                let text: String = delta
                    .delta
                    .content
                    .into_iter()
                    .filter_map(|c| match c {
                        WireContent::Text { text } => text.value,
                        WireContent::Other => None,
                    })
                    .collect();
                if text.is_empty() {
                    Decoded::Skip
                } else {
                    Decoded::Event(Ok(RunStreamEvent::TextDelta(text)))
                }
            }
            Err(e) => Decoded::Event(Err(e.into())),
        },
        "thread.run.completed" => match serde_json::from_str::<Run>(&ev.data) {
            Ok(run) => Decoded::Event(Ok(RunStreamEvent::Completed(run))),
            Err(e) => Decoded::Event(Err(e.into())),
        },
        "thread.run.failed"
        | "thread.run.cancelled"
        | "thread.run.expired"
        | "thread.run.incomplete" => match serde_json::from_str::<Run>(&ev.data) {
            Ok(run) => Decoded::Event(Ok(RunStreamEvent::Terminated(run))),
            Err(e) => Decoded::Event(Err(e.into())),
        },
        "error" => {
            let detail = serde_json::from_str::<WireStreamError>(&ev.data)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| ev.data.clone());
            Decoded::Event(Err(RagError::RunFailed(Some(detail))))
        }
        _ => Decoded::Skip,
    }
}

struct RunStreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<RagResult<RunStreamEvent>>,
    finished: bool,
}

impl RunStreamState {
    fn absorb(&mut self, events: impl IntoIterator<Item = SseEvent>) {
        for ev in events {
            if self.finished {
                break;
            }
            match decode_stream_event(&ev) {
                Decoded::Event(item) => self.pending.push_back(item),
                Decoded::Done => self.finished = true,
                Decoded::Skip => {}
            }
        }
    }
}

fn run_event_stream(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> RunEventStream {
    let state = RunStreamState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.push(&chunk);
                    st.absorb(events);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(e.into()));
                }
                None => {
                    let tail = st.decoder.finish();
                    st.absorb(tail);
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl RagBackend for OpenAiAssistants {
    fn name(&self) -> &str {
        "openai"
    }

    async fn create_thread(&self) -> RagResult<String> {
        let thread: WireId = self
            .send_json(self.request(Method::POST, "/threads").json(&serde_json::json!({})))
            .await?;
        Ok(thread.id)
    }

    async fn retrieve_thread(&self, thread_id: &str) -> RagResult<()> {
        match self
            .send(self.request(Method::GET, &format!("/threads/{}", thread_id)))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(RagError::ThreadNotFound(thread_id.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> RagResult<()> {
        let _: WireId = self
            .send_json(
                self.request(Method::POST, &format!("/threads/{}/messages", thread_id))
                    .json(&serde_json::json!({ "role": "user", "content": text })),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str) -> RagResult<Run> {
        let assistant_id = self.assistant_id()?;
        self.send_json(
            self.request(Method::POST, &format!("/threads/{}/runs", thread_id))
                .json(&serde_json::json!({ "assistant_id": assistant_id })),
        )
        .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> RagResult<Run> {
        self.send_json(self.request(
            Method::GET,
            &format!("/threads/{}/runs/{}", thread_id, run_id),
        ))
        .await
    }

    async fn latest_message(&self, thread_id: &str) -> RagResult<Option<ThreadMessage>> {
        let list: WireList<WireMessage> = self
            .send_json(
                self.request(Method::GET, &format!("/threads/{}/messages", thread_id))
                    .query(&[("order", "desc"), ("limit", "1")]),
            )
            .await?;
        Ok(list.data.into_iter().next().map(ThreadMessage::from))
    }

    async fn stream_run(&self, thread_id: &str) -> RagResult<RunEventStream> {
        let assistant_id = self.assistant_id()?;
        let resp = self
            .send(
                self.request(Method::POST, &format!("/threads/{}/runs", thread_id))
                    .header("Accept", "text/event-stream")
                    .json(&serde_json::json!({ "assistant_id": assistant_id, "stream": true })),
            )
            .await?;
        let body = resp.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed();
        Ok(run_event_stream(body))
    }

    async fn upload_file(&self, doc: &KnowledgeDocument) -> RagResult<String> {
        let part = reqwest::multipart::Part::text(doc.content.clone())
            .file_name(doc.filename.clone())
            .mime_str("text/plain")?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let file: WireId = self
            .send_json(self.request(Method::POST, "/files").multipart(form))
            .await?;
        Ok(file.id)
    }

    async fn attach_files(&self, file_ids: &[String]) -> RagResult<usize> {
        let vs = self.vector_store_id()?;
        let mut batch: WireFileBatch = self
            .send_json(
                self.request(Method::POST, &format!("/vector_stores/{}/file_batches", vs))
                    .json(&serde_json::json!({ "file_ids": file_ids })),
            )
            .await?;
        let deadline = Instant::now() + self.max_wait;
        while batch.status == "in_progress" {
            if Instant::now() >= deadline {
                return Err(RagError::Timeout(self.max_wait));
            }
            tokio::time::sleep(self.poll_interval).await;
            batch = self
                .send_json(self.request(
                    Method::GET,
                    &format!("/vector_stores/{}/file_batches/{}", vs, batch.id),
                ))
                .await?;
        }
        tracing::debug!(
            target: "folio::publish",
            batch_id = %batch.id,
            status = %batch.status,
            completed = batch.file_counts.completed,
            "File batch settled"
        );
        Ok(batch.file_counts.completed)
    }

    async fn list_index_files(&self) -> RagResult<Vec<IndexFile>> {
        let vs = self.vector_store_id()?;
        let mut files = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut req = self
                .request(Method::GET, &format!("/vector_stores/{}/files", vs))
                .query(&[("limit", LIST_PAGE_SIZE.to_string())]);
            if let Some(cursor) = &after {
                req = req.query(&[("after", cursor)]);
            }
            let page: WireList<WireId> = self.send_json(req).await?;
            let has_more = page.has_more;
            files.extend(page.data.into_iter().map(|f| IndexFile { id: f.id }));
            match (has_more, files.last()) {
                (true, Some(last)) => after = Some(last.id.clone()),
                _ => break,
            }
        }
        Ok(files)
    }

    async fn remove_index_file(&self, file_id: &str) -> RagResult<()> {
        let vs = self.vector_store_id()?;
        self.send(self.request(
            Method::DELETE,
            &format!("/vector_stores/{}/files/{}", vs, file_id),
        ))
        .await?;
        Ok(())
    }

    async fn index_file_count(&self) -> RagResult<usize> {
        let vs = self.vector_store_id()?;
        let store: WireVectorStore = self
            .send_json(self.request(Method::GET, &format!("/vector_stores/{}", vs)))
            .await?;
        Ok(store.file_counts.completed)
    }
}
