//! In-process retrieval backend.
//!
//! Threads, uploaded files and the index live in `DashMap`s. Answers come from naive keyword
//! retrieval over the indexed documents and cite the best-scoring one. Runs pass through
//! `queued` and `in_progress` before settling, so the polling path is exercised end to end.
//! Used with `RAG_BACKEND=local` and as the test double for the chat and session flows.

use super::{
    Annotation, IndexFile, MessageContent, RagBackend, Run, RunError, RunEventStream, RunStatus,
    RunStreamEvent, ThreadMessage,
};
use crate::corpus::KnowledgeDocument;
use crate::error::{RagError, RagResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const LOCAL_MODEL: &str = "local-keyword";

const NO_MATCH_REPLY: &str = "I couldn't find anything about that in the portfolio knowledge base.";
const MAX_SNIPPET_LINES: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "are", "what", "who", "how", "does", "did", "his", "her", "their", "your",
    "you", "about", "with", "for", "tell", "can", "has", "have", "which", "this", "that",
];

/// How the next run settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRunOutcome {
    /// Retrieval answer appended, status `completed`.
    Reply,
    /// `completed` without appending an assistant message.
    Silent,
    /// Settles in the given terminal status without a reply.
    Terminal(RunStatus),
    /// Never leaves `in_progress`.
    Stall,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    role: &'static str,
    text: String,
    citations: Vec<String>,
}

#[derive(Debug, Clone)]
struct LocalRun {
    thread_id: String,
    run: Run,
    polls_left: u32,
    outcome: LocalRunOutcome,
}

pub struct LocalRagBackend {
    threads: DashMap<String, Vec<StoredMessage>>,
    runs: DashMap<String, LocalRun>,
    files: DashMap<String, KnowledgeDocument>,
    index: DashMap<String, ()>,
    next_file: AtomicUsize,
    user_messages: AtomicUsize,
    threads_created: AtomicUsize,
    polls_per_run: u32,
    forced: Mutex<Option<LocalRunOutcome>>,
}

impl Default for LocalRagBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRagBackend {
    pub fn new() -> Self {
        Self {
            threads: DashMap::new(),
            runs: DashMap::new(),
            files: DashMap::new(),
            index: DashMap::new(),
            next_file: AtomicUsize::new(1),
            user_messages: AtomicUsize::new(0),
            threads_created: AtomicUsize::new(0),
            polls_per_run: 1,
            forced: Mutex::new(None),
        }
    }

    /// Number of `in_progress` polls a run reports before settling.
    pub fn with_polls_per_run(mut self, polls: u32) -> Self {
        self.polls_per_run = polls;
        self
    }

    /// Drop a thread so the next lookup reports it as not found.
    pub fn forget_thread(&self, thread_id: &str) {
        self.threads.remove(thread_id);
    }

    /// Override how the next run settles (one-shot).
    pub fn force_next_run(&self, outcome: LocalRunOutcome) {
        let mut forced = self.forced.lock().unwrap_or_else(|e| e.into_inner());
        *forced = Some(outcome);
    }

    /// Total user messages appended across all threads.
    pub fn user_message_count(&self) -> usize {
        self.user_messages.load(Ordering::SeqCst)
    }

    pub fn threads_created(&self) -> usize {
        self.threads_created.load(Ordering::SeqCst)
    }

    pub fn thread_len(&self, thread_id: &str) -> Option<usize> {
        self.threads.get(thread_id).map(|t| t.len())
    }

    /// Polled runs that have not reached a terminal status yet.
    pub fn tracked_runs(&self) -> usize {
        self.runs.len()
    }

    fn take_outcome(&self) -> LocalRunOutcome {
        let mut forced = self.forced.lock().unwrap_or_else(|e| e.into_inner());
        forced.take().unwrap_or(LocalRunOutcome::Reply)
    }

    fn ensure_thread(&self, thread_id: &str) -> RagResult<()> {
        if self.threads.contains_key(thread_id) {
            Ok(())
        } else {
            Err(RagError::ThreadNotFound(thread_id.to_string()))
        }
    }

    fn last_user_text(&self, thread_id: &str) -> String {
        self.threads
            .get(thread_id)
            .and_then(|t| t.iter().rev().find(|m| m.role == "user").map(|m| m.text.clone()))
            .unwrap_or_default()
    }

    /// Best indexed document for `question` and a short snippet of its matching lines.
    fn retrieve(&self, question: &str) -> Option<(String, String)> {
        let terms = query_terms(question);
        if terms.is_empty() {
            return None;
        }
        let mut best: Option<(usize, String, String)> = None;
        for entry in self.index.iter() {
            let file_id = entry.key();
            let Some(doc) = self.files.get(file_id) else {
                continue;
            };
            let haystack = doc.content.to_lowercase();
            let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            if score == 0 {
                continue;
            }
            // ties broken by filename so answers are stable
            let better = match &best {
                None => true,
                Some((s, _, name)) => score > *s || (score == *s && doc.filename < *name),
            };
            if better {
                best = Some((score, file_id.clone(), doc.filename.clone()));
            }
        }
        let (_, file_id, _) = best?;
        let doc = self.files.get(&file_id)?;
        Some((file_id.clone(), snippet(&doc.content, &terms)))
    }

    fn answer(&self, thread_id: &str) -> (String, Vec<String>) {
        match self.retrieve(&self.last_user_text(thread_id)) {
            Some((file_id, text)) => (text, vec![file_id]),
            None => (NO_MATCH_REPLY.to_string(), Vec::new()),
        }
    }

    fn append_reply(&self, thread_id: &str, text: String, citations: Vec<String>) {
        if let Some(mut thread) = self.threads.get_mut(thread_id) {
            thread.push(StoredMessage {
                id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
                role: "assistant",
                text,
                citations,
            });
        }
    }

    fn new_run() -> Run {
        Run {
            id: format!("run_{}", uuid::Uuid::new_v4().simple()),
            status: RunStatus::Queued,
            model: LOCAL_MODEL.to_string(),
            last_error: None,
        }
    }

    /// Apply the outcome to a run that has finished polling.
    fn settle(&self, thread_id: &str, run: &mut Run, outcome: LocalRunOutcome) {
        match outcome {
            LocalRunOutcome::Reply => {
                let (text, citations) = self.answer(thread_id);
                self.append_reply(thread_id, text, citations);
                run.status = RunStatus::Completed;
            }
            LocalRunOutcome::Silent => run.status = RunStatus::Completed,
            LocalRunOutcome::Terminal(status) => {
                run.status = status;
                if status == RunStatus::Failed {
                    run.last_error = Some(RunError {
                        code: Some("server_error".into()),
                        message: "Simulated run failure".into(),
                    });
                }
            }
            LocalRunOutcome::Stall => run.status = RunStatus::InProgress,
        }
    }
}

fn query_terms(question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(|w| w.trim_end_matches('s').to_string())
        .filter(|w| w.len() >= 3 && seen.insert(w.clone()))
        .collect()
}

fn snippet(content: &str, terms: &[String]) -> String {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let matching: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| {
            let lower = l.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .take(MAX_SNIPPET_LINES)
        .collect();
    let picked = if matching.is_empty() {
        lines.into_iter().take(MAX_SNIPPET_LINES).collect()
    } else {
        matching
    };
    picked.join("\n")
}

/// Split text into word-sized fragments that concatenate back to the original.
fn fragments(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c.is_whitespace() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[async_trait]
impl RagBackend for LocalRagBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_thread(&self) -> RagResult<String> {
        let id = format!("thread_{}", uuid::Uuid::new_v4().simple());
        self.threads.insert(id.clone(), Vec::new());
        self.threads_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn retrieve_thread(&self, thread_id: &str) -> RagResult<()> {
        self.ensure_thread(thread_id)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> RagResult<()> {
        let mut thread = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| RagError::ThreadNotFound(thread_id.to_string()))?;
        thread.push(StoredMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            role: "user",
            text: text.to_string(),
            citations: Vec::new(),
        });
        self.user_messages.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_run(&self, thread_id: &str) -> RagResult<Run> {
        self.ensure_thread(thread_id)?;
        let outcome = self.take_outcome();
        let run = Self::new_run();
        self.runs.insert(
            run.id.clone(),
            LocalRun {
                thread_id: thread_id.to_string(),
                run: run.clone(),
                polls_left: self.polls_per_run,
                outcome,
            },
        );
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> RagResult<Run> {
        let mut entry = self
            .runs
            .get_mut(run_id)
            .filter(|r| r.thread_id == thread_id)
            .ok_or_else(|| RagError::Api {
                status: 404,
                body: format!("No run found with id '{}'", run_id),
            })?;
        if entry.run.status.is_pending() {
            if entry.outcome == LocalRunOutcome::Stall || entry.polls_left > 0 {
                entry.polls_left = entry.polls_left.saturating_sub(1);
                entry.run.status = RunStatus::InProgress;
            } else {
                let outcome = entry.outcome;
                let mut run = entry.run.clone();
                drop(entry);
                self.settle(thread_id, &mut run, outcome);
                // Terminal runs are reported once and then forgotten.
                if run.status.is_pending() {
                    if let Some(mut e) = self.runs.get_mut(run_id) {
                        e.run = run.clone();
                    }
                } else {
                    self.runs.remove(run_id);
                }
                return Ok(run);
            }
        }
        Ok(entry.run.clone())
    }

    async fn latest_message(&self, thread_id: &str) -> RagResult<Option<ThreadMessage>> {
        let thread = self
            .threads
            .get(thread_id)
            .ok_or_else(|| RagError::ThreadNotFound(thread_id.to_string()))?;
        Ok(thread.last().map(|m| ThreadMessage {
            id: m.id.clone(),
            role: m.role.to_string(),
            content: vec![MessageContent::Text {
                value: m.text.clone(),
                annotations: m
                    .citations
                    .iter()
                    .map(|id| Annotation::FileCitation { file_id: id.clone() })
                    .collect(),
            }],
        }))
    }

    async fn stream_run(&self, thread_id: &str) -> RagResult<RunEventStream> {
        self.ensure_thread(thread_id)?;
        let outcome = self.take_outcome();
        // Streamed runs are never polled, so they are not tracked.
        let mut run = Self::new_run();
        if outcome == LocalRunOutcome::Stall {
            return Ok(stream::pending().boxed());
        }
        let answer = match outcome {
            LocalRunOutcome::Reply => Some(self.answer(thread_id)),
            _ => None,
        };
        let mut events: Vec<RagResult<RunStreamEvent>> = Vec::new();
        match answer {
            Some((text, citations)) => {
                events.extend(
                    fragments(&text)
                        .into_iter()
                        .map(|f| Ok(RunStreamEvent::TextDelta(f))),
                );
                self.append_reply(thread_id, text, citations);
                run.status = RunStatus::Completed;
                events.push(Ok(RunStreamEvent::Completed(run.clone())));
            }
            None => {
                self.settle(thread_id, &mut run, outcome);
                if run.status == RunStatus::Completed {
                    events.push(Ok(RunStreamEvent::Completed(run.clone())));
                } else {
                    events.push(Ok(RunStreamEvent::Terminated(run.clone())));
                }
            }
        }
        Ok(stream::iter(events).boxed())
    }

    async fn upload_file(&self, doc: &KnowledgeDocument) -> RagResult<String> {
        let id = format!("file-local-{}", self.next_file.fetch_add(1, Ordering::SeqCst));
        self.files.insert(id.clone(), doc.clone());
        Ok(id)
    }

    async fn attach_files(&self, file_ids: &[String]) -> RagResult<usize> {
        let mut attached = 0;
        for id in file_ids {
            if self.files.contains_key(id) {
                self.index.insert(id.clone(), ());
                attached += 1;
            }
        }
        Ok(attached)
    }

    async fn list_index_files(&self) -> RagResult<Vec<IndexFile>> {
        Ok(self
            .index
            .iter()
            .map(|e| IndexFile { id: e.key().clone() })
            .collect())
    }

    async fn remove_index_file(&self, file_id: &str) -> RagResult<()> {
        self.index.remove(file_id);
        Ok(())
    }

    async fn index_file_count(&self) -> RagResult<usize> {
        Ok(self.index.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn indexed(backend: &LocalRagBackend, docs: &[(&str, &str)]) -> Vec<String> {
        let mut ids = Vec::new();
        for (name, content) in docs {
            let doc = KnowledgeDocument {
                filename: name.to_string(),
                content: content.to_string(),
            };
            ids.push(backend.upload_file(&doc).await.unwrap());
        }
        backend.attach_files(&ids).await.unwrap();
        ids
    }

    #[tokio::test]
    async fn run_polls_then_answers_with_citation() {
        let backend = LocalRagBackend::new();
        let ids = indexed(
            &backend,
            &[
                ("skills.txt", "Frontend Skills\n- React\n- Next.js"),
                ("projects.txt", "Project: Portfolio Website\nBuilt with Next.js"),
            ],
        )
        .await;
        let thread = backend.create_thread().await.unwrap();
        backend.add_user_message(&thread, "Which frontend skills?").await.unwrap();
        let run = backend.create_run(&thread).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);

        let polled = backend.retrieve_run(&thread, &run.id).await.unwrap();
        assert_eq!(polled.status, RunStatus::InProgress);
        let done = backend.retrieve_run(&thread, &run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);

        let reply = backend.latest_message(&thread).await.unwrap().unwrap();
        assert!(reply.is_assistant());
        assert!(reply.text().contains("Frontend Skills"));
        assert_eq!(reply.citations(), vec![ids[0].clone()]);
    }

    #[tokio::test]
    async fn settled_runs_are_dropped() {
        let backend = LocalRagBackend::new();
        let thread = backend.create_thread().await.unwrap();
        backend.add_user_message(&thread, "hello").await.unwrap();
        for _ in 0..3 {
            let run = backend.create_run(&thread).await.unwrap();
            assert_eq!(backend.tracked_runs(), 1);
            let polled = backend.retrieve_run(&thread, &run.id).await.unwrap();
            assert!(polled.status.is_pending());
            let done = backend.retrieve_run(&thread, &run.id).await.unwrap();
            assert_eq!(done.status, RunStatus::Completed);
            assert_eq!(backend.tracked_runs(), 0);
        }

        let _ = backend.stream_run(&thread).await.unwrap().collect::<Vec<_>>().await;
        assert_eq!(backend.tracked_runs(), 0);
    }

    #[tokio::test]
    async fn forgotten_thread_is_not_found() {
        let backend = LocalRagBackend::new();
        let thread = backend.create_thread().await.unwrap();
        backend.forget_thread(&thread);
        let err = backend.retrieve_thread(&thread).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn forced_failure_carries_detail() {
        let backend = LocalRagBackend::new().with_polls_per_run(0);
        let thread = backend.create_thread().await.unwrap();
        backend.force_next_run(LocalRunOutcome::Terminal(RunStatus::Failed));
        let run = backend.create_run(&thread).await.unwrap();
        let settled = backend.retrieve_run(&thread, &run.id).await.unwrap();
        assert_eq!(settled.status, RunStatus::Failed);
        assert!(settled.last_error.is_some());
        // one-shot
        let next = backend.create_run(&thread).await.unwrap();
        let next = backend.retrieve_run(&thread, &next.id).await.unwrap();
        assert_eq!(next.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn stream_fragments_concatenate_to_stored_reply() {
        let backend = LocalRagBackend::new();
        indexed(&backend, &[("contact.txt", "Contact Information\n- Email: me@example.com")]).await;
        let thread = backend.create_thread().await.unwrap();
        backend.add_user_message(&thread, "contact email").await.unwrap();
        let events: Vec<_> = backend.stream_run(&thread).await.unwrap().collect().await;
        let mut text = String::new();
        for ev in &events[..events.len() - 1] {
            match ev {
                Ok(RunStreamEvent::TextDelta(t)) => text.push_str(t),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(events.last(), Some(Ok(RunStreamEvent::Completed(_)))));
        let stored = backend.latest_message(&thread).await.unwrap().unwrap();
        assert_eq!(stored.text(), text);
    }

    #[tokio::test]
    async fn index_clear_and_count() {
        let backend = LocalRagBackend::new();
        indexed(&backend, &[("a.txt", "alpha"), ("b.txt", "beta")]).await;
        assert_eq!(backend.index_file_count().await.unwrap(), 2);
        for f in backend.list_index_files().await.unwrap() {
            backend.remove_index_file(&f.id).await.unwrap();
        }
        assert_eq!(backend.index_file_count().await.unwrap(), 0);
    }

    #[test]
    fn query_terms_drop_stopwords_and_plurals() {
        assert_eq!(query_terms("What are your SKILLS?"), vec!["skill".to_string()]);
        assert!(query_terms("who are you").is_empty());
    }
}
