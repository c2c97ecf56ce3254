//! Chat boundary: the only place RAG failures are turned into fallback answers.
//!
//! `reply` never fails. An unconfigured backend answers from the fallback table with
//! `rag.enabled = false`; a configured one that fails answers from the same table with
//! `rag.enabled = true` and no citations, after logging the cause.

use crate::backend::RagBackend;
use crate::config::RagSettings;
use crate::engine::GroundedAnswerEngine;
use crate::error::RagError;
use crate::fallback::fallback;
use crate::threads::ThreadManager;
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Model name reported for fallback answers.
pub const FALLBACK_MODEL: &str = "fallback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Accepted for compatibility; the thread carries the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<HistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagInfo {
    pub enabled: bool,
    pub citations: Vec<String>,
    #[serde(rename = "threadBased")]
    pub thread_based: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    pub response: String,
    pub thread_id: Option<String>,
    pub model: String,
    pub rag: RagInfo,
}

impl ChatReply {
    fn fallback(message: &str, thread_id: Option<String>, rag_enabled: bool) -> Self {
        Self {
            success: true,
            response: fallback(message).to_string(),
            thread_id,
            model: FALLBACK_MODEL.to_string(),
            rag: RagInfo {
                enabled: rag_enabled,
                citations: Vec::new(),
                thread_based: false,
            },
        }
    }
}

/// Streamed reply: the thread to remember and the text fragments (deltas) in order.
pub struct ChatStream {
    pub thread_id: Option<String>,
    pub fragments: BoxStream<'static, String>,
}

struct RagPipeline {
    threads: ThreadManager,
    engine: GroundedAnswerEngine,
}

pub struct ChatService {
    rag: Option<RagPipeline>,
}

impl ChatService {
    /// Grounded answers need a backend and configured settings; otherwise fallback only.
    pub fn new(backend: Option<Arc<dyn RagBackend>>, settings: &RagSettings) -> Self {
        let rag = backend
            .filter(|_| settings.is_configured())
            .map(|backend| RagPipeline {
                threads: ThreadManager::new(backend.clone()),
                engine: GroundedAnswerEngine::new(backend, settings),
            });
        if rag.is_none() {
            tracing::warn!(target: "folio::chat", "RAG not configured; chat answers from fallback responses");
        }
        Self { rag }
    }

    pub fn unconfigured() -> Self {
        Self { rag: None }
    }

    pub fn is_configured(&self) -> bool {
        self.rag.is_some()
    }

    pub async fn reply(&self, req: &ChatRequest) -> ChatReply {
        let message = req.message.trim();
        let Some(rag) = &self.rag else {
            return ChatReply::fallback(message, None, false);
        };

        let thread_id = match rag.threads.ensure_thread(req.thread_id.as_deref()).await {
            Ok(id) => id,
            Err(e) => {
                log_rag_failure(&e, req.thread_id.as_deref());
                return ChatReply::fallback(message, req.thread_id.clone(), true);
            }
        };

        match rag.engine.answer(&thread_id, message).await {
            Ok(answer) if !answer.response.trim().is_empty() => ChatReply {
                success: true,
                response: answer.response,
                thread_id: Some(answer.thread_id),
                model: answer.model,
                rag: RagInfo {
                    enabled: true,
                    citations: answer.citations,
                    thread_based: true,
                },
            },
            Ok(_) => {
                tracing::warn!(target: "folio::chat", thread_id = %thread_id, "Empty grounded answer; using fallback");
                ChatReply::fallback(message, Some(thread_id), true)
            }
            Err(e) => {
                log_rag_failure(&e, Some(thread_id.as_str()));
                ChatReply::fallback(message, Some(thread_id), true)
            }
        }
    }

    /// Streamed reply. Failures end the stream early (possibly with no fragments at all);
    /// the client substitutes the fallback for an empty stream.
    pub async fn reply_stream(&self, req: &ChatRequest) -> ChatStream {
        let message = req.message.trim().to_string();
        let Some(rag) = &self.rag else {
            let text = fallback(&message).to_string();
            return ChatStream {
                thread_id: None,
                fragments: stream::once(future::ready(text)).boxed(),
            };
        };

        let thread_id = match rag.threads.ensure_thread(req.thread_id.as_deref()).await {
            Ok(id) => id,
            Err(e) => {
                log_rag_failure(&e, req.thread_id.as_deref());
                return ChatStream {
                    thread_id: req.thread_id.clone(),
                    fragments: stream::empty().boxed(),
                };
            }
        };

        let fragments = match rag.engine.answer_stream(&thread_id, &message).await {
            Ok(texts) => {
                let tid = thread_id.clone();
                texts
                    .scan((), move |_, item| {
                        future::ready(match item {
                            Ok(text) => Some(text),
                            Err(e) => {
                                log_rag_failure(&e, Some(tid.as_str()));
                                None
                            }
                        })
                    })
                    .boxed()
            }
            Err(e) => {
                log_rag_failure(&e, Some(thread_id.as_str()));
                stream::empty().boxed()
            }
        };

        ChatStream {
            thread_id: Some(thread_id),
            fragments,
        }
    }
}

fn log_rag_failure(err: &RagError, thread_id: Option<&str>) {
    tracing::warn!(
        target: "folio::chat",
        thread_id = thread_id.unwrap_or("-"),
        "RAG failed, answering with fallback: {}",
        err
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_minimal_and_full_bodies() {
        let minimal: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(minimal, ChatRequest::new("hi"));
        assert!(!minimal.wants_stream());

        let full: ChatRequest = serde_json::from_value(serde_json::json!({
            "message": "skills?",
            "thread_id": "thread_1",
            "conversation_history": [{ "role": "user", "content": "hello" }],
            "stream": true
        }))
        .unwrap();
        assert_eq!(full.thread_id.as_deref(), Some("thread_1"));
        assert!(full.wants_stream());
    }

    #[test]
    fn reply_wire_shape() {
        let reply = ChatReply::fallback("hello", None, false);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["thread_id"], serde_json::Value::Null);
        assert_eq!(json["rag"]["enabled"], false);
        assert_eq!(json["rag"]["threadBased"], false);
        assert_eq!(json["response"], fallback("hello"));
    }

    #[tokio::test]
    async fn unconfigured_service_answers_from_fallback() {
        let service = ChatService::new(None, &RagSettings::default());
        assert!(!service.is_configured());
        let reply = service.reply(&ChatRequest::new("What are your skills?")).await;
        assert!(reply.success);
        assert!(!reply.rag.enabled);
        assert_eq!(reply.response, fallback("What are your skills?"));

        let stream = service.reply_stream(&ChatRequest::new("hi")).await;
        let fragments: Vec<String> = stream.fragments.collect().await;
        assert_eq!(fragments, vec![fallback("hi").to_string()]);
    }
}
