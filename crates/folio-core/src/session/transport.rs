//! How the session talks to the chat endpoint.

use crate::chat::ChatRequest;
use crate::error::TransportError;
use crate::sse::{SseDecoder, TextFragment, DONE_SENTINEL};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use std::time::Duration;

/// Response header carrying the conversation thread of a streamed reply.
pub const THREAD_ID_HEADER: &str = "x-thread-id";

pub type FragmentStream = BoxStream<'static, Result<String, TransportError>>;

/// What the endpoint answered, by content type.
pub enum TransportReply {
    Json {
        response: Option<String>,
        thread_id: Option<String>,
    },
    /// Text deltas in arrival order; the session accumulates them.
    Stream {
        thread_id: Option<String>,
        fragments: FragmentStream,
    },
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply, TransportError>;
}

#[derive(Deserialize)]
struct JsonReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// `endpoint` is the full chat URL, e.g. `http://127.0.0.1:8090/api/chat`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply, TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream, application/json")
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let is_stream = header(reqwest::header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if is_stream {
            let thread_id = header(THREAD_ID_HEADER).filter(|t| !t.is_empty());
            let body = resp.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed();
            return Ok(TransportReply::Stream {
                thread_id,
                fragments: decode_fragments(body),
            });
        }

        let reply: JsonReply = resp
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(TransportReply::Json {
            response: reply.response,
            thread_id: reply.thread_id,
        })
    }
}

/// Turn a chat event stream body into text deltas, stopping at the done sentinel.
/// Events that are not `{"text": ...}` are skipped.
pub fn decode_fragments(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> FragmentStream {
    let stream = async_stream::try_stream! {
        let mut body = body;
        let mut decoder = SseDecoder::new();
        let mut done = false;
        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(TransportError::from)?;
            for ev in decoder.push(&chunk) {
                if ev.data == DONE_SENTINEL {
                    done = true;
                    break 'read;
                }
                if let Ok(frag) = serde_json::from_str::<TextFragment>(&ev.data) {
                    yield frag.text;
                }
            }
        }
        // An unterminated trailing event only counts if the sentinel never arrived.
        if !done {
            if let Some(ev) = decoder.finish() {
                if ev.data != DONE_SENTINEL {
                    if let Ok(frag) = serde_json::from_str::<TextFragment>(&ev.data) {
                        yield frag.text;
                    }
                }
            }
        }
    };
    stream.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::{encode_done, encode_text_event};
    use futures_util::stream;

    fn body(chunks: Vec<String>) -> BoxStream<'static, reqwest::Result<Vec<u8>>> {
        stream::iter(chunks.into_iter().map(|c| Ok::<_, reqwest::Error>(c.into_bytes()))).boxed()
    }

    #[tokio::test]
    async fn fragments_stop_at_done() {
        let wire = format!(
            "{}{}{}{}",
            encode_text_event("Hello"),
            encode_text_event(" world"),
            encode_done(),
            encode_text_event("ignored"),
        );
        // Split mid-event to exercise buffering.
        let (a, b) = wire.split_at(9);
        let got: Vec<String> = decode_fragments(body(vec![a.to_string(), b.to_string()]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(got, vec!["Hello".to_string(), " world".to_string()]);
    }

    #[tokio::test]
    async fn unterminated_tail_after_done_is_dropped() {
        let wire = "data:{\"text\":\"Hello\"}\n\ndata: [DONE]\n\ndata:{\"text\":\" LEAK\"}";
        let got: Vec<String> = decode_fragments(body(vec![wire.to_string()]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(got, vec!["Hello".to_string()]);
    }

    #[tokio::test]
    async fn unterminated_tail_without_done_is_kept() {
        let wire = "data:{\"text\":\"Hel\"}\n\ndata:{\"text\":\"lo\"}";
        let got: Vec<String> = decode_fragments(body(vec![wire.to_string()]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(got, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let got: Vec<_> = decode_fragments(body(vec![encode_done()])).collect().await;
        assert!(got.is_empty());
    }
}
