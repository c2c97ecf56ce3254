//! POST /api/chat: one JSON reply, or an event stream of `{"text"}` deltas ending in `[DONE]`.

use super::ApiError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use folio_core::chat::ChatStream;
use folio_core::sse::{text_event_data, DONE_SENTINEL};
use folio_core::ChatRequest;
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

pub const THREAD_ID_HEADER: &str = "x-thread-id";

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return ApiError::bad_request("Invalid request: message is required").into_response();
    }
    tracing::info!(
        target: "folio::chat",
        thread_id = req.thread_id.as_deref().unwrap_or("-"),
        stream = req.wants_stream(),
        "Chat request"
    );

    if req.wants_stream() || accepts_event_stream(&headers) {
        return stream_reply(state.chat.reply_stream(&req).await);
    }
    Json(state.chat.reply(&req).await).into_response()
}

fn stream_reply(reply: ChatStream) -> Response {
    let ChatStream {
        thread_id,
        mut fragments,
    } = reply;

    let stream = async_stream::stream! {
        while let Some(text) = fragments.next().await {
            yield Ok::<_, Infallible>(Event::default().data(text_event_data(&text)));
        }
        yield Ok(Event::default().data(DONE_SENTINEL));
    };

    let mut response = Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response();
    if let Some(value) = thread_id.and_then(|t| HeaderValue::from_str(&t).ok()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(THREAD_ID_HEADER), value);
    }
    response
}
