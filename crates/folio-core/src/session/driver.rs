//! Runs the session state machine against real storage and a real transport.

use super::bus::WidgetSignal;
use super::machine::{reduce, Effect, SessionEvent, SessionState};
use super::store::{clear_history, load_history, save_history, KeyValueStore};
use super::transport::{ChatTransport, TransportReply};
use crate::chat::ChatRequest;
use chrono::Utc;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct SessionDriver {
    state: SessionState,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn ChatTransport>,
}

impl SessionDriver {
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            state: SessionState::default(),
            store,
            transport,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Restore persisted history. Must run before anything is persisted.
    pub fn hydrate(&mut self) {
        let history = load_history(self.store.as_ref()).unwrap_or_else(|e| {
            tracing::warn!(target: "folio::session", "Failed to load chat history: {}", e);
            Vec::new()
        });
        tracing::debug!(target: "folio::session", restored = history.len(), "Session hydrated");
        self.apply(SessionEvent::Hydrate {
            history,
            at: Utc::now(),
        });
    }

    /// Type `text` and submit it.
    pub async fn submit(&mut self, text: &str) {
        self.apply(SessionEvent::InputChanged(text.to_string()));
        self.dispatch(SessionEvent::Submit { at: Utc::now() }).await;
    }

    /// Send one of the suggestion chips.
    pub async fn pick_suggestion(&mut self, text: &str) {
        self.dispatch(SessionEvent::SuggestionPicked {
            text: text.to_string(),
            at: Utc::now(),
        })
        .await;
    }

    /// Apply one event and run every effect it leads to, including the network exchange.
    pub async fn dispatch(&mut self, event: SessionEvent) {
        let mut pending: VecDeque<Effect> = self.apply(event).into();
        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::SendRequest(request) => self.exchange(request).await,
                Effect::ScheduleSubmit { text, delay } => {
                    tokio::time::sleep(delay).await;
                    pending.extend(self.apply(SessionEvent::InputChanged(text)));
                    pending.extend(self.apply(SessionEvent::Submit { at: Utc::now() }));
                }
                Effect::Persist | Effect::ClearStorage => {}
            }
        }
    }

    /// Handle widget signals until every bus handle is dropped.
    pub async fn listen(&mut self, mut signals: broadcast::Receiver<WidgetSignal>) {
        loop {
            match signals.recv().await {
                Ok(signal) => self.dispatch(SessionEvent::External(signal)).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "folio::session", skipped, "Widget signals dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Reduce, run storage effects inline, hand back the rest.
    fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        let transition = reduce(&self.state, event);
        self.state = transition.state;
        let mut rest = Vec::new();
        for effect in transition.effects {
            match effect {
                Effect::Persist => {
                    if let Err(e) = save_history(self.store.as_ref(), &self.state.messages) {
                        tracing::warn!(target: "folio::session", "Failed to persist chat history: {}", e);
                    }
                }
                Effect::ClearStorage => {
                    if let Err(e) = clear_history(self.store.as_ref()) {
                        tracing::warn!(target: "folio::session", "Failed to clear chat history: {}", e);
                    }
                }
                other => rest.push(other),
            }
        }
        rest
    }

    async fn exchange(&mut self, request: ChatRequest) {
        let reply = match self.transport.send(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(target: "folio::session", "Chat request failed: {}", e);
                self.apply(SessionEvent::TransportFailed { at: Utc::now() });
                return;
            }
        };

        match reply {
            TransportReply::Json {
                response,
                thread_id,
            } => {
                self.apply(SessionEvent::ReplyReceived {
                    response,
                    thread_id,
                    at: Utc::now(),
                });
            }
            TransportReply::Stream {
                thread_id,
                mut fragments,
            } => {
                self.apply(SessionEvent::StreamOpened {
                    thread_id,
                    at: Utc::now(),
                });
                let mut accumulated = String::new();
                while let Some(fragment) = fragments.next().await {
                    match fragment {
                        Ok(text) => {
                            accumulated.push_str(&text);
                            self.apply(SessionEvent::StreamText {
                                accumulated: accumulated.clone(),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(target: "folio::session", "Chat stream broke off: {}", e);
                            self.apply(SessionEvent::TransportFailed { at: Utc::now() });
                            return;
                        }
                    }
                }
                self.apply(SessionEvent::StreamEnded);
            }
        }
    }
}
