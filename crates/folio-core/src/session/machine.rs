//! Chat session state machine.
//!
//! [`reduce`] is pure: it takes the current state and an event and returns the next state
//! plus the side effects the caller must run (storage writes, the network call, a delayed
//! prefill submit). Timestamps arrive on the events so the reducer never reads a clock.

use super::bus::{WidgetAction, WidgetSignal};
use super::message::{Message, Reaction, Role};
use crate::chat::{ChatRequest, HistoryEntry};
use crate::fallback::fallback;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Upstream history window, welcome message excluded.
pub const HISTORY_WINDOW: usize = 20;
/// Suggestion chips hide for good once the conversation grows past this many messages.
pub const SUGGESTION_THRESHOLD: usize = 2;
pub const PREFILL_DELAY: Duration = Duration::from_millis(400);

/// Chips offered under a fresh conversation.
pub const SUGGESTED_PROMPTS: &[&str] = &[
    "What are your skills?",
    "Tell me about your projects",
    "What experience do you have?",
    "How can I contact you?",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub input: String,
    pub phase: Phase,
    pub is_open: bool,
    pub hydrated: bool,
    pub suggestions_visible: bool,
    pub thread_id: Option<String>,
    /// Text of the in-flight user message; feeds the fallback answer.
    pub pending_prompt: Option<String>,
    /// Id of the assistant placeholder being streamed into.
    pub streaming_id: Option<String>,
    seq: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            input: String::new(),
            phase: Phase::Idle,
            is_open: false,
            hydrated: false,
            suggestions_visible: true,
            thread_id: None,
            pending_prompt: None,
            streaming_id: None,
            seq: 0,
        }
    }
}

impl SessionState {
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn next_id(&mut self, at: DateTime<Utc>) -> String {
        self.seq += 1;
        format!("{}-{}", at.timestamp_millis(), self.seq)
    }

    fn push(&mut self, role: Role, content: impl Into<String>, at: DateTime<Utc>) -> String {
        let id = self.next_id(at);
        self.messages.push(Message::new(id.clone(), role, content, at));
        id
    }

    fn hide_suggestions_if_long(&mut self) {
        if self.messages.len() > SUGGESTION_THRESHOLD {
            self.suggestions_visible = false;
        }
    }

    /// Append the user message, enter `Sending` and build the request for it.
    fn begin_send(&mut self, text: String, at: DateTime<Utc>) -> Effect {
        let history = self.outgoing_history();
        self.push(Role::User, text.clone(), at);
        self.phase = Phase::Sending;
        self.pending_prompt = Some(text.clone());
        self.hide_suggestions_if_long();
        Effect::SendRequest(ChatRequest {
            message: text,
            thread_id: self.thread_id.clone(),
            conversation_history: Some(history),
            stream: Some(true),
        })
    }

    fn fallback_text(&self) -> String {
        fallback(self.pending_prompt.as_deref().unwrap_or_default()).to_string()
    }

    fn settle(&mut self) {
        self.phase = Phase::Idle;
        self.pending_prompt = None;
        self.streaming_id = None;
    }

    fn placeholder_mut(&mut self) -> Option<&mut Message> {
        let id = self.streaming_id.as_deref()?;
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Last [`HISTORY_WINDOW`] messages in wire form, welcome excluded.
    pub fn outgoing_history(&self) -> Vec<HistoryEntry> {
        let kept: Vec<&Message> = self.messages.iter().filter(|m| !m.is_welcome()).collect();
        let start = kept.len().saturating_sub(HISTORY_WINDOW);
        kept[start..]
            .iter()
            .map(|m| HistoryEntry {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Restore persisted history; an empty history shows the welcome message.
    Hydrate { history: Vec<Message>, at: DateTime<Utc> },
    InputChanged(String),
    /// Submit the current input.
    Submit { at: DateTime<Utc> },
    /// A suggestion chip was clicked; sent as-is, the input box is left alone.
    SuggestionPicked { text: String, at: DateTime<Utc> },
    /// Streaming response accepted; adds the empty assistant placeholder.
    StreamOpened { thread_id: Option<String>, at: DateTime<Utc> },
    /// Running total of streamed text so far.
    StreamText { accumulated: String },
    StreamEnded,
    ReplyReceived {
        response: Option<String>,
        thread_id: Option<String>,
        at: DateTime<Utc>,
    },
    TransportFailed { at: DateTime<Utc> },
    React { id: String, reaction: Reaction },
    Clear { at: DateTime<Utc> },
    Toggle,
    External(WidgetSignal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Persist,
    ClearStorage,
    SendRequest(ChatRequest),
    ScheduleSubmit { text: String, delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &SessionState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

pub fn reduce(state: &SessionState, event: SessionEvent) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();
    let mut mutated = true;

    match event {
        SessionEvent::Hydrate { history, at } => {
            if state.hydrated {
                return Transition::unchanged(state);
            }
            // Anything added before hydration finished goes after the restored history.
            let early: Vec<Message> = next.messages.drain(..).filter(|m| !m.is_welcome()).collect();
            next.messages = if history.is_empty() {
                vec![Message::welcome(at)]
            } else {
                history
            };
            next.messages.extend(early);
            next.hydrated = true;
            next.hide_suggestions_if_long();
            mutated = false;
        }
        SessionEvent::InputChanged(text) => {
            next.input = text;
            mutated = false;
        }
        SessionEvent::Submit { at } => {
            let text = state.input.trim();
            if state.is_busy() || text.is_empty() {
                return Transition::unchanged(state);
            }
            let text = text.to_string();
            next.input.clear();
            effects.push(next.begin_send(text, at));
        }
        SessionEvent::SuggestionPicked { text, at } => {
            let text = text.trim();
            if state.is_busy() || text.is_empty() {
                return Transition::unchanged(state);
            }
            effects.push(next.begin_send(text.to_string(), at));
        }
        SessionEvent::StreamOpened { thread_id, at } => {
            if state.phase != Phase::Sending {
                return Transition::unchanged(state);
            }
            if thread_id.is_some() {
                next.thread_id = thread_id;
            }
            let id = next.push(Role::Assistant, String::new(), at);
            next.streaming_id = Some(id);
        }
        SessionEvent::StreamText { accumulated } => {
            let Some(msg) = next.placeholder_mut() else {
                return Transition::unchanged(state);
            };
            msg.content = accumulated;
            next.phase = Phase::Streaming;
        }
        SessionEvent::StreamEnded => {
            if next.streaming_id.is_none() {
                return Transition::unchanged(state);
            }
            let text = next.fallback_text();
            if let Some(msg) = next.placeholder_mut() {
                if msg.content.trim().is_empty() {
                    msg.content = text;
                }
            }
            next.settle();
        }
        SessionEvent::ReplyReceived {
            response,
            thread_id,
            at,
        } => {
            if !state.is_busy() {
                return Transition::unchanged(state);
            }
            if thread_id.is_some() {
                next.thread_id = thread_id;
            }
            let text = response
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| next.fallback_text());
            next.push(Role::Assistant, text, at);
            next.settle();
        }
        SessionEvent::TransportFailed { at } => {
            if !state.is_busy() {
                return Transition::unchanged(state);
            }
            let text = next.fallback_text();
            let streamed = match next.placeholder_mut() {
                Some(msg) => {
                    if msg.content.trim().is_empty() {
                        msg.content = text.clone();
                    }
                    true
                }
                None => false,
            };
            if !streamed {
                next.push(Role::Assistant, text, at);
            }
            next.settle();
        }
        SessionEvent::React { id, reaction } => {
            let Some(msg) = next.messages.iter_mut().find(|m| m.id == id) else {
                return Transition::unchanged(state);
            };
            msg.reaction = if msg.reaction == Some(reaction) {
                None
            } else {
                Some(reaction)
            };
        }
        SessionEvent::Clear { at } => {
            if state.is_busy() {
                return Transition::unchanged(state);
            }
            next.messages = vec![Message::welcome(at)];
            next.thread_id = None;
            next.suggestions_visible = true;
            next.input.clear();
            effects.push(Effect::ClearStorage);
            mutated = false;
        }
        SessionEvent::Toggle => {
            next.is_open = !next.is_open;
            mutated = false;
        }
        SessionEvent::External(WidgetSignal { action, prefill }) => {
            match action {
                WidgetAction::OpenChat => next.is_open = true,
            }
            if let Some(text) = prefill.filter(|t| !t.trim().is_empty()) {
                effects.push(Effect::ScheduleSubmit {
                    text,
                    delay: PREFILL_DELAY,
                });
            }
            mutated = false;
        }
    }

    if mutated && next.hydrated {
        effects.insert(0, Effect::Persist);
    }
    Transition {
        state: next,
        effects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::fallback;
    use crate::session::message::WELCOME_ID;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn hydrated() -> SessionState {
        reduce(
            &SessionState::default(),
            SessionEvent::Hydrate {
                history: Vec::new(),
                at: at(0),
            },
        )
        .state
    }

    fn typed(state: &SessionState, text: &str) -> SessionState {
        reduce(state, SessionEvent::InputChanged(text.to_string())).state
    }

    fn submit(state: &SessionState, text: &str) -> Transition {
        reduce(&typed(state, text), SessionEvent::Submit { at: at(1) })
    }

    #[test]
    fn hydrate_prefers_history_over_welcome() {
        let fresh = hydrated();
        assert_eq!(fresh.messages.len(), 1);
        assert_eq!(fresh.messages[0].id, WELCOME_ID);

        let history = vec![Message::new("old", Role::User, "hello again", at(-5))];
        let restored = reduce(
            &SessionState::default(),
            SessionEvent::Hydrate {
                history: history.clone(),
                at: at(0),
            },
        );
        assert_eq!(restored.state.messages, history);
        assert!(restored.effects.is_empty());
    }

    #[test]
    fn submit_sends_and_persists() {
        let t = submit(&hydrated(), "  what are your skills?  ");
        assert_eq!(t.state.phase, Phase::Sending);
        assert!(t.state.input.is_empty());
        assert_eq!(t.state.messages.len(), 2);
        assert_eq!(t.state.messages[1].content, "what are your skills?");
        assert_eq!(t.effects[0], Effect::Persist);
        let Effect::SendRequest(req) = &t.effects[1] else {
            panic!("expected a send effect, got {:?}", t.effects);
        };
        assert_eq!(req.message, "what are your skills?");
        assert_eq!(req.conversation_history.as_deref(), Some(&[][..]));
    }

    #[test]
    fn busy_or_blank_submit_is_a_noop() {
        let sending = submit(&hydrated(), "first").state;
        let again = submit(&sending, "second");
        assert_eq!(again.state.messages, sending.messages);
        assert!(again.effects.is_empty());

        let blank = submit(&hydrated(), "   ");
        assert_eq!(blank.state.messages.len(), 1);
        assert!(blank.effects.is_empty());
    }

    #[test]
    fn stream_replaces_placeholder_content() {
        let s = submit(&hydrated(), "projects?").state;
        let s = reduce(
            &s,
            SessionEvent::StreamOpened {
                thread_id: Some("thread_9".into()),
                at: at(2),
            },
        )
        .state;
        assert_eq!(s.phase, Phase::Sending);
        assert_eq!(s.last().map(|m| m.content.as_str()), Some(""));

        let s = reduce(&s, SessionEvent::StreamText { accumulated: "I built".into() }).state;
        assert_eq!(s.phase, Phase::Streaming);
        let s = reduce(&s, SessionEvent::StreamText { accumulated: "I built three".into() }).state;
        let s = reduce(&s, SessionEvent::StreamEnded).state;

        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.messages.len(), 3);
        assert_eq!(s.messages[2].content, "I built three");
        assert_eq!(s.thread_id.as_deref(), Some("thread_9"));
    }

    #[test]
    fn empty_stream_becomes_fallback() {
        let s = submit(&hydrated(), "hello").state;
        let s = reduce(&s, SessionEvent::StreamOpened { thread_id: None, at: at(2) }).state;
        let s = reduce(&s, SessionEvent::StreamEnded).state;
        assert_eq!(s.messages[2].content, fallback("hello"));
        assert!(!s.is_busy());
    }

    #[test]
    fn json_and_transport_failures_fall_back() {
        let s = submit(&hydrated(), "contact").state;
        let s = reduce(
            &s,
            SessionEvent::ReplyReceived {
                response: None,
                thread_id: Some("t1".into()),
                at: at(2),
            },
        )
        .state;
        assert_eq!(s.messages[2].content, fallback("contact"));
        assert_eq!(s.thread_id.as_deref(), Some("t1"));

        let s = submit(&s, "experience").state;
        let s = reduce(&s, SessionEvent::TransportFailed { at: at(3) }).state;
        assert_eq!(s.last().map(|m| m.content.as_str()), Some(fallback("experience")));
        assert_eq!(s.messages.iter().filter(|m| m.role == Role::Assistant).count(), 3);
    }

    #[test]
    fn suggestions_hide_permanently() {
        let s = hydrated();
        assert!(s.suggestions_visible);
        let s = submit(&s, "hi").state;
        let s = reduce(
            &s,
            SessionEvent::ReplyReceived {
                response: Some("hello".into()),
                thread_id: None,
                at: at(2),
            },
        )
        .state;
        assert!(!s.suggestions_visible);
        let cleared = reduce(&s, SessionEvent::Clear { at: at(3) });
        assert!(cleared.state.suggestions_visible);
        assert_eq!(cleared.effects, vec![Effect::ClearStorage]);
        assert!(cleared.state.thread_id.is_none());
    }

    #[test]
    fn long_restored_history_hides_suggestions() {
        let history: Vec<Message> = (0..10)
            .map(|i| Message::new(format!("m{}", i), Role::User, format!("q{}", i), at(i)))
            .collect();
        let restored = reduce(
            &SessionState::default(),
            SessionEvent::Hydrate { history, at: at(20) },
        )
        .state;
        assert_eq!(restored.messages.len(), 10);
        assert!(!restored.suggestions_visible);

        assert!(hydrated().suggestions_visible);
    }

    #[test]
    fn picked_suggestion_is_sent() {
        let s = typed(&hydrated(), "half-typed");
        let t = reduce(
            &s,
            SessionEvent::SuggestionPicked {
                text: SUGGESTED_PROMPTS[1].to_string(),
                at: at(1),
            },
        );
        assert_eq!(t.state.phase, Phase::Sending);
        assert_eq!(t.state.input, "half-typed");
        assert_eq!(t.state.messages[1].content, SUGGESTED_PROMPTS[1]);
        assert!(matches!(
            t.effects.as_slice(),
            [Effect::Persist, Effect::SendRequest(req)] if req.message == SUGGESTED_PROMPTS[1]
        ));
    }

    #[test]
    fn picking_while_busy_is_a_noop() {
        let sending = submit(&hydrated(), "first").state;
        let t = reduce(
            &sending,
            SessionEvent::SuggestionPicked {
                text: SUGGESTED_PROMPTS[0].to_string(),
                at: at(2),
            },
        );
        assert_eq!(t.state, sending);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn reaction_toggles() {
        let s = hydrated();
        let react = |s: &SessionState, r| {
            reduce(
                s,
                SessionEvent::React {
                    id: WELCOME_ID.into(),
                    reaction: r,
                },
            )
            .state
        };
        let s = react(&s, Reaction::Like);
        assert_eq!(s.messages[0].reaction, Some(Reaction::Like));
        let s = react(&s, Reaction::Dislike);
        assert_eq!(s.messages[0].reaction, Some(Reaction::Dislike));
        let s = react(&s, Reaction::Dislike);
        assert_eq!(s.messages[0].reaction, None);
    }

    #[test]
    fn history_window_skips_welcome() {
        let mut s = hydrated();
        for i in 0..30 {
            s.messages.push(Message::new(format!("m{}", i), Role::User, format!("q{}", i), at(i)));
        }
        let history = s.outgoing_history();
        assert_eq!(history.len(), HISTORY_WINDOW);
        assert_eq!(history[0].content, "q10");
        assert_eq!(history[19].content, "q29");
    }

    #[test]
    fn external_signal_opens_and_schedules() {
        let t = reduce(
            &hydrated(),
            SessionEvent::External(WidgetSignal::open_with("Tell me about your skills")),
        );
        assert!(t.state.is_open);
        assert_eq!(
            t.effects,
            vec![Effect::ScheduleSubmit {
                text: "Tell me about your skills".into(),
                delay: PREFILL_DELAY,
            }]
        );
    }

    #[test]
    fn nothing_persists_before_hydration() {
        let t = submit(&SessionState::default(), "early");
        assert!(matches!(t.effects.as_slice(), [Effect::SendRequest(_)]));
    }
}
