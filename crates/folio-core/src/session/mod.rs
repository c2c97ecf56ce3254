//! Client chat session: message history, persistence, widget signals and the
//! send/stream/fallback state machine.

pub mod bus;
pub mod driver;
pub mod machine;
pub mod message;
pub mod store;
pub mod transport;

pub use bus::{WidgetAction, WidgetBus, WidgetSignal};
pub use driver::SessionDriver;
pub use machine::{reduce, Effect, Phase, SessionEvent, SessionState, Transition, SUGGESTED_PROMPTS};
pub use message::{Message, Reaction, Role, WELCOME_ID};
pub use store::{KeyValueStore, MemoryStore, SledStore, HISTORY_CAP, HISTORY_KEY};
pub use transport::{ChatTransport, HttpTransport, TransportReply};
