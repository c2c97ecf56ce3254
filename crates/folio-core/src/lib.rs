//! Folio: Core library.
//! Portfolio assistant: knowledge corpus, retrieval-grounded chat with fallback,
//! contact inbox and the client chat session.

pub mod backend;
pub mod chat;
pub mod config;
pub mod contact;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod notify;
pub mod profile;
pub mod publisher;
pub mod session;
pub mod sse;
pub mod threads;

pub use backend::{build_backend, LocalRagBackend, OpenAiAssistants, RagBackend};
pub use chat::{ChatReply, ChatRequest, ChatService, ChatStream, RagInfo};
pub use config::{BackendKind, GatewayConfig, MailSettings, RagSettings};
pub use contact::{ContactRow, ContactStats, ContactStatus, ContactStore, NewContact};
pub use corpus::{build_corpus, KnowledgeDocument};
pub use engine::{GroundedAnswerEngine, RetrievalAnswer};
pub use error::{ContactError, NotifyError, RagError, RagResult, StoreError, TransportError};
pub use fallback::fallback;
pub use notify::{ContactNotifier, NotifyOutcome};
pub use profile::PortfolioProfile;
pub use publisher::{CorpusPublisher, IndexState, IndexStatus, PublishReport};
pub use threads::ThreadManager;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
