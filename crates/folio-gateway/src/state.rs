use folio_core::{
    build_backend, ChatService, ContactError, ContactNotifier, ContactStore, CorpusPublisher,
    GatewayConfig, MailSettings, PortfolioProfile, RagSettings,
};
use std::path::PathBuf;

/// Shared by every handler behind an `Arc`.
pub struct AppState {
    pub chat: ChatService,
    pub publisher: CorpusPublisher,
    pub profile: PortfolioProfile,
    pub contacts: ContactStore,
    pub notifier: ContactNotifier,
}

impl AppState {
    /// Wire services from the process config and the RAG / mail environment.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ContactError> {
        let rag = RagSettings::from_env();
        let backend = build_backend(&rag);
        tracing::info!(
            target: "folio::rag",
            backend = backend.as_ref().map(|b| b.name()).unwrap_or("none"),
            grounded = rag.is_configured(),
            "RAG backend selected"
        );

        Ok(Self {
            chat: ChatService::new(backend.clone(), &rag),
            publisher: CorpusPublisher::new(backend, &rag),
            profile: PortfolioProfile::load_or_default(config.profile_path().as_deref()),
            contacts: ContactStore::new(PathBuf::from(&config.contacts_db))?,
            notifier: ContactNotifier::new(MailSettings::from_env()),
        })
    }
}
