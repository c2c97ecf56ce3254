//! Configuration loaded from `.env` and `config/gateway.toml`.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | OPENAI_API_KEY | (none) | Backend API key. Absent => chat always answers with the fallback. |
//! | OPENAI_ASSISTANT_ID | (none) | Assistant that runs against conversation threads. |
//! | OPENAI_VECTOR_STORE_ID | (none) | Retrieval index the corpus is published to. |
//! | OPENAI_API_BASE | https://api.openai.com/v1 | Base URL of the thread/run API. |
//! | RAG_BACKEND | openai | `openai` or `local` (in-process keyword retrieval). |
//! | RAG_POLL_INTERVAL_MS | 1000 | Run status poll interval. |
//! | RAG_MAX_WAIT_SECS | 60 | Upper bound on waiting for one run. |
//! | RESEND_API_KEY | (none) | Email provider key for contact notifications. |
//! | NOTIFICATION_EMAIL | (none) | Recipient of contact notifications. |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_WAIT_SECS: u64 = 60;
const DEFAULT_FROM_ADDRESS: &str = "Portfolio Contact Form <onboarding@resend.dev>";

/// Which retrieval backend the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    OpenAi,
    Local,
}

/// Settings for the retrieval-augmented generation backend.
#[derive(Debug, Clone, Default)]
pub struct RagSettings {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub vector_store_id: Option<String>,
    pub api_base: String,
    pub backend: BackendKind,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl RagSettings {
    /// Load from environment. Blank values count as absent.
    pub fn from_env() -> Self {
        let backend = match env_opt_string("RAG_BACKEND").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("local") => BackendKind::Local,
            _ => BackendKind::OpenAi,
        };
        Self {
            api_key: env_opt_string("OPENAI_API_KEY"),
            assistant_id: env_opt_string("OPENAI_ASSISTANT_ID"),
            vector_store_id: env_opt_string("OPENAI_VECTOR_STORE_ID"),
            api_base: env_opt_string("OPENAI_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            backend,
            poll_interval: Duration::from_millis(env_u64(
                "RAG_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            max_wait: Duration::from_secs(env_u64("RAG_MAX_WAIT_SECS", DEFAULT_MAX_WAIT_SECS)),
        }
    }

    /// Settings for the in-process backend (no credentials needed).
    pub fn local() -> Self {
        Self {
            backend: BackendKind::Local,
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
            ..Default::default()
        }
    }

    /// Chat can be grounded: key and assistant id present, or the local backend selected.
    pub fn is_configured(&self) -> bool {
        match self.backend {
            BackendKind::Local => true,
            BackendKind::OpenAi => self.api_key.is_some() && self.assistant_id.is_some(),
        }
    }

    /// Publishing additionally needs the retrieval index id.
    pub fn can_publish(&self) -> bool {
        match self.backend {
            BackendKind::Local => true,
            BackendKind::OpenAi => self.api_key.is_some() && self.vector_store_id.is_some(),
        }
    }
}

/// Settings for the contact notification email.
#[derive(Debug, Clone, Default)]
pub struct MailSettings {
    pub api_key: Option<String>,
    pub recipient: Option<String>,
    pub from: String,
}

impl MailSettings {
    pub fn from_env() -> Self {
        Self {
            api_key: env_opt_string("RESEND_API_KEY"),
            recipient: env_opt_string("NOTIFICATION_EMAIL"),
            from: env_opt_string("CONTACT_FROM_ADDRESS")
                .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.recipient.is_some()
    }
}

/// Gateway process configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// SQLite file for contact submissions.
    pub contacts_db: String,
    /// Optional TOML file replacing the built-in portfolio profile.
    #[serde(default)]
    pub profile_path: Option<String>,
    /// Allowed CORS origins. Empty => any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            contacts_db: "./data/contacts.db".to_string(),
            profile_path: None,
            cors_origins: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Precedence: `FOLIO__*` env > file at `FOLIO_CONFIG` (default `config/gateway.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("FOLIO_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("contacts_db", defaults.contacts_db)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        builder
            .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn profile_path(&self) -> Option<PathBuf> {
        self.profile_path.as_deref().map(PathBuf::from)
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}
