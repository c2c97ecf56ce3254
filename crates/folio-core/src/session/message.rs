use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id of the synthetic greeting; never sent upstream as history.
pub const WELCOME_ID: &str = "welcome";
pub const WELCOME_TEXT: &str =
    "Hi! I'm your portfolio chatbot. Ask anything about me, my skills, projects, or experience.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

/// One chat message as shown and as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp,
            reaction: None,
        }
    }

    pub fn welcome(timestamp: DateTime<Utc>) -> Self {
        Self::new(WELCOME_ID, Role::Assistant, WELCOME_TEXT, timestamp)
    }

    pub fn is_welcome(&self) -> bool {
        self.id == WELCOME_ID
    }
}
