//! Contact form submissions (SQLite).
//!
//! One connection per call; the schema is created on construction.

use crate::error::ContactError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_NAME_LEN: usize = 100;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|e| panic!("email regex: {}", e))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    New,
    Read,
    Replied,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Read => "read",
            ContactStatus::Replied => "replied",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = ContactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ContactStatus::New),
            "read" => Ok(ContactStatus::Read),
            "replied" => Ok(ContactStatus::Replied),
            _ => Err(ContactError::Validation("Invalid status".to_string())),
        }
    }
}

/// Incoming submission as posted by the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

impl NewContact {
    /// Trim every field and check required fields and email shape.
    pub fn validate(self) -> Result<NewContact, ContactError> {
        let contact = NewContact {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self
                .phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            subject: self.subject.trim().to_string(),
            message: self.message.trim().to_string(),
        };
        if contact.name.is_empty()
            || contact.email.is_empty()
            || contact.subject.is_empty()
            || contact.message.is_empty()
        {
            return Err(ContactError::Validation(
                "Name, email, subject, and message are required".to_string(),
            ));
        }
        if !EMAIL_RE.is_match(&contact.email) {
            return Err(ContactError::Validation("Invalid email format".to_string()));
        }
        if contact.name.chars().count() > MAX_NAME_LEN {
            return Err(ContactError::Validation(format!(
                "Name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(contact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContactStats {
    pub total: i64,
    pub new: i64,
    pub read: i64,
    pub replied: i64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct ContactStore {
    db_path: PathBuf,
}

impl ContactStore {
    pub fn new(db_path: PathBuf) -> Result<Self, ContactError> {
        let this = Self { db_path };
        this.init()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        // Handlers open one connection per request; concurrent writers wait instead of failing.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn init(&self) -> Result<(), ContactError> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT NULL,
                subject TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                created_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status);
            CREATE INDEX IF NOT EXISTS idx_contacts_created_at ON contacts(created_at_ms);
            "#,
        )?;
        Ok(())
    }

    /// Persist a validated submission; returns the stored row.
    pub fn save(&self, contact: &NewContact) -> Result<ContactRow, ContactError> {
        let conn = self.open()?;
        let ts = now_ms();
        conn.execute(
            r#"
            INSERT INTO contacts (name, email, phone, subject, message, status, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, 'new', ?6)
            "#,
            params![
                contact.name,
                contact.email,
                contact.phone,
                contact.subject,
                contact.message,
                ts
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(target: "folio::contact", id, "Contact saved");
        Ok(ContactRow {
            id,
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            subject: contact.subject.clone(),
            message: contact.message.clone(),
            status: ContactStatus::New,
            created_at_ms: ts,
        })
    }

    /// Newest first, optionally filtered by status.
    pub fn list(&self, status: Option<ContactStatus>, limit: usize) -> Result<Vec<ContactRow>, ContactError> {
        let conn = self.open()?;
        let limit = limit as i64;
        let rows = match status {
            Some(s) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, name, email, phone, subject, message, status, created_at_ms
                    FROM contacts WHERE status = ?1
                    ORDER BY created_at_ms DESC, id DESC LIMIT ?2
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![s.as_str(), limit], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, name, email, phone, subject, message, status, created_at_ms
                    FROM contacts
                    ORDER BY created_at_ms DESC, id DESC LIMIT ?1
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![limit], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn update_status(&self, id: i64, status: ContactStatus) -> Result<(), ContactError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE contacts SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(ContactError::NotFound(id));
        }
        tracing::info!(target: "folio::contact", id, status = %status, "Contact status updated");
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<(), ContactError> {
        let conn = self.open()?;
        let changed = conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(ContactError::NotFound(id));
        }
        tracing::info!(target: "folio::contact", id, "Contact deleted");
        Ok(())
    }

    pub fn stats(&self) -> Result<ContactStats, ContactError> {
        let conn = self.open()?;
        let stats = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'new' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'read' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'replied' THEN 1 ELSE 0 END), 0)
            FROM contacts
            "#,
            [],
            |r| {
                Ok(ContactStats {
                    total: r.get(0)?,
                    new: r.get(1)?,
                    read: r.get(2)?,
                    replied: r.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }
}

fn map_row(r: &Row<'_>) -> rusqlite::Result<ContactRow> {
    let status: String = r.get(6)?;
    Ok(ContactRow {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        phone: r.get(3)?,
        subject: r.get(4)?,
        message: r.get(5)?,
        // rows are only written through ContactStatus; anything else reads as new
        status: status.parse().unwrap_or_default(),
        created_at_ms: r.get(7)?,
    })
}
