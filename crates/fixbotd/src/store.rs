//! SQLite-backed wizard session store.
//!
//! One row per tracked chat message; the message id is the primary key, so
//! "exactly one session per tracked message" holds at the schema level.
//! Every mutator updates only its own column, which keeps rapid duplicate
//! clicks from clobbering unrelated fields: last write wins per concern,
//! never per document. Expired rows are reaped passively on access.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use fixbot_shared::field::{FieldKey, LocationRole, Priority};
use fixbot_shared::session::{AgencyBlock, LocationTrail, SelectionRef, WizardSession};

pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
}

impl SessionStore {
    /// Open or create the session store; `ttl_minutes` bounds how long an
    /// abandoned session survives.
    pub fn open(path: impl AsRef<Path>, ttl_minutes: i64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: Duration::minutes(ttl_minutes.max(1)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS wizard_sessions (
                message_id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                issue_text TEXT NOT NULL,
                category TEXT,
                subcategory TEXT,
                priority TEXT,
                loc_plain TEXT NOT NULL,
                loc_source TEXT NOT NULL,
                loc_target TEXT NOT NULL,
                agency TEXT NOT NULL,
                extras TEXT NOT NULL,
                pending_input TEXT,
                media TEXT NOT NULL,
                current_step TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_chat ON wizard_sessions(chat_id, updated_at)",
            [],
        )?;
        Ok(())
    }

    /// Insert a fresh session. Fails if the tracked message already has
    /// one (primary key), which is the invariant, not a race to paper
    /// over.
    pub fn create(&self, session: &WizardSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO wizard_sessions
                (message_id, chat_id, user_id, issue_text, category, subcategory,
                 priority, loc_plain, loc_source, loc_target, agency, extras,
                 pending_input, media, current_step, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &session.message_id,
                &session.chat_id,
                &session.user_id,
                &session.issue_text,
                opt_json(&session.category)?,
                opt_json(&session.subcategory)?,
                session.priority.map(|p| p.as_str().to_string()),
                serde_json::to_string(&session.locations.plain)?,
                serde_json::to_string(&session.locations.source)?,
                serde_json::to_string(&session.locations.target)?,
                serde_json::to_string(&session.agency)?,
                serde_json::to_string(&session.extra_values)?,
                session.pending_input.as_ref().map(|k| k.wire_name()),
                serde_json::to_string(&session.media_urls)?,
                &session.current_step,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load the session behind a tracked message, reaping expired rows
    /// first so an abandoned form reads back as gone, not as stale state.
    pub fn load(&self, message_id: &str) -> Result<Option<WizardSession>> {
        self.purge_expired()?;
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                r#"
                SELECT message_id, chat_id, user_id, issue_text, category,
                       subcategory, priority, loc_plain, loc_source, loc_target,
                       agency, extras, pending_input, media, current_step,
                       created_at, updated_at
                FROM wizard_sessions WHERE message_id = ?
                "#,
                params![message_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Most recently updated session in a chat that is waiting for typed
    /// text. Free-text events carry no message reference, so this is how
    /// they find their session.
    pub fn find_awaiting_text(&self, chat_id: &str) -> Result<Option<WizardSession>> {
        self.purge_expired()?;
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                r#"
                SELECT message_id, chat_id, user_id, issue_text, category,
                       subcategory, priority, loc_plain, loc_source, loc_target,
                       agency, extras, pending_input, media, current_step,
                       created_at, updated_at
                FROM wizard_sessions
                WHERE chat_id = ? AND pending_input IS NOT NULL
                ORDER BY updated_at DESC LIMIT 1
                "#,
                params![chat_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    fn set_column(&self, message_id: &str, column: &str, value: Option<String>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE wizard_sessions SET {} = ?, updated_at = ? WHERE message_id = ?",
            column
        );
        let changed = conn.execute(&sql, params![value, Utc::now().to_rfc3339(), message_id])?;
        Ok(changed == 1)
    }

    pub fn set_category(&self, message_id: &str, category: &SelectionRef) -> Result<bool> {
        self.set_column(message_id, "category", Some(serde_json::to_string(category)?))
    }

    pub fn set_subcategory(&self, message_id: &str, subcategory: &SelectionRef) -> Result<bool> {
        self.set_column(
            message_id,
            "subcategory",
            Some(serde_json::to_string(subcategory)?),
        )
    }

    pub fn set_priority(&self, message_id: &str, priority: Priority) -> Result<bool> {
        self.set_column(message_id, "priority", Some(priority.as_str().to_string()))
    }

    pub fn set_trail(&self, message_id: &str, role: LocationRole, trail: &LocationTrail) -> Result<bool> {
        let column = match role {
            LocationRole::Plain => "loc_plain",
            LocationRole::Source => "loc_source",
            LocationRole::Target => "loc_target",
        };
        self.set_column(message_id, column, Some(serde_json::to_string(trail)?))
    }

    pub fn set_agency(&self, message_id: &str, agency: &AgencyBlock) -> Result<bool> {
        self.set_column(message_id, "agency", Some(serde_json::to_string(agency)?))
    }

    /// Read-modify-write of the extras map alone; other concerns are
    /// untouched even if a concurrent click lands between the read and
    /// the write.
    pub fn set_extra(&self, message_id: &str, key: &str, value: &str) -> Result<bool> {
        let Some(session) = self.load(message_id)? else {
            return Ok(false);
        };
        let mut extras = session.extra_values;
        extras.insert(key.to_string(), value.to_string());
        self.set_column(message_id, "extras", Some(serde_json::to_string(&extras)?))
    }

    pub fn set_pending_input(&self, message_id: &str, pending: Option<&FieldKey>) -> Result<bool> {
        self.set_column(message_id, "pending_input", pending.map(|k| k.wire_name()))
    }

    pub fn set_current_step(&self, message_id: &str, step: Option<&str>) -> Result<bool> {
        self.set_column(message_id, "current_step", step.map(|s| s.to_string()))
    }

    pub fn add_media(&self, message_id: &str, urls: &[String]) -> Result<bool> {
        let Some(session) = self.load(message_id)? else {
            return Ok(false);
        };
        let mut media = session.media_urls;
        media.extend(urls.iter().cloned());
        self.set_column(message_id, "media", Some(serde_json::to_string(&media)?))
    }

    /// Delete-if-exists, the single-use claim around submit and cancel:
    /// exactly one concurrent caller observes `true` and may act on the
    /// session's final state.
    pub fn claim_delete(&self, message_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM wizard_sessions WHERE message_id = ?",
            params![message_id],
        )?;
        Ok(deleted == 1)
    }

    /// Passive reaper, run on every access path.
    pub fn purge_expired(&self) -> Result<usize> {
        let cutoff = (Utc::now() - self.ttl).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let purged = conn.execute(
            "DELETE FROM wizard_sessions WHERE updated_at < ?",
            params![cutoff],
        )?;
        if purged > 0 {
            debug!("Reaped {} expired wizard session(s)", purged);
        }
        Ok(purged)
    }

    pub fn open_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM wizard_sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn opt_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    Ok(match value {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<WizardSession> {
    let category: Option<String> = row.get(4)?;
    let subcategory: Option<String> = row.get(5)?;
    let priority: Option<String> = row.get(6)?;
    let loc_plain: String = row.get(7)?;
    let loc_source: String = row.get(8)?;
    let loc_target: String = row.get(9)?;
    let agency: String = row.get(10)?;
    let extras: String = row.get(11)?;
    let pending: Option<String> = row.get(12)?;
    let media: String = row.get(13)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    Ok(WizardSession {
        message_id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        issue_text: row.get(3)?,
        category: category.and_then(|s| serde_json::from_str(&s).ok()),
        subcategory: subcategory.and_then(|s| serde_json::from_str(&s).ok()),
        priority: priority.as_deref().and_then(Priority::parse),
        locations: fixbot_shared::session::LocationSet {
            plain: serde_json::from_str(&loc_plain).unwrap_or_default(),
            source: serde_json::from_str(&loc_source).unwrap_or_default(),
            target: serde_json::from_str(&loc_target).unwrap_or_default(),
        },
        agency: serde_json::from_str(&agency).unwrap_or_default(),
        extra_values: serde_json::from_str(&extras).unwrap_or_default(),
        pending_input: pending.as_deref().and_then(FieldKey::parse_wire),
        media_urls: serde_json::from_str(&media).unwrap_or_default(),
        current_step: row.get(14)?,
        created_at: created_at
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
        updated_at: updated_at
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}
