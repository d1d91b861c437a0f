//! Narrow read interfaces onto the masters subsystem, plus the ticket
//! sink.
//!
//! Categories, locations, agencies and workflow rules are maintained
//! elsewhere; the wizard engine only reads them, and re-reads on every
//! step so edits take effect mid-conversation. The SQLite implementations
//! here are the daemon's default wiring; tests substitute in-memory ones.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use fixbot_shared::rule::WorkflowRule;
use fixbot_shared::ticket::{NewTicket, Ticket, TicketStatus};

/// A category, subcategory or agency as the pickers need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
}

/// One node of the location forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNode {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Read access to categories, subcategories, agencies and workflow rules.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn categories(&self) -> Result<Vec<CatalogEntry>>;
    async fn subcategories(&self, category_id: &str) -> Result<Vec<CatalogEntry>>;
    async fn agencies(&self) -> Result<Vec<CatalogEntry>>;
    async fn rule_for_category(&self, category_id: &str) -> Result<Option<WorkflowRule>>;
}

/// Read access to the location forest.
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    /// Ordered children of a node, or the roots for `None`.
    async fn children(&self, parent: Option<&str>) -> Result<Vec<LocationNode>>;
    async fn node(&self, id: &str) -> Result<Option<LocationNode>>;
}

/// Where finished wizard sessions become tickets.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// Persist a ticket, returning its id.
    async fn create_ticket(&self, ticket: NewTicket) -> Result<String>;
}

/// SQLite-backed masters access, sharing the daemon database file.
pub struct SqliteMasters {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMasters {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        let masters = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        masters.init_schema()?;
        Ok(masters)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS subcategories (
                id TEXT PRIMARY KEY,
                category_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS agencies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS workflow_rules (
                category_id TEXT PRIMARY KEY,
                rule_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS locations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_subcategories_category
                ON subcategories(category_id);
            CREATE INDEX IF NOT EXISTS idx_locations_parent
                ON locations(parent_id);
            "#,
        )?;
        Ok(())
    }

    /// Fixture/bootstrap writes. Master data is normally maintained by the
    /// admin subsystem directly in these tables.
    pub fn seed_category(&self, id: &str, name: &str, sort: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO categories (id, name, sort_order) VALUES (?, ?, ?)",
            params![id, name, sort],
        )?;
        Ok(())
    }

    pub fn seed_subcategory(&self, id: &str, category_id: &str, name: &str, sort: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO subcategories (id, category_id, name, sort_order) VALUES (?, ?, ?, ?)",
            params![id, category_id, name, sort],
        )?;
        Ok(())
    }

    pub fn seed_agency(&self, id: &str, name: &str, sort: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO agencies (id, name, sort_order) VALUES (?, ?, ?)",
            params![id, name, sort],
        )?;
        Ok(())
    }

    pub fn seed_rule(&self, rule: &WorkflowRule) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO workflow_rules (category_id, rule_json) VALUES (?, ?)",
            params![&rule.category_id, serde_json::to_string(rule)?],
        )?;
        Ok(())
    }

    pub fn seed_location(&self, id: &str, name: &str, parent: Option<&str>, sort: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO locations (id, name, parent_id, sort_order) VALUES (?, ?, ?, ?)",
            params![id, name, parent, sort],
        )?;
        Ok(())
    }

    fn catalog_query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<CatalogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok(CatalogEntry {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Catalog for SqliteMasters {
    async fn categories(&self) -> Result<Vec<CatalogEntry>> {
        self.catalog_query(
            "SELECT id, name FROM categories ORDER BY sort_order, name",
            &[],
        )
    }

    async fn subcategories(&self, category_id: &str) -> Result<Vec<CatalogEntry>> {
        self.catalog_query(
            "SELECT id, name FROM subcategories WHERE category_id = ? ORDER BY sort_order, name",
            &[&category_id],
        )
    }

    async fn agencies(&self) -> Result<Vec<CatalogEntry>> {
        self.catalog_query(
            "SELECT id, name FROM agencies ORDER BY sort_order, name",
            &[],
        )
    }

    async fn rule_for_category(&self, category_id: &str) -> Result<Option<WorkflowRule>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT rule_json FROM workflow_rules WHERE category_id = ?",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json).with_context(|| {
                format!("Malformed workflow rule for category {}", category_id)
            })?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LocationDirectory for SqliteMasters {
    async fn children(&self, parent: Option<&str>) -> Result<Vec<LocationNode>> {
        let conn = self.conn.lock().unwrap();
        let (sql, args): (&str, Vec<&dyn rusqlite::ToSql>) = match &parent {
            Some(id) => (
                "SELECT id, name, parent_id FROM locations WHERE parent_id = ? ORDER BY sort_order, name",
                vec![id as &dyn rusqlite::ToSql],
            ),
            None => (
                "SELECT id, name, parent_id FROM locations WHERE parent_id IS NULL ORDER BY sort_order, name",
                vec![],
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(&args[..], |row| {
            Ok(LocationNode {
                id: row.get(0)?,
                name: row.get(1)?,
                parent_id: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn node(&self, id: &str) -> Result<Option<LocationNode>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, name, parent_id FROM locations WHERE id = ?",
                params![id],
                |row| {
                    Ok(LocationNode {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        parent_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}

/// SQLite-backed ticket sink.
pub struct SqliteTicketSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTicketSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn ticket(&self, id: &str) -> Result<Option<Ticket>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT status, created_at, payload FROM tickets WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((status, created_at, payload)) => Ok(Some(Ticket {
                id: id.to_string(),
                status: match status.as_str() {
                    "in-progress" => TicketStatus::InProgress,
                    "closed" => TicketStatus::Closed,
                    _ => TicketStatus::Open,
                },
                created_at: created_at.parse()?,
                fields: serde_json::from_str(&payload)?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TicketSink for SqliteTicketSink {
    async fn create_ticket(&self, ticket: NewTicket) -> Result<String> {
        let id = format!(
            "FB-{}",
            Uuid::new_v4().simple().to_string()[..8].to_uppercase()
        );
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tickets (id, status, created_at, payload) VALUES (?, ?, ?, ?)",
            params![
                &id,
                TicketStatus::Open.to_string(),
                Utc::now().to_rfc3339(),
                serde_json::to_string(&ticket)?
            ],
        )?;
        Ok(id)
    }
}
