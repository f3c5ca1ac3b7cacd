//! SQLite database storage backend
//!
//! Stores relations and the minimal ticket tables in a single SQLite file.
//! The connection is shared behind a mutex; every call is a short,
//! self-contained statement or transaction.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{RelationError, Result};
use crate::models::{
    Relation, RelationFilter, RelationType, Ticket, TicketChange, TicketStatus,
};

use super::migration;
use super::traits::RelationBackend;

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a database and brings its schema up to date
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migration::upgrade(&mut conn)?;

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic, so a poisoned lock still guards a usable connection
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn parse_time(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_relation(row: &Row<'_>) -> rusqlite::Result<Relation> {
        let type_str: String = row.get(4)?;
        let rel_type: RelationType = type_str
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(Relation {
            id: Some(row.get(0)?),
            realm: row.get(1)?,
            source: row.get(2)?,
            dest: row.get(3)?,
            rel_type,
        })
    }

    fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
        let status_str: String = row.get(3)?;
        let status: TicketStatus = status_str
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        let created_at: String = row.get(5)?;
        let changed_at: String = row.get(6)?;
        Ok(Ticket {
            id: row.get(0)?,
            summary: row.get(1)?,
            reporter: row.get(2)?,
            status,
            resolution: row.get(4)?,
            created_at: Self::parse_time(&created_at),
            changed_at: Self::parse_time(&changed_at),
        })
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

const TICKET_COLUMNS: &str = "id, summary, reporter, status, resolution, created_at, changed_at";

impl RelationBackend for SqliteBackend {
    fn path(&self) -> &Path {
        &self.path
    }

    fn insert_relation(&self, relation: &Relation) -> Result<Relation> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO relation (realm, source, dest, type) VALUES (?1, ?2, ?3, ?4)",
            params![
                relation.realm,
                relation.source,
                relation.dest,
                relation.rel_type.as_str()
            ],
        );
        match result {
            Ok(_) => {
                let mut stored = relation.clone();
                stored.id = Some(conn.last_insert_rowid());
                Ok(stored)
            }
            Err(e) if Self::is_unique_violation(&e) => {
                Err(RelationError::AlreadyExists(relation.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_relation(&self, id: i64) -> Result<Option<Relation>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, realm, source, dest, type FROM relation WHERE id = ?1",
            [id],
            Self::row_to_relation,
        )
        .optional()
        .map_err(Into::into)
    }

    fn delete_relation(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute("DELETE FROM relation WHERE id = ?1", [id])?;
        Ok(rows_affected > 0)
    }

    fn select_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(realm) = &filter.realm {
            clauses.push("realm = ?");
            values.push(Value::Text(realm.clone()));
        }
        if let Some(source) = filter.source {
            clauses.push("source = ?");
            values.push(Value::Integer(source));
        }
        if let Some(dest) = filter.dest {
            clauses.push("dest = ?");
            values.push(Value::Integer(dest));
        }
        if let Some(rel_type) = filter.rel_type {
            clauses.push("type = ?");
            values.push(Value::Text(rel_type.as_str().to_string()));
        }

        let mut sql = String::from("SELECT id, realm, source, dest, type FROM relation");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let relations = stmt
            .query_map(params_from_iter(values), Self::row_to_relation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relations)
    }

    fn insert_ticket(&self, summary: &str, reporter: &str) -> Result<Ticket> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ticket (summary, reporter, status, created_at, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![summary, reporter, TicketStatus::New.as_str(), now.to_rfc3339()],
        )?;
        Ok(Ticket {
            id: conn.last_insert_rowid(),
            summary: summary.to_string(),
            reporter: reporter.to_string(),
            status: TicketStatus::New,
            resolution: None,
            created_at: now,
            changed_at: now,
        })
    }

    fn get_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM ticket WHERE id = ?1", TICKET_COLUMNS),
            [id],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(Into::into)
    }

    fn list_tickets(&self) -> Result<Vec<Ticket>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM ticket ORDER BY id", TICKET_COLUMNS))?;
        let tickets = stmt
            .query_map([], Self::row_to_ticket)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tickets)
    }

    fn update_ticket(&self, ticket: &Ticket) -> Result<()> {
        let conn = self.conn();
        let rows_affected = conn.execute(
            "UPDATE ticket SET summary = ?2, status = ?3, resolution = ?4, changed_at = ?5
             WHERE id = ?1",
            params![
                ticket.id,
                ticket.summary,
                ticket.status.as_str(),
                ticket.resolution,
                ticket.changed_at.to_rfc3339()
            ],
        )?;
        if rows_affected == 0 {
            return Err(RelationError::NotFound(format!("Ticket {}", ticket.id)));
        }
        Ok(())
    }

    fn set_custom_field(&self, ticket: i64, name: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO ticket_custom (ticket, name, value) VALUES (?1, ?2, ?3)",
            params![ticket, name, value],
        )?;
        Ok(())
    }

    fn get_custom_field(&self, ticket: i64, name: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM ticket_custom WHERE ticket = ?1 AND name = ?2",
                params![ticket, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn delete_custom_field(&self, ticket: i64, name: &str) -> Result<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM ticket_custom WHERE ticket = ?1 AND name = ?2",
            params![ticket, name],
        )?;
        Ok(removed)
    }

    fn record_change(&self, change: &TicketChange) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ticket_change (ticket, time, author, field, oldvalue, newvalue)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                change.ticket,
                change.time.to_rfc3339(),
                change.author,
                change.field,
                change.oldvalue,
                change.newvalue
            ],
        )?;
        Ok(())
    }

    fn list_changes(&self, ticket: i64) -> Result<Vec<TicketChange>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ticket, time, author, field, oldvalue, newvalue
             FROM ticket_change WHERE ticket = ?1 ORDER BY rowid",
        )?;
        let changes = stmt
            .query_map([ticket], |row| {
                let time: String = row.get(1)?;
                Ok(TicketChange {
                    ticket: row.get(0)?,
                    time: Self::parse_time(&time),
                    author: row.get(2)?,
                    field: row.get(3)?,
                    oldvalue: row.get(4)?,
                    newvalue: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(changes)
    }

    fn delete_changes(&self, ticket: i64, field: &str) -> Result<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM ticket_change WHERE ticket = ?1 AND field = ?2",
            params![ticket, field],
        )?;
        Ok(removed)
    }
}
