//! Database abstraction traits
//!
//! This module defines the storage contract the relation system relies on:
//! relation rows, and the few pieces of the host's ticket tables that the
//! closing rules and the duplicate flow need.

use std::path::Path;

use crate::error::Result;
use crate::models::{Relation, RelationFilter, Ticket, TicketChange};

/// Core trait for storage backends
pub trait RelationBackend: Send + Sync {
    /// Returns the path to the database file
    fn path(&self) -> &Path;

    // =========================================================================
    // Relation Operations
    // =========================================================================

    /// Inserts a relation and returns it with its assigned id.
    /// Fails with `AlreadyExists` if the same `(realm, source, dest, type)` is stored.
    fn insert_relation(&self, relation: &Relation) -> Result<Relation>;

    /// Gets a relation by id
    fn get_relation(&self, id: i64) -> Result<Option<Relation>>;

    /// Deletes exactly the relation with this id; returns false if there was none
    fn delete_relation(&self, id: i64) -> Result<bool>;

    /// Selects relations matching the filter, ordered by id
    fn select_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>>;

    /// True if a relation with the same realm, ends and type is stored
    fn relation_exists(&self, relation: &Relation) -> Result<bool> {
        let filter = RelationFilter::realm(&relation.realm)
            .source(relation.source)
            .dest(relation.dest)
            .rel_type(relation.rel_type);
        Ok(!self.select_relations(&filter)?.is_empty())
    }

    // =========================================================================
    // Ticket Operations
    // =========================================================================

    /// Creates a new ticket in status `new`
    fn insert_ticket(&self, summary: &str, reporter: &str) -> Result<Ticket>;

    /// Gets a ticket by id
    fn get_ticket(&self, id: i64) -> Result<Option<Ticket>>;

    /// Lists all tickets ordered by id
    fn list_tickets(&self) -> Result<Vec<Ticket>>;

    /// Persists status, resolution and summary of an existing ticket
    fn update_ticket(&self, ticket: &Ticket) -> Result<()>;

    // =========================================================================
    // Custom Fields and Change Log
    // =========================================================================

    /// Sets a ticket custom field, replacing any previous value
    fn set_custom_field(&self, ticket: i64, name: &str, value: &str) -> Result<()>;

    /// Gets a ticket custom field
    fn get_custom_field(&self, ticket: i64, name: &str) -> Result<Option<String>>;

    /// Deletes a ticket custom field; returns the number of rows removed
    fn delete_custom_field(&self, ticket: i64, name: &str) -> Result<usize>;

    /// Appends a change log row
    fn record_change(&self, change: &TicketChange) -> Result<()>;

    /// Lists a ticket's change log in insertion order
    fn list_changes(&self, ticket: i64) -> Result<Vec<TicketChange>>;

    /// Deletes all change log rows of a ticket for one field
    fn delete_changes(&self, ticket: i64, field: &str) -> Result<usize>;

    // =========================================================================
    // Utility Operations
    // =========================================================================

    /// Returns statistics about the database
    fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            ticket_count: self.list_tickets()?.len(),
            relation_count: self.select_relations(&RelationFilter::default())?.len(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub ticket_count: usize,
    pub relation_count: usize,
}
