//! Ticket workflow
//!
//! A small stand-in for the tracker's ticket pipeline: create, resolve and
//! reopen tickets, running the relation system's validation before a change
//! is saved and its change hook afterwards.

use chrono::Utc;
use std::collections::HashMap;

use crate::error::{RelationError, Result};
use crate::models::{Ticket, TicketChange, TicketStatus, RELDATA_FIELD};
use crate::system::RelationSystem;

/// Outcome of a successful ticket change
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub ticket: Ticket,
    /// Duplicate relation created by the change, if any
    pub created_relation: Option<crate::models::Relation>,
}

pub struct TicketWorkflow {
    system: RelationSystem,
}

impl TicketWorkflow {
    pub fn new(system: RelationSystem) -> Self {
        Self { system }
    }

    pub fn system(&self) -> &RelationSystem {
        &self.system
    }

    /// Creates a ticket in status `new`
    pub fn create_ticket(&self, summary: &str, reporter: &str) -> Result<Ticket> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(RelationError::Validation(
                "Tickets must contain a summary.".to_string(),
            ));
        }
        let ticket = self.system.backend().insert_ticket(summary, reporter)?;
        self.system.ticket_created(&ticket)?;
        log::info!("Created ticket #{}", ticket.id);
        Ok(ticket)
    }

    /// Closes a ticket with a resolution.
    ///
    /// For the `duplicate` resolution `duplicate_of` names the original
    /// ticket. Nothing is saved when validation reports any issue.
    pub fn resolve(
        &self,
        id: i64,
        resolution: &str,
        duplicate_of: Option<&str>,
        author: &str,
    ) -> Result<ChangeResult> {
        let backend = self.system.backend();
        let current = self.system.ticket(id)?;
        if current.is_closed() {
            return Err(RelationError::Validation(format!(
                "Ticket #{} is already closed.",
                id
            )));
        }
        let resolution = resolution.trim();
        if resolution.is_empty() {
            return Err(RelationError::Validation(
                "A resolution is required to close a ticket.".to_string(),
            ));
        }

        if let Some(value) = duplicate_of {
            backend.set_custom_field(id, RELDATA_FIELD, value)?;
        }

        let mut proposed = current.clone();
        proposed.status = TicketStatus::Closed;
        proposed.resolution = Some(resolution.to_string());
        proposed.changed_at = Utc::now();

        let issues = self.system.validate_ticket(&proposed, duplicate_of)?;
        if !issues.is_empty() {
            backend.delete_custom_field(id, RELDATA_FIELD)?;
            log::warn!("Refused to close ticket #{}: {} issue(s)", id, issues.len());
            return Err(RelationError::from_messages(
                issues.iter().map(|i| i.message.as_str()),
            ));
        }

        self.save_change(&current, &proposed, duplicate_of, author)
    }

    /// Reopens a closed ticket and clears its resolution
    pub fn reopen(&self, id: i64, author: &str) -> Result<ChangeResult> {
        let current = self.system.ticket(id)?;
        if !current.is_closed() {
            return Err(RelationError::Validation(format!(
                "Ticket #{} is not closed.",
                id
            )));
        }

        let mut proposed = current.clone();
        proposed.status = TicketStatus::Reopened;
        proposed.resolution = None;
        proposed.changed_at = Utc::now();

        self.save_change(&current, &proposed, None, author)
    }

    fn save_change(
        &self,
        old: &Ticket,
        new: &Ticket,
        relationdata: Option<&str>,
        author: &str,
    ) -> Result<ChangeResult> {
        let backend = self.system.backend();
        backend.update_ticket(new)?;

        let mut old_values: HashMap<String, Option<String>> = HashMap::new();
        let mut fields = vec![
            ("status", Some(old.status.to_string()), Some(new.status.to_string())),
            ("resolution", old.resolution.clone(), new.resolution.clone()),
        ];
        if let Some(value) = relationdata {
            fields.push((RELDATA_FIELD, None, Some(value.to_string())));
        }

        for (field, oldvalue, newvalue) in fields {
            if oldvalue == newvalue {
                continue;
            }
            backend.record_change(&TicketChange {
                ticket: new.id,
                time: new.changed_at,
                author: author.to_string(),
                field: field.to_string(),
                oldvalue: oldvalue.clone(),
                newvalue,
            })?;
            old_values.insert(field.to_string(), oldvalue);
        }

        let created_relation = self.system.ticket_changed(new, &old_values)?;
        log::info!(
            "Ticket #{} changed to {} by {}",
            new.id,
            new.status,
            if author.is_empty() { "anonymous" } else { author }
        );
        Ok(ChangeResult {
            ticket: new.clone(),
            created_relation,
        })
    }
}
