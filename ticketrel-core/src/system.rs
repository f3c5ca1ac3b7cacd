//! Relation system: validation and lifecycle of ticket relations
//!
//! `RelationSystem` is the single entry point for adding and removing
//! relations. It also implements the two closing rules and the hooks the
//! ticket pipeline calls after a ticket is created or changed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::RelationBackend;
use crate::error::{RelationError, Result};
use crate::models::{
    parse_ticket_ref, Relation, RelationFilter, RelationType, Ticket, ValidationIssue,
    REALM_TICKET, RELDATA_FIELD, RESOLUTION_DUPLICATE,
};

/// Relations of one ticket, split by direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketRelations {
    /// Relations where the ticket is the source
    pub outgoing: Vec<Relation>,
    /// Relations where the ticket is the destination
    pub incoming: Vec<Relation>,
}

impl TicketRelations {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }
}

/// Sorts relations by type key, then by id
fn sort_by_type(relations: &mut [Relation]) {
    relations.sort_by(|a, b| {
        a.rel_type
            .as_str()
            .cmp(b.rel_type.as_str())
            .then(a.id.cmp(&b.id))
    });
}

#[derive(Clone)]
pub struct RelationSystem {
    backend: Arc<dyn RelationBackend>,
}

impl RelationSystem {
    pub fn new(backend: Arc<dyn RelationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn RelationBackend {
        self.backend.as_ref()
    }

    /// Loads a ticket or fails with `NotFound`
    pub fn ticket(&self, id: i64) -> Result<Ticket> {
        self.backend
            .get_ticket(id)?
            .ok_or_else(|| RelationError::NotFound(format!("Ticket {}", id)))
    }

    /// Checks a candidate relation without storing it
    pub fn validate_relation(&self, relation: &Relation) -> Result<()> {
        if relation.realm != REALM_TICKET {
            return Err(RelationError::Validation(format!(
                "Relations are not supported for realm '{}'",
                relation.realm
            )));
        }
        if relation.source == relation.dest {
            return Err(RelationError::Validation(format!(
                "Ticket #{} can't be related to itself",
                relation.source
            )));
        }
        for id in [relation.source, relation.dest] {
            if self.backend.get_ticket(id)?.is_none() {
                return Err(RelationError::Validation(format!(
                    "Ticket #{} does not exist",
                    id
                )));
            }
        }
        if self.backend.relation_exists(relation)? {
            return Err(RelationError::AlreadyExists(relation.to_string()));
        }
        Ok(())
    }

    /// Validates and stores a relation, returning it with its id
    pub fn add_relation(&self, relation: Relation) -> Result<Relation> {
        self.validate_relation(&relation)?;
        let stored = self.backend.insert_relation(&relation)?;
        log::info!(
            "Added relation {} (id {})",
            stored,
            stored.id.unwrap_or_default()
        );
        Ok(stored)
    }

    /// Removes exactly the relation with this id.
    ///
    /// Returns the removed relation, or `None` when no such row exists; a
    /// second delete of the same id is therefore harmless.
    pub fn delete_relation(&self, id: i64) -> Result<Option<Relation>> {
        let Some(relation) = self.backend.get_relation(id)? else {
            log::debug!("Relation {} already gone", id);
            return Ok(None);
        };
        if self.backend.delete_relation(id)? {
            log::info!("Deleted relation {} (id {})", relation, id);
            Ok(Some(relation))
        } else {
            Ok(None)
        }
    }

    pub fn get_relation(&self, id: i64) -> Result<Option<Relation>> {
        self.backend.get_relation(id)
    }

    /// Selects relations, sorted by type key and id
    pub fn select(&self, filter: &RelationFilter) -> Result<Vec<Relation>> {
        let mut relations = self.backend.select_relations(filter)?;
        sort_by_type(&mut relations);
        log::debug!("Selected {} relations for {:?}", relations.len(), filter);
        Ok(relations)
    }

    /// Outgoing and incoming relations of a ticket
    pub fn relations_of(&self, ticket: i64) -> Result<TicketRelations> {
        Ok(TicketRelations {
            outgoing: self.select(&RelationFilter::realm(REALM_TICKET).source(ticket))?,
            incoming: self.select(&RelationFilter::realm(REALM_TICKET).dest(ticket))?,
        })
    }

    /// Validates a proposed ticket state before it is saved.
    ///
    /// `ticket` carries the new status and resolution; `relationdata` is the
    /// duplicate target typed into the resolve form, if any. An empty result
    /// means the change may proceed.
    pub fn validate_ticket(
        &self,
        ticket: &Ticket,
        relationdata: Option<&str>,
    ) -> Result<Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        if ticket.is_closed() {
            let blockers = self.select(
                &RelationFilter::realm(REALM_TICKET)
                    .dest(ticket.id)
                    .rel_type(RelationType::Blocking),
            )?;
            for rel in blockers {
                if !self.is_closed(rel.source)? {
                    issues.push(ValidationIssue::ticket(format!(
                        "This ticket is blocked. It can't be resolved while ticket #{} is still open.",
                        rel.source
                    )));
                }
            }

            let children = self.select(
                &RelationFilter::realm(REALM_TICKET)
                    .source(ticket.id)
                    .rel_type(RelationType::ParentChild),
            )?;
            for rel in children {
                if !self.is_closed(rel.dest)? {
                    issues.push(ValidationIssue::ticket(format!(
                        "This ticket is a parent. It can't be resolved while ticket #{} is still open.",
                        rel.dest
                    )));
                }
            }
        }

        if ticket.resolution.as_deref() == Some(RESOLUTION_DUPLICATE) {
            let raw = relationdata
                .unwrap_or_default()
                .trim_matches(|c: char| c == '#' || c == ' ');
            match parse_ticket_ref(raw) {
                Some(id) if id == ticket.id => {
                    issues.push(ValidationIssue::ticket(
                        "A ticket can't be a duplicate of itself.".to_string(),
                    ));
                }
                Some(id) if self.backend.get_ticket(id)?.is_some() => {}
                _ => {
                    issues.push(ValidationIssue::ticket(format!(
                        "Ticket {} does not exist.",
                        raw
                    )));
                }
            }
        }

        Ok(issues)
    }

    /// A ticket that no longer exists counts as closed
    fn is_closed(&self, id: i64) -> Result<bool> {
        Ok(self
            .backend
            .get_ticket(id)?
            .map(|t| t.is_closed())
            .unwrap_or(true))
    }

    /// Hook run after a ticket change was saved.
    ///
    /// Creates the duplicate relation when the resolution changed to
    /// `duplicate`, then removes every trace of the transient
    /// `relationdata` field. Returns the created relation, if any.
    pub fn ticket_changed(
        &self,
        ticket: &Ticket,
        old_values: &HashMap<String, Option<String>>,
    ) -> Result<Option<Relation>> {
        let mut created = Ok(None);

        if old_values.contains_key("resolution")
            && ticket.resolution.as_deref() == Some(RESOLUTION_DUPLICATE)
        {
            let relationdata = self.backend.get_custom_field(ticket.id, RELDATA_FIELD)?;
            match relationdata.as_deref().and_then(parse_ticket_ref) {
                Some(dest) => {
                    let relation =
                        Relation::new(REALM_TICKET, ticket.id, dest, RelationType::Duplicate);
                    if self.backend.relation_exists(&relation)? {
                        log::debug!("Duplicate relation {} already stored", relation);
                    } else {
                        created = self.add_relation(relation).map(Some);
                    }
                }
                None => log::warn!(
                    "Ticket #{} resolved as duplicate without a target ticket",
                    ticket.id
                ),
            }
        }

        self.backend.delete_changes(ticket.id, RELDATA_FIELD)?;
        self.backend.delete_custom_field(ticket.id, RELDATA_FIELD)?;
        created
    }

    /// Hook run after a ticket was created
    pub fn ticket_created(&self, ticket: &Ticket) -> Result<()> {
        self.backend.delete_custom_field(ticket.id, RELDATA_FIELD)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteBackend;
    use crate::models::TicketStatus;
    use tempfile::NamedTempFile;

    fn system() -> (NamedTempFile, RelationSystem) {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();
        (temp_file, RelationSystem::new(Arc::new(backend)))
    }

    fn tickets(system: &RelationSystem, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                system
                    .backend()
                    .insert_ticket(&format!("ticket {}", i), "tester")
                    .unwrap()
                    .id
            })
            .collect()
    }

    fn close(system: &RelationSystem, id: i64) {
        let mut t = system.ticket(id).unwrap();
        t.status = TicketStatus::Closed;
        t.resolution = Some("fixed".to_string());
        system.backend().update_ticket(&t).unwrap();
    }

    fn proposed_close(system: &RelationSystem, id: i64, resolution: &str) -> Ticket {
        let mut t = system.ticket(id).unwrap();
        t.status = TicketStatus::Closed;
        t.resolution = Some(resolution.to_string());
        t
    }

    #[test]
    fn test_add_relation_assigns_id() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        let rel = system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Relation))
            .unwrap();
        assert!(rel.id.is_some());
        assert_eq!(system.get_relation(rel.id.unwrap()).unwrap(), Some(rel));
    }

    #[test]
    fn test_duplicate_relation_rejected() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        let rel = Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Blocking);
        system.add_relation(rel.clone()).unwrap();

        let err = system.add_relation(rel).unwrap_err();
        assert!(matches!(err, RelationError::AlreadyExists(_)));

        // Same ends with another type is a different relation
        system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Relation))
            .unwrap();
    }

    #[test]
    fn test_relation_to_unknown_ticket_rejected() {
        let (_f, system) = system();
        let ids = tickets(&system, 1);
        let err = system
            .add_relation(Relation::new(REALM_TICKET, ids[0], 99, RelationType::Relation))
            .unwrap_err();
        assert!(matches!(err, RelationError::Validation(_)));
        assert!(err.to_string().contains("#99"));
    }

    #[test]
    fn test_self_relation_rejected() {
        let (_f, system) = system();
        let ids = tickets(&system, 1);
        let err = system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[0], RelationType::Relation))
            .unwrap_err();
        assert!(matches!(err, RelationError::Validation(_)));
    }

    #[test]
    fn test_foreign_realm_rejected() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        let err = system
            .add_relation(Relation::new("wiki", ids[0], ids[1], RelationType::Relation))
            .unwrap_err();
        assert!(matches!(err, RelationError::Validation(_)));
    }

    #[test]
    fn test_delete_relation_removes_exactly_one_row() {
        let (_f, system) = system();
        let ids = tickets(&system, 3);
        let a = system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Relation))
            .unwrap();
        let b = system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[2], RelationType::Relation))
            .unwrap();

        let removed = system.delete_relation(a.id.unwrap()).unwrap();
        assert_eq!(removed, Some(a.clone()));
        assert_eq!(system.select(&RelationFilter::default()).unwrap(), vec![b]);

        // Deleting again is harmless
        assert_eq!(system.delete_relation(a.id.unwrap()).unwrap(), None);
        assert_eq!(system.select(&RelationFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_select_sorted_by_type_key() {
        let (_f, system) = system();
        let ids = tickets(&system, 4);
        for (dest, t) in [
            (ids[1], RelationType::Relation),
            (ids[2], RelationType::Blocking),
            (ids[3], RelationType::Duplicate),
        ] {
            system
                .add_relation(Relation::new(REALM_TICKET, ids[0], dest, t))
                .unwrap();
        }
        let types: Vec<_> = system
            .relations_of(ids[0])
            .unwrap()
            .outgoing
            .iter()
            .map(|r| r.rel_type)
            .collect();
        assert_eq!(
            types,
            vec![
                RelationType::Blocking,
                RelationType::Duplicate,
                RelationType::Relation
            ]
        );
    }

    #[test]
    fn test_relations_of_splits_direction() {
        let (_f, system) = system();
        let ids = tickets(&system, 3);
        system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Blocking))
            .unwrap();
        system
            .add_relation(Relation::new(REALM_TICKET, ids[2], ids[1], RelationType::ParentChild))
            .unwrap();

        let rels = system.relations_of(ids[1]).unwrap();
        assert!(rels.outgoing.is_empty());
        assert_eq!(rels.incoming.len(), 2);
        assert!(system.relations_of(ids[0]).unwrap().incoming.is_empty());
        assert!(!system.relations_of(ids[0]).unwrap().is_empty());
    }

    #[test]
    fn test_open_blocker_prevents_close() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        // ids[0] blocks ids[1]
        system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Blocking))
            .unwrap();

        let issues = system
            .validate_ticket(&proposed_close(&system, ids[1], "fixed"), None)
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].field.is_none());
        assert!(issues[0]
            .message
            .contains(&format!("while ticket #{} is still open", ids[0])));

        // The blocker itself may be closed
        assert!(system
            .validate_ticket(&proposed_close(&system, ids[0], "fixed"), None)
            .unwrap()
            .is_empty());

        close(&system, ids[0]);
        assert!(system
            .validate_ticket(&proposed_close(&system, ids[1], "fixed"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_open_child_prevents_parent_close() {
        let (_f, system) = system();
        let ids = tickets(&system, 3);
        for child in [ids[1], ids[2]] {
            system
                .add_relation(Relation::new(REALM_TICKET, ids[0], child, RelationType::ParentChild))
                .unwrap();
        }

        let issues = system
            .validate_ticket(&proposed_close(&system, ids[0], "fixed"), None)
            .unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.starts_with("This ticket is a parent."));

        // A child can close while the parent is open
        assert!(system
            .validate_ticket(&proposed_close(&system, ids[1], "fixed"), None)
            .unwrap()
            .is_empty());

        close(&system, ids[1]);
        close(&system, ids[2]);
        assert!(system
            .validate_ticket(&proposed_close(&system, ids[0], "fixed"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_blocking_messages_come_first() {
        let (_f, system) = system();
        let ids = tickets(&system, 3);
        system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::ParentChild))
            .unwrap();
        system
            .add_relation(Relation::new(REALM_TICKET, ids[2], ids[0], RelationType::Blocking))
            .unwrap();
        let issues = system
            .validate_ticket(&proposed_close(&system, ids[0], "fixed"), None)
            .unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.starts_with("This ticket is blocked."));
    }

    #[test]
    fn test_unrelated_types_do_not_block() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        system
            .add_relation(Relation::new(REALM_TICKET, ids[0], ids[1], RelationType::Relation))
            .unwrap();
        system
            .add_relation(Relation::new(REALM_TICKET, ids[1], ids[0], RelationType::Duplicate))
            .unwrap();
        assert!(system
            .validate_ticket(&proposed_close(&system, ids[0], "fixed"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_duplicate_resolution_needs_existing_target() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        let proposed = proposed_close(&system, ids[0], RESOLUTION_DUPLICATE);

        let issues = system.validate_ticket(&proposed, Some("#77")).unwrap();
        assert_eq!(issues[0].message, "Ticket 77 does not exist.");

        let issues = system.validate_ticket(&proposed, None).unwrap();
        assert_eq!(issues.len(), 1);

        let target = format!("#{}", ids[1]);
        assert!(system
            .validate_ticket(&proposed, Some(&target))
            .unwrap()
            .is_empty());

        let own = format!("{}", ids[0]);
        assert_eq!(system.validate_ticket(&proposed, Some(&own)).unwrap().len(), 1);
    }

    #[test]
    fn test_ticket_changed_creates_duplicate_relation_and_cleans_up() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        let backend = system.backend();
        backend
            .set_custom_field(ids[0], RELDATA_FIELD, &format!("#{}", ids[1]))
            .unwrap();

        let ticket = proposed_close(&system, ids[0], RESOLUTION_DUPLICATE);
        backend.update_ticket(&ticket).unwrap();
        let old_values = HashMap::from([("resolution".to_string(), None)]);

        let created = system.ticket_changed(&ticket, &old_values).unwrap().unwrap();
        assert_eq!(created.source, ids[0]);
        assert_eq!(created.dest, ids[1]);
        assert_eq!(created.rel_type, RelationType::Duplicate);
        assert!(backend.get_custom_field(ids[0], RELDATA_FIELD).unwrap().is_none());
    }

    #[test]
    fn test_ticket_changed_without_resolution_change_only_cleans_up() {
        let (_f, system) = system();
        let ids = tickets(&system, 2);
        let backend = system.backend();
        backend.set_custom_field(ids[0], RELDATA_FIELD, "2").unwrap();

        let ticket = system.ticket(ids[0]).unwrap();
        let created = system.ticket_changed(&ticket, &HashMap::new()).unwrap();
        assert!(created.is_none());
        assert!(backend.get_custom_field(ids[0], RELDATA_FIELD).unwrap().is_none());
        assert!(system.select(&RelationFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_ticket_created_drops_relationdata() {
        let (_f, system) = system();
        let ids = tickets(&system, 1);
        system
            .backend()
            .set_custom_field(ids[0], RELDATA_FIELD, "1")
            .unwrap();
        system.ticket_created(&system.ticket(ids[0]).unwrap()).unwrap();
        assert!(system
            .backend()
            .get_custom_field(ids[0], RELDATA_FIELD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_ticket_is_not_found() {
        let (_f, system) = system();
        assert!(matches!(system.ticket(5), Err(RelationError::NotFound(_))));
    }
}
