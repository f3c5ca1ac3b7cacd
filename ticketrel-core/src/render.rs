//! Presentation helpers shared by the CLI and the web pages

use serde::Serialize;

use crate::models::{Relation, RelationType, ARROW_LEFT, ARROW_RIGHT, REVERSE_PREFIX};
use crate::system::TicketRelations;

/// A relation prepared for display from one ticket's point of view
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelationView {
    pub id: i64,
    /// Ticket shown first
    pub left: i64,
    /// Ticket shown last
    pub right: i64,
    pub label: String,
    pub rel_type: String,
    pub reverse: bool,
}

impl RelationView {
    /// Reads a relation forward (`source label dest`) or reversed (`dest label source`)
    pub fn new(relation: &Relation, reverse: bool) -> Self {
        let (left, right, label) = if reverse {
            (relation.dest, relation.source, relation.rel_type.reverse_label())
        } else {
            (relation.source, relation.dest, relation.rel_type.label())
        };
        Self {
            id: relation.id.unwrap_or_default(),
            left,
            right,
            label: label.to_string(),
            rel_type: relation.rel_type.as_str().to_string(),
            reverse,
        }
    }

    /// Plain text, e.g. `#1 is blocking #2`
    pub fn text(&self) -> String {
        format!("#{} {} #{}", self.left, self.label, self.right)
    }
}

/// Display lists for a ticket's relations
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationsView {
    pub outgoing: Vec<RelationView>,
    pub incoming: Vec<RelationView>,
    /// Header over the outgoing list, empty when there are none
    pub outgoing_header: String,
    /// Header over the incoming list, empty when there are none
    pub incoming_header: String,
    pub have_relations: bool,
}

impl From<&TicketRelations> for RelationsView {
    fn from(relations: &TicketRelations) -> Self {
        let outgoing: Vec<_> = relations
            .outgoing
            .iter()
            .map(|r| RelationView::new(r, false))
            .collect();
        let incoming: Vec<_> = relations
            .incoming
            .iter()
            .map(|r| RelationView::new(r, true))
            .collect();
        Self {
            outgoing_header: if outgoing.is_empty() {
                String::new()
            } else {
                ARROW_RIGHT.to_string()
            },
            incoming_header: if incoming.is_empty() {
                String::new()
            } else {
                format!("{} (reverse)", ARROW_LEFT)
            },
            have_relations: !relations.is_empty(),
            outgoing,
            incoming,
        }
    }
}

/// One entry of the relation type select control
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelationOption {
    pub value: String,
    pub label: String,
}

/// Select options: each type forward, then reversed with a `!` prefix
pub fn relation_options() -> Vec<RelationOption> {
    RelationType::ALL
        .iter()
        .flat_map(|t| {
            [
                RelationOption {
                    value: t.as_str().to_string(),
                    label: format!("{} {}", t.label(), ARROW_RIGHT),
                },
                RelationOption {
                    value: format!("{}{}", REVERSE_PREFIX, t.as_str()),
                    label: format!("{} {}", ARROW_LEFT, t.reverse_label()),
                },
            ]
        })
        .collect()
}

pub fn added_notice(relation: &Relation) -> String {
    format!("Relation {} added.", relation.arrow_text())
}

pub fn deleted_notice(relation: &Relation) -> String {
    format!("Deleted relation {}", relation.arrow_text())
}
