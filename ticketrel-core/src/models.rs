use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RelationError, Result};

/// Realm of ticket relations
pub const REALM_TICKET: &str = "ticket";

/// Ticket custom field used to carry the duplicate target through a ticket change
pub const RELDATA_FIELD: &str = "relationdata";

/// Resolution that creates a duplicate relation
pub const RESOLUTION_DUPLICATE: &str = "duplicate";

pub const ARROW_RIGHT: &str = "\u{2192}";
pub const ARROW_LEFT: &str = "\u{2190}";
pub const ARROW_BOTH: &str = "\u{2194}";

/// Prefix marking a reversed relation choice (current ticket is the destination)
pub const REVERSE_PREFIX: char = '!';

/// The four supported relation types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    /// Source blocks the destination from being closed
    Blocking,
    /// Plain relation without semantics
    Relation,
    /// Source is the parent of the destination
    #[serde(rename = "parentchild")]
    ParentChild,
    /// Source is a duplicate of the destination
    Duplicate,
}

impl RelationType {
    /// All types in display order
    pub const ALL: [RelationType; 4] = [
        RelationType::Blocking,
        RelationType::Relation,
        RelationType::ParentChild,
        RelationType::Duplicate,
    ];

    /// Key stored in the database and used in forms
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Blocking => "blocking",
            RelationType::Relation => "relation",
            RelationType::ParentChild => "parentchild",
            RelationType::Duplicate => "duplicate",
        }
    }

    /// Label read from source to destination
    pub fn label(&self) -> &'static str {
        match self {
            RelationType::Blocking => "is blocking",
            RelationType::Relation => "relates to",
            RelationType::ParentChild => "is parent of",
            RelationType::Duplicate => "is duplicate of",
        }
    }

    /// Label read from destination to source
    pub fn reverse_label(&self) -> &'static str {
        match self {
            RelationType::Blocking => "is blocked by",
            RelationType::Relation => "is related to",
            RelationType::ParentChild => "is child of",
            RelationType::Duplicate => "is duplicated by",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "blocking" => Ok(RelationType::Blocking),
            "relation" => Ok(RelationType::Relation),
            "parentchild" => Ok(RelationType::ParentChild),
            "duplicate" => Ok(RelationType::Duplicate),
            other => Err(RelationError::Validation(format!(
                "Unrecognized relation type '{}'",
                other
            ))),
        }
    }
}

/// A relation type picked in a form, possibly reversed with a leading `!`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationChoice {
    pub rel_type: RelationType,
    pub reversed: bool,
}

impl FromStr for RelationChoice {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.strip_prefix(REVERSE_PREFIX) {
            Some(rest) => Ok(RelationChoice {
                rel_type: rest.parse()?,
                reversed: true,
            }),
            None => Ok(RelationChoice {
                rel_type: s.parse()?,
                reversed: false,
            }),
        }
    }
}

/// A typed directed edge between two resources of a realm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relation {
    /// Row id, `None` until stored
    pub id: Option<i64>,
    pub realm: String,
    pub source: i64,
    pub dest: i64,
    #[serde(rename = "type")]
    pub rel_type: RelationType,
}

impl Relation {
    /// Creates a new, unsaved relation
    pub fn new(realm: &str, source: i64, dest: i64, rel_type: RelationType) -> Self {
        Self {
            id: None,
            realm: realm.to_string(),
            source,
            dest,
            rel_type,
        }
    }

    /// Creates a ticket relation from the perspective of `current`
    pub fn from_choice(current: i64, other: i64, choice: RelationChoice) -> Self {
        if choice.reversed {
            Relation::new(REALM_TICKET, other, current, choice.rel_type)
        } else {
            Relation::new(REALM_TICKET, current, other, choice.rel_type)
        }
    }

    /// Short form used in notices, e.g. `#1 ↔ #2`
    pub fn arrow_text(&self) -> String {
        format!("#{} {} #{}", self.source, ARROW_BOTH, self.dest)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} #{}", self.source, self.rel_type, self.dest)
    }
}

/// Filter for selecting relations; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationFilter {
    pub realm: Option<String>,
    pub source: Option<i64>,
    pub dest: Option<i64>,
    pub rel_type: Option<RelationType>,
}

impl RelationFilter {
    pub fn realm(realm: &str) -> Self {
        Self {
            realm: Some(realm.to_string()),
            ..Default::default()
        }
    }

    pub fn source(mut self, source: i64) -> Self {
        self.source = Some(source);
        self
    }

    pub fn dest(mut self, dest: i64) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn rel_type(mut self, rel_type: RelationType) -> Self {
        self.rel_type = Some(rel_type);
        self
    }
}

/// Ticket workflow status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    New,
    Assigned,
    Accepted,
    Reopened,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::Assigned => "assigned",
            TicketStatus::Accepted => "accepted",
            TicketStatus::Reopened => "reopened",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        *self == TicketStatus::Closed
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(TicketStatus::New),
            "assigned" => Ok(TicketStatus::Assigned),
            "accepted" => Ok(TicketStatus::Accepted),
            "reopened" => Ok(TicketStatus::Reopened),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(RelationError::Validation(format!(
                "Invalid ticket status: {}",
                other
            ))),
        }
    }
}

/// Minimal ticket record; relations only reference tickets by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub summary: String,
    pub reporter: String,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
}

impl Ticket {
    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }
}

/// One row of a ticket's change log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketChange {
    pub ticket: i64,
    pub time: DateTime<Utc>,
    pub author: String,
    pub field: String,
    pub oldvalue: Option<String>,
    pub newvalue: Option<String>,
}

/// One problem found while validating a ticket change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Offending field, `None` for problems with the ticket as a whole
    pub field: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn ticket(message: String) -> Self {
        Self {
            field: None,
            message,
        }
    }
}

/// Parses a ticket reference such as `12`, `#12` or ` # 12 `
pub fn parse_ticket_ref(s: &str) -> Option<i64> {
    s.trim_matches(|c: char| c == '#' || c.is_whitespace())
        .parse()
        .ok()
        .filter(|id: &i64| *id > 0)
}
