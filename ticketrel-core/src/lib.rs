pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod permissions;
pub mod render;
pub mod system;
pub mod workflow;

// Re-export commonly used types
pub use config::{get_config_path, Config, ServerConfig};
pub use db::{open_or_create, DatabaseStats, RelationBackend, SqliteBackend};
pub use error::{RelationError, Result};
pub use models::{
    parse_ticket_ref, Relation, RelationChoice, RelationFilter, RelationType, Ticket,
    TicketChange, TicketStatus, ValidationIssue, ARROW_BOTH, ARROW_LEFT, ARROW_RIGHT,
    REALM_TICKET, RELDATA_FIELD, RESOLUTION_DUPLICATE,
};
pub use permissions::{PermissionPolicy, TICKET_ADMIN, TICKET_MODIFY, TICKET_VIEW};
pub use render::{relation_options, RelationOption, RelationView, RelationsView};
pub use system::{RelationSystem, TicketRelations};
pub use workflow::{ChangeResult, TicketWorkflow};
