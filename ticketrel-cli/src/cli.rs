use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Typed relations between tickets")]
pub struct Cli {
    /// Path to the configuration file
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides the configuration)
    #[clap(long)]
    pub db: Option<PathBuf>,

    /// User performing the changes (defaults to $USER)
    #[clap(long, short = 'u')]
    pub user: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum TicketCommand {
    /// Create a new ticket
    Add {
        /// Summary of the ticket
        #[clap(long)]
        summary: Option<String>,

        /// Use interactive mode (prompts)
        #[clap(long)]
        interactive: bool,
    },

    /// List all tickets
    List {
        /// Filter by status (new, assigned, accepted, reopened, closed)
        #[clap(long)]
        status: Option<String>,
    },

    /// Show a ticket with its relations
    Show {
        /// Ticket id (e.g. 12 or #12)
        id: String,
    },

    /// Close a ticket with a resolution
    Close {
        /// Ticket id
        id: String,

        /// Resolution (fixed, invalid, wontfix, duplicate, worksforme)
        #[clap(long, short = 'r', default_value = "fixed")]
        resolution: String,

        /// Original ticket when resolving as duplicate
        #[clap(long)]
        duplicate_of: Option<String>,
    },

    /// Reopen a closed ticket
    Reopen {
        /// Ticket id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RelationCommand {
    /// Add a relation between two tickets
    Add {
        /// Current ticket id
        ticket: String,

        /// Relation type (blocking, relation, parentchild, duplicate); prefix with ! to reverse
        r#type: String,

        /// Other ticket id
        other: String,
    },

    /// Remove relations by id
    Remove {
        /// Relation ids
        #[clap(required = true)]
        ids: Vec<i64>,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// List all relations of a ticket
    List {
        /// Ticket id
        ticket: String,
    },

    /// List the available relation types
    Types,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or upgrade the database
    Init,

    /// Ticket commands
    #[clap(subcommand)]
    Ticket(TicketCommand),

    /// Relation management commands
    #[clap(subcommand)]
    Rel(RelationCommand),
}
