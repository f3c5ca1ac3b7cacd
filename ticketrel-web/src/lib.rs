//! HTTP front end for ticket relations
//!
//! Serves the ticket page, the relation management page (or its bare
//! fragment for a dialog) and the resolve/reopen form.

pub mod error;
pub mod handlers;
pub mod templates;

use axum::{
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tera::Tera;
use tower_http::trace::TraceLayer;

use ticketrel_core::{open_or_create, Config, PermissionPolicy, RelationSystem, TicketWorkflow};

pub use error::WebError;

/// Header carrying the authenticated user name
pub const USER_HEADER: &str = "x-remote-user";

/// Notices and warnings waiting to be shown on the next page a user loads
#[derive(Debug, Default, Clone)]
pub struct PendingMessages {
    pub notices: Vec<String>,
    pub warnings: Vec<String>,
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<TicketWorkflow>,
    pub policy: Arc<PermissionPolicy>,
    pub templates: Arc<Tera>,
    pending: Arc<Mutex<HashMap<String, PendingMessages>>>,
}

impl AppState {
    pub fn new(workflow: TicketWorkflow, policy: PermissionPolicy) -> Result<Self, WebError> {
        Ok(Self {
            workflow: Arc::new(workflow),
            policy: Arc::new(policy),
            templates: Arc::new(templates::load()?),
            pending: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn system(&self) -> &RelationSystem {
        self.workflow.system()
    }

    fn with_pending<T>(&self, f: impl FnOnce(&mut HashMap<String, PendingMessages>) -> T) -> T {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut pending)
    }

    pub fn add_notice(&self, user: &str, message: String) {
        self.with_pending(|p| p.entry(user.to_string()).or_default().notices.push(message));
    }

    pub fn add_warning(&self, user: &str, message: String) {
        self.with_pending(|p| p.entry(user.to_string()).or_default().warnings.push(message));
    }

    /// Removes and returns the messages queued for `user`
    pub fn take_pending(&self, user: &str) -> PendingMessages {
        self.with_pending(|p| p.remove(user).unwrap_or_default())
    }
}

/// Builds the router with all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/ticket/:id",
            get(handlers::ticket_page).post(handlers::ticket_change),
        )
        .route(
            "/ticket/:id/relations",
            get(handlers::manage_page).post(handlers::relations_edit),
        )
        .route(
            "/ticket/:id/relations/",
            get(handlers::manage_page).post(handlers::relations_edit),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Opens the database from `config` and serves until the process is stopped
pub async fn run(config: &Config) -> anyhow::Result<()> {
    use anyhow::Context;

    let backend = open_or_create(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    let state = AppState::new(
        TicketWorkflow::new(RelationSystem::new(backend)),
        config.permission_policy(),
    )?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    log::info!("Serving ticket relations on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server error")?;
    Ok(())
}
