use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use ticketrel_core::RelationError;

/// Errors a request handler can end with
#[derive(Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Relation(#[from] RelationError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Relation(RelationError::NotFound(_)) => StatusCode::NOT_FOUND,
            WebError::Relation(RelationError::Permission(_)) => StatusCode::FORBIDDEN,
            WebError::Relation(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::debug!("Request rejected ({}): {}", status, self);
        }
        let title = status.canonical_reason().unwrap_or("Error");
        let body = format!(
            "<!DOCTYPE html><html><head><title>{title}</title></head>\
             <body><h1>{title}</h1><p>{}</p></body></html>",
            tera::escape_html(&self.to_string())
        );
        (status, Html(body)).into_response()
    }
}
