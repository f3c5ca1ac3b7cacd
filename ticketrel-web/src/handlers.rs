use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use tera::Context;

use ticketrel_core::{
    parse_ticket_ref, relation_options, render, Relation, RelationChoice, RelationError,
    RelationsView, Ticket, TICKET_MODIFY, TICKET_VIEW,
};

use crate::error::WebError;
use crate::templates;
use crate::{AppState, USER_HEADER};

/// Resolutions offered by the resolve form
const RESOLUTIONS: [&str; 5] = ["fixed", "invalid", "wontfix", "duplicate", "worksforme"];

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub format: Option<String>,
}

impl PageQuery {
    fn is_fragment(&self) -> bool {
        self.format.as_deref() == Some("fragment")
    }
}

fn current_user(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(ticketrel_core::permissions::ANONYMOUS)
        .to_string()
}

fn ticket_url(id: i64) -> String {
    format!("/ticket/{}", id)
}

/// Context shared by every page that shows a ticket and its relations
fn page_context(state: &AppState, ticket: &Ticket, user: &str) -> Result<Context, WebError> {
    let relations = state.system().relations_of(ticket.id)?;
    let pending = state.take_pending(user);

    let mut ctx = Context::new();
    ctx.insert("ticket", ticket);
    ctx.insert("ticket_url", &ticket_url(ticket.id));
    ctx.insert("relations", &RelationsView::from(&relations));
    ctx.insert("relation_types", &relation_options());
    ctx.insert("resolutions", &RESOLUTIONS);
    ctx.insert("notices", &pending.notices);
    ctx.insert("warnings", &pending.warnings);
    ctx.insert("user", user);
    ctx.insert("can_modify", &state.policy.has(user, TICKET_MODIFY));
    Ok(ctx)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn ticket_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Html<String>, WebError> {
    let user = current_user(&headers);
    state.policy.require(&user, TICKET_VIEW)?;

    let ticket = state.system().ticket(id)?;
    let ctx = page_context(&state, &ticket, &user)?;
    Ok(Html(state.templates.render(templates::TICKET, &ctx)?))
}

#[derive(Debug, Deserialize)]
pub struct TicketForm {
    pub action: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub field_relationdata: Option<String>,
}

/// Resolve or reopen a ticket, then go back to its page
pub async fn ticket_change(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    axum::Form(form): axum::Form<TicketForm>,
) -> Result<Response, WebError> {
    let user = current_user(&headers);
    state.policy.require(&user, TICKET_MODIFY)?;
    state.system().ticket(id)?;

    let result = match form.action.as_str() {
        "resolve" => {
            let resolution = form.resolution.as_deref().unwrap_or_default();
            let duplicate_of = form
                .field_relationdata
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty());
            state.workflow.resolve(id, resolution, duplicate_of, &user)
        }
        "reopen" => state.workflow.reopen(id, &user),
        other => {
            return Err(WebError::BadRequest(format!("Unknown action '{}'", other)));
        }
    };

    match result {
        Ok(change) => {
            state.add_notice(&user, "Your changes have been saved.".to_string());
            if let Some(rel) = change.created_relation {
                state.add_notice(&user, render::added_notice(&rel));
            }
        }
        Err(e) if e.is_user_error() => {
            for line in e.to_string().lines() {
                state.add_warning(&user, line.to_string());
            }
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Redirect::to(&ticket_url(id)).into_response())
}

/// Relation management page, or just its fragment with `?format=fragment`
pub async fn manage_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Result<Html<String>, WebError> {
    let user = current_user(&headers);
    state.policy.require(&user, TICKET_VIEW)?;

    let ticket = state.system().ticket(id)?;
    let mut ctx = page_context(&state, &ticket, &user)?;
    ctx.insert("fragment", &query.is_fragment());

    let template = if query.is_fragment() {
        templates::FRAGMENT
    } else {
        templates::MANAGE
    };
    Ok(Html(state.templates.render(template, &ctx)?))
}

/// Fields posted by the add and remove forms
#[derive(Debug, Default)]
struct RelationForm {
    add: bool,
    remove: bool,
    current: Option<String>,
    other: Option<String>,
    relation_type: Option<String>,
    selected: Vec<String>,
    format: Option<String>,
}

impl RelationForm {
    fn parse(body: &str) -> Self {
        let mut form = Self::default();
        for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
            match key.as_ref() {
                "add-relation" => form.add = true,
                "remove-relation" => form.remove = true,
                "current-tkt" => form.current = Some(value.into_owned()),
                "other-tkt" => form.other = Some(value.into_owned()),
                "relation-type" => form.relation_type = Some(value.into_owned()),
                "sel" => form.selected.push(value.into_owned()),
                "format" => form.format = Some(value.into_owned()),
                _ => {}
            }
        }
        form
    }
}

fn add_relation(state: &AppState, id: i64, form: &RelationForm) -> Result<Relation, RelationError> {
    let current = match form.current.as_deref() {
        Some(raw) => parse_ticket_ref(raw)
            .ok_or_else(|| RelationError::Validation(format!("Invalid ticket id '{}'", raw)))?,
        None => id,
    };
    let other_raw = form.other.as_deref().unwrap_or_default();
    let other = parse_ticket_ref(other_raw).ok_or_else(|| {
        RelationError::Validation(format!("Ticket {} does not exist.", other_raw.trim()))
    })?;
    let choice: RelationChoice = form.relation_type.as_deref().unwrap_or_default().parse()?;

    state
        .system()
        .add_relation(Relation::from_choice(current, other, choice))
}

/// Handles the add and remove forms, then redirects
pub async fn relations_edit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
    uri: Uri,
    body: String,
) -> Result<Response, WebError> {
    let user = current_user(&headers);
    state.policy.require(&user, TICKET_VIEW)?;
    state.policy.require(&user, TICKET_MODIFY)?;
    state.system().ticket(id)?;

    let form = RelationForm::parse(&body);

    if form.add {
        match add_relation(&state, id, &form) {
            Ok(relation) => state.add_notice(&user, render::added_notice(&relation)),
            Err(e) if e.is_user_error() => state.add_warning(&user, e.to_string()),
            Err(e) => return Err(e.into()),
        }
    } else if form.remove {
        for raw in &form.selected {
            let rel_id: i64 = raw
                .parse()
                .map_err(|_| WebError::BadRequest(format!("Invalid relation id '{}'", raw)))?;
            if let Some(removed) = state.system().delete_relation(rel_id)? {
                state.add_notice(&user, render::deleted_notice(&removed));
            }
        }
    }

    let fragment = query.is_fragment() || form.format.as_deref() == Some("fragment");
    let target = if fragment {
        ticket_url(id)
    } else {
        uri.path().to_string()
    };
    Ok(Redirect::to(&target).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use ticketrel_core::{
        open_or_create, PermissionPolicy, RelationFilter, RelationSystem, RelationType,
        TicketWorkflow, REALM_TICKET,
    };

    fn setup() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let backend = open_or_create(&dir.path().join("relations.db")).unwrap();
        let workflow = TicketWorkflow::new(RelationSystem::new(backend));
        workflow.create_ticket("First", "alice").unwrap();
        workflow.create_ticket("Second", "alice").unwrap();
        let state = AppState::new(workflow, PermissionPolicy::default()).unwrap();
        (dir, state)
    }

    fn post_form(uri: &str, user: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    fn relation_count(state: &AppState) -> usize {
        state
            .system()
            .select(&RelationFilter::realm(REALM_TICKET))
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = setup();
        let response = router(state).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_add_and_remove_relation() {
        let (_dir, state) = setup();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(post_form(
                "/ticket/1/relations",
                Some("bob"),
                "add-relation=Add&current-tkt=1&other-tkt=%232&relation-type=blocking",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/ticket/1/relations");

        let rels = state
            .system()
            .select(&RelationFilter::realm(REALM_TICKET))
            .unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source, 1);
        assert_eq!(rels[0].dest, 2);
        assert_eq!(rels[0].rel_type, RelationType::Blocking);

        let page = app
            .clone()
            .oneshot(get("/ticket/1/relations", Some("bob")))
            .await
            .unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        let html = body_text(page).await;
        assert!(html.contains("Relation #1 \u{2194} #2 added."));
        assert!(html.contains("is blocking"));

        let rel_id = rels[0].id.unwrap();
        let response = app
            .clone()
            .oneshot(post_form(
                "/ticket/1/relations",
                Some("bob"),
                &format!("remove-relation=Remove&sel={}", rel_id),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(relation_count(&state), 0);

        let html = body_text(
            app.oneshot(get("/ticket/1/relations", Some("bob")))
                .await
                .unwrap(),
        )
        .await;
        assert!(html.contains("Deleted relation #1 \u{2194} #2"));
        assert!(html.contains("No relations defined."));
    }

    #[tokio::test]
    async fn test_reversed_choice_swaps_tickets() {
        let (_dir, state) = setup();
        let response = router(state.clone())
            .oneshot(post_form(
                "/ticket/1/relations",
                Some("bob"),
                "add-relation=Add&current-tkt=1&other-tkt=2&relation-type=%21parentchild",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let rels = state
            .system()
            .select(&RelationFilter::realm(REALM_TICKET))
            .unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source, 2);
        assert_eq!(rels[0].dest, 1);
        assert_eq!(rels[0].rel_type, RelationType::ParentChild);
    }

    #[tokio::test]
    async fn test_modify_requires_permission() {
        let (_dir, state) = setup();
        let response = router(state.clone())
            .oneshot(post_form(
                "/ticket/1/relations",
                None,
                "add-relation=Add&current-tkt=1&other-tkt=2&relation-type=relation",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(relation_count(&state), 0);
    }

    #[tokio::test]
    async fn test_any_relations_post_requires_modify() {
        let (_dir, state) = setup();
        state
            .system()
            .add_relation(Relation::new(REALM_TICKET, 1, 2, RelationType::Relation))
            .unwrap();

        let response = router(state.clone())
            .oneshot(post_form("/ticket/1/relations", None, "sel=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(relation_count(&state), 1);
    }

    #[tokio::test]
    async fn test_unknown_ticket_is_not_found() {
        let (_dir, state) = setup();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(get("/ticket/99/relations", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/ticket/99", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_relation_shows_warning() {
        let (_dir, state) = setup();
        let app = router(state.clone());
        let body = "add-relation=Add&current-tkt=1&other-tkt=2&relation-type=relation";

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_form("/ticket/1/relations/", Some("bob"), body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/ticket/1/relations/");
        }
        assert_eq!(relation_count(&state), 1);

        let html = body_text(
            app.oneshot(get("/ticket/1/relations", Some("bob")))
                .await
                .unwrap(),
        )
        .await;
        assert!(html.contains("class=\"warning\""));
        assert!(html.contains("already exists"));
    }

    #[tokio::test]
    async fn test_fragment_mode() {
        let (_dir, state) = setup();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(get("/ticket/1/relations?format=fragment", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.starts_with("<div id=\"ticket-relations\">"));
        assert!(!html.contains("<html>"));

        let response = app
            .oneshot(post_form(
                "/ticket/1/relations?format=fragment",
                Some("bob"),
                "add-relation=Add&current-tkt=1&other-tkt=2&relation-type=duplicate",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/ticket/1");
    }

    #[tokio::test]
    async fn test_ticket_page_shows_relations() {
        let (_dir, state) = setup();
        state
            .system()
            .add_relation(Relation::new(REALM_TICKET, 2, 1, RelationType::Blocking))
            .unwrap();

        let html = body_text(
            router(state)
                .oneshot(get("/ticket/1", Some("bob")))
                .await
                .unwrap(),
        )
        .await;
        assert!(html.contains("\u{2190} (reverse)"));
        assert!(html.contains("is blocked by"));
        assert!(html.contains("value=\"Modify\""));
        assert!(html.contains("Duplicate of"));
    }

    #[tokio::test]
    async fn test_closing_blocked_ticket_shows_warning() {
        let (_dir, state) = setup();
        state
            .system()
            .add_relation(Relation::new(REALM_TICKET, 1, 2, RelationType::Blocking))
            .unwrap();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(post_form(
                "/ticket/2",
                Some("bob"),
                "action=resolve&resolution=fixed&field_relationdata=",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/ticket/2");
        assert!(!state.system().ticket(2).unwrap().is_closed());

        let html = body_text(app.oneshot(get("/ticket/2", Some("bob"))).await.unwrap()).await;
        assert!(html.contains("This ticket is blocked."));
    }

    #[tokio::test]
    async fn test_resolve_as_duplicate_creates_relation() {
        let (_dir, state) = setup();
        let response = router(state.clone())
            .oneshot(post_form(
                "/ticket/2",
                Some("bob"),
                "action=resolve&resolution=duplicate&field_relationdata=%231",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let ticket = state.system().ticket(2).unwrap();
        assert!(ticket.is_closed());
        assert_eq!(ticket.resolution.as_deref(), Some("duplicate"));

        let rels = state
            .system()
            .select(&RelationFilter::realm(REALM_TICKET).rel_type(RelationType::Duplicate))
            .unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!((rels[0].source, rels[0].dest), (2, 1));
    }

    #[test]
    fn test_relation_form_collects_repeated_sel() {
        let form = RelationForm::parse("remove-relation=Remove&sel=3&sel=7&format=fragment");
        assert!(form.remove);
        assert!(!form.add);
        assert_eq!(form.selected, vec!["3", "7"]);
        assert_eq!(form.format.as_deref(), Some("fragment"));
    }

    #[test]
    fn test_current_user_defaults_to_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(current_user(&headers), "anonymous");
        headers.insert(USER_HEADER, "carol".parse().unwrap());
        assert_eq!(current_user(&headers), "carol");
    }
}
