//! Browser surface: the chat page plus a small JSON view of the session.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Render the chat page (starts a session on first visit, seeded from `?role=`) |
//! | `POST` | `/chat` | Submit a message (`role`, `message` form fields) |
//! | `POST` | `/role` | Switch the response role |
//! | `POST` | `/session/end` | Tear the session down |
//! | `GET`  | `/api/transcript` | Current session as JSON |
//! | `GET`  | `/health` | Health check |
//!
//! The session id travels in the `adu_session` cookie.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AduChatError, Result};
use crate::models::{Role, StatusLine, Turn};
use crate::registry::SessionRegistry;
use crate::session::ChatSession;

pub const SESSION_COOKIE: &str = "adu_session";

const CHAT_PAGE: &str = include_str!("../templates/chat.html");

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SessionRegistry>,
    pages: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Result<Self> {
        let mut pages = Environment::new();
        pages.add_template("chat.html", CHAT_PAGE)?;
        Ok(Self {
            registry,
            pages: Arc::new(pages),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RoleQuery {
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleForm {
    role: String,
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    role: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct PageView<'a> {
    role: Role,
    roles: [Role; 2],
    turns: &'a [Turn],
    status: &'a [StatusLine],
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct TranscriptView<'a> {
    session_id: Uuid,
    role: Role,
    ready: bool,
    vector_store_id: Option<&'a str>,
    turns: &'a [Turn],
    status: &'a [StatusLine],
}

/// Build the router. When `bearer_token` is set every route except
/// `/health` requires it.
pub fn router(state: AppState, bearer_token: Option<String>) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .route("/role", post(switch_role))
        .route("/session/end", post(end_session))
        .route("/api/transcript", get(transcript))
        .with_state(state);

    if let Some(expected) = bearer_token {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(expected),
            require_bearer,
        ));
    }

    router.route("/health", get(|| async { "ok" }))
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    bind: SocketAddr,
    state: AppState,
    bearer_token: Option<String>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let auth = if bearer_token.is_some() { "bearer" } else { "none" };
    let app = router(state, bearer_token);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, auth, "Starting ADU permit chat server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RoleQuery>,
) -> Response {
    let requested = match query.role.as_deref().map(str::parse::<Role>).transpose() {
        Ok(role) => role,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let (id, session, created) = match state
        .registry
        .get_or_start(session_id(&headers), requested.unwrap_or_default())
        .await
    {
        Ok(found) => found,
        Err(e) => return setup_failed(e),
    };

    let mut session = session.lock().await;
    // GET never switches an existing session's persona; `?role=` only seeds new ones
    let role = session.role();
    let error = session.interact(role, None).await.err().map(|e| {
        tracing::error!(session_id = %id, "Session setup failed: {}", e);
        e.to_string()
    });
    let code = if error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    let response = match render_page(&state.pages, &session, error.as_deref()) {
        Ok(page) => (code, page).into_response(),
        Err(e) => render_failed(e),
    };
    with_session_cookie(response, created.then_some(id))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let role = match form.role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    cycle(&state, &headers, role, Some(form.message)).await
}

async fn switch_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RoleForm>,
) -> Response {
    let role = match form.role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    cycle(&state, &headers, role, None).await
}

/// Run one interaction cycle, then send the browser back to the page.
async fn cycle(
    state: &AppState,
    headers: &HeaderMap,
    role: Role,
    message: Option<String>,
) -> Response {
    let (id, session, created) = match state
        .registry
        .get_or_start(session_id(headers), role)
        .await
    {
        Ok(found) => found,
        Err(e) => return setup_failed(e),
    };

    let mut session = session.lock().await;
    let response = match session.interact(role, message).await {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::error!(session_id = %id, "Interaction cycle failed: {}", e);
            match render_page(&state.pages, &session, Some(&e.to_string())) {
                Ok(page) => (StatusCode::BAD_GATEWAY, page).into_response(),
                Err(e) => render_failed(e),
            }
        }
    };
    with_session_cookie(response, created.then_some(id))
}

async fn end_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        if !state.registry.end(&id).await {
            tracing::debug!(session_id = %id, "End requested for unknown session");
        }
    }

    let mut response = Redirect::to("/").into_response();
    response.headers_mut().append(
        header::SET_COOKIE,
        HeaderValue::from_static("adu_session=; Max-Age=0; HttpOnly; SameSite=Lax; Path=/"),
    );
    response
}

async fn transcript(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return not_found();
    };
    let Some(session) = state.registry.get(&id).await else {
        return not_found();
    };

    let session = session.lock().await;
    Json(TranscriptView {
        session_id: id,
        role: session.role(),
        ready: session.is_ready(),
        vector_store_id: session.vector_store().map(|s| s.id.as_str()),
        turns: session.transcript().turns(),
        status: session.status(),
    })
    .into_response()
}

async fn require_bearer(
    State(expected): State<Arc<String>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let header_ok = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", expected.as_str()));

    // Fallback for browsers that cannot set headers: access_token or token
    let query_ok = req.uri().query().is_some_and(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .any(|(k, v)| (k == "access_token" || k == "token") && v == expected.as_str())
    });

    if !(header_ok || query_ok) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(req).await
}

fn render_page(
    pages: &Environment<'static>,
    session: &ChatSession,
    error: Option<&str>,
) -> Result<Html<String>> {
    let view = PageView {
        role: session.role(),
        roles: Role::ALL,
        turns: session.transcript().turns(),
        status: session.status(),
        error,
    };
    let body = pages.get_template("chat.html")?.render(view)?;
    Ok(Html(body))
}

/// Session id from the `adu_session` cookie, if present and well formed
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

fn with_session_cookie(mut response: Response, id: Option<Uuid>) -> Response {
    if let Some(id) = id {
        let cookie = format!("{SESSION_COOKIE}={id}; HttpOnly; SameSite=Lax; Path=/");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

fn setup_failed(e: AduChatError) -> Response {
    tracing::error!("Failed to start chat session: {}", e);
    (
        StatusCode::BAD_GATEWAY,
        format!("Failed to start chat session: {e}"),
    )
        .into_response()
}

fn render_failed(e: AduChatError) -> Response {
    tracing::error!("Failed to render chat page: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": { "code": "not_found", "message": "no active chat session" }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_read_from_cookie_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}; other=1")).unwrap(),
        );
        assert_eq!(session_id(&headers), Some(id));
    }

    #[test]
    fn test_malformed_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("adu_session=not-a-uuid"),
        );
        assert_eq!(session_id(&headers), None);
        assert_eq!(session_id(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_is_only_set_for_new_sessions() {
        let id = Uuid::new_v4();
        let fresh = with_session_cookie(StatusCode::OK.into_response(), Some(id));
        let cookie = fresh.headers().get(header::SET_COOKIE).unwrap();
        assert!(cookie.to_str().unwrap().starts_with(&format!("{SESSION_COOKIE}={id}")));

        let existing = with_session_cookie(StatusCode::OK.into_response(), None);
        assert!(existing.headers().get(header::SET_COOKIE).is_none());
    }
}
