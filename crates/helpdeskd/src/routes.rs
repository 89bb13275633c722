//! API routes for helpdeskd
//!
//! Admin routes authenticate through the session cookie. Ticket routes are
//! open to end users, except that posting as `admin` needs an admin session.

use crate::error::ApiError;
use crate::presence::{spawn_feed, PresenceFeed, SseItem};
use crate::server::AppState;
use crate::session::{
    clear_cookie, close_session, current_session, hash_for_storage, open_session,
    require_session, session_cookie, validate_admin_credentials,
};
use crate::store::{FeedbackOutcome, MessageOutcome};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use helpdesk_common::ticket::ADMIN_SENDER;
use helpdesk_common::{
    AdminSummary, NewAdmin, NewTicket, TicketCategory, TicketMessage, TicketPriority,
    TicketStatus, TicketView, ADMIN_ROLE, VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

type AppStateArc = Arc<AppState>;

/// Unwrap a JSON body, turning any rejection into a 400 with `message`
fn json_body<T>(payload: Result<Json<T>, JsonRejection>, message: &str) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|_| ApiError::BadRequest(message.to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    items: Vec<T>,
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/api/health", get(health_check))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Session Routes
// ============================================================================

pub fn session_routes() -> Router<AppStateArc> {
    Router::new().route(
        "/api/admin/session",
        get(session_status).post(login).delete(logout),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionResponse {
    fn anonymous() -> Self {
        Self {
            authenticated: false,
            user: None,
            username: None,
            role: None,
            expires_at: None,
        }
    }

    fn admin(name: &str, username: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            authenticated: true,
            user: Some(name.to_string()),
            username: Some(username.to_string()),
            role: Some(ADMIN_ROLE.to_string()),
            expires_at: Some(expires_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

async fn session_status(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let response = match current_session(&state, &headers).await? {
        Some(session) => {
            SessionResponse::admin(&session.name, &session.username, session.expires_at)
        }
        None => SessionResponse::anonymous(),
    };
    Ok(Json(response))
}

async fn login(
    State(state): State<AppStateArc>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    const REQUIRED: &str = "username and password are required";
    let body = json_body(payload, REQUIRED)?;
    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(ApiError::BadRequest(REQUIRED.to_string()));
    };

    let validated = validate_admin_credentials(&state, &username, &password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let opened = open_session(&state, &validated, &password).await?;
    let admin = &opened.admin;
    state.presence.publish_admin(admin);
    info!("  Admin {} logged in", admin.username);

    let cookie = session_cookie(&state.config.session, &opened.token);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse::admin(
            &admin.name,
            &admin.username,
            opened.expires_at,
        )),
    )
        .into_response())
}

async fn logout(State(state): State<AppStateArc>, headers: HeaderMap) -> Response {
    match current_session(&state, &headers).await {
        Ok(Some(session)) => match close_session(&state, &session).await {
            Ok(Some(admin)) => {
                state.presence.publish_admin(&admin);
                info!("  Admin {} logged out", admin.username);
            }
            Ok(None) => {}
            // Logout stays idempotent even when the admin row is gone
            Err(e) => warn!("  Logout cleanup failed: {}", e),
        },
        Ok(None) => {}
        Err(e) => warn!("  Session lookup failed during logout: {}", e),
    }

    (
        [(header::SET_COOKIE, clear_cookie(&state.config.session))],
        Json(json!({ "ok": true })),
    )
        .into_response()
}

// ============================================================================
// Admin Routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/admin/users", get(list_admins).post(create_admin))
        .route("/api/admin/users/stream", get(presence_stream))
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    username: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

async fn list_admins(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<AdminSummary>>, ApiError> {
    require_session(&state, &headers).await?;

    let admins = {
        let store = state.store.lock().await;
        store.list_admins()?
    };

    Ok(Json(ListResponse {
        items: admins.iter().map(|a| a.summary()).collect(),
    }))
}

async fn create_admin(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    payload: Result<Json<CreateAdminRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AdminSummary>), ApiError> {
    let session = require_session(&state, &headers).await?;

    let body = json_body(payload, "username, password, and name are required")?;
    let new_admin = NewAdmin::validate(
        body.username.as_deref(),
        body.password.as_deref(),
        body.name.as_deref(),
    )
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let taken = || ApiError::Conflict("Admin username is already taken.".to_string());

    if state.store.lock().await.find_admin(&new_admin.username)?.is_some() {
        return Err(taken());
    }

    let hashed = hash_for_storage(&state, &new_admin.password).await?;
    let created = {
        let store = state.store.lock().await;
        store.create_admin(&new_admin.username, &hashed, &new_admin.name, Utc::now())?
    };
    let created = created.ok_or_else(taken)?;

    info!("  Admin {} created by {}", created.username, session.username);
    Ok((StatusCode::CREATED, Json(created.summary())))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    after: Option<String>,
}

async fn presence_stream(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<ReceiverStream<SseItem>>, ApiError> {
    require_session(&state, &headers).await?;

    let heartbeat = Duration::from_secs(state.config.presence.heartbeat_secs.max(1));
    let feed = PresenceFeed::from_query(query.after.as_deref());
    let stream = spawn_feed(state.clone(), feed);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("ping")))
}

// ============================================================================
// Ticket Routes
// ============================================================================

pub fn ticket_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/messages", post(post_message))
        .route("/api/tickets/:id/close", post(close_ticket))
        .route("/api/tickets/:id/feedback", post(submit_feedback))
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    sender: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    rating: Option<i64>,
}

async fn list_tickets(
    State(state): State<AppStateArc>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<ListResponse<TicketView>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<TicketStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let tickets = {
        let store = state.store.lock().await;
        store.list_tickets(status)?
    };

    let now = Utc::now();
    Ok(Json(ListResponse {
        items: tickets.into_iter().map(|t| TicketView::new(t, now)).collect(),
    }))
}

async fn create_ticket(
    State(state): State<AppStateArc>,
    payload: Result<Json<CreateTicketRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TicketView>), ApiError> {
    const REQUIRED: &str = "title and description are required";
    let body = json_body(payload, REQUIRED)?;

    let title = body.title.as_deref().map(str::trim).unwrap_or_default();
    let description = body.description.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() || description.is_empty() {
        return Err(ApiError::BadRequest(REQUIRED.to_string()));
    }

    let priority = match body.priority.as_deref() {
        Some(raw) => raw
            .parse::<TicketPriority>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => TicketPriority::default(),
    };
    let category = match body.category.as_deref() {
        Some(raw) => raw
            .parse::<TicketCategory>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => TicketCategory::default(),
    };

    let new_ticket = NewTicket {
        title: title.to_string(),
        description: description.to_string(),
        priority,
        category,
    };

    let now = Utc::now();
    let ticket = {
        let store = state.store.lock().await;
        store.create_ticket(&new_ticket, now)?
    };
    info!("  Ticket {} opened ({})", ticket.code, ticket.priority);

    Ok((StatusCode::CREATED, Json(TicketView::new(ticket, now))))
}

async fn get_ticket(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<TicketView>, ApiError> {
    let (ticket, messages) = {
        let store = state.store.lock().await;
        let ticket = store.find_ticket(&id)?.ok_or_else(ApiError::ticket_not_found)?;
        let messages = store.ticket_messages(&ticket.id)?;
        (ticket, messages)
    };

    Ok(Json(TicketView::new(ticket, Utc::now()).with_messages(messages)))
}

async fn post_message(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<TicketMessage>, ApiError> {
    const REQUIRED: &str = "sender & message required";
    let body = json_body(payload, REQUIRED)?;
    let (Some(sender), Some(message)) = (body.sender, body.message) else {
        return Err(ApiError::BadRequest(REQUIRED.to_string()));
    };
    if sender.is_empty() || message.is_empty() {
        return Err(ApiError::BadRequest(REQUIRED.to_string()));
    }

    if sender == ADMIN_SENDER {
        require_session(&state, &headers).await?;
    }

    let outcome = {
        let store = state.store.lock().await;
        store.add_message(&id, &sender, &message, Utc::now())?
    };

    match outcome {
        MessageOutcome::Saved(saved) => Ok(Json(saved)),
        MessageOutcome::NotFound => Err(ApiError::ticket_not_found()),
        MessageOutcome::Closed => Err(ApiError::Forbidden("Ticket already closed".to_string())),
    }
}

async fn close_ticket(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<TicketView>, ApiError> {
    let now = Utc::now();
    let ticket = {
        let store = state.store.lock().await;
        store.close_ticket(&id, now)?
    };
    let ticket = ticket.ok_or_else(ApiError::ticket_not_found)?;

    info!("  Ticket {} closed", ticket.code);
    Ok(Json(TicketView::new(ticket, now)))
}

async fn submit_feedback(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<TicketView>, ApiError> {
    const REQUIRED: &str = "rating is required";
    let body = json_body(payload, REQUIRED)?;
    let rating = body
        .rating
        .ok_or_else(|| ApiError::BadRequest(REQUIRED.to_string()))?;

    let now = Utc::now();
    let outcome = {
        let store = state.store.lock().await;
        store.submit_feedback(&id, rating, now)?
    };

    match outcome {
        FeedbackOutcome::Saved(ticket) => Ok(Json(TicketView::new(ticket, now))),
        FeedbackOutcome::NotFound => Err(ApiError::ticket_not_found()),
        FeedbackOutcome::InvalidRating => Err(ApiError::BadRequest(
            "rating must be between 1 and 5".to_string(),
        )),
        FeedbackOutcome::NotClosed => Err(ApiError::Conflict(
            "Feedback is only accepted on closed tickets".to_string(),
        )),
        FeedbackOutcome::AlreadySubmitted => Err(ApiError::Conflict(
            "Feedback already submitted".to_string(),
        )),
    }
}
