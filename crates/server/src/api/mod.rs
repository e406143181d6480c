use std::sync::Arc;

use auth_tokens::SessionClaims;
use axum::{
    extract::{ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{
    authenticate, current_identity, decide_report, latest_report, list_reports, require_role,
    sign_in, sign_up, submit_report,
};
use shared::{
    directory,
    domain::{Identity, IncidentReport, ReportId, Role},
    error::{ApiError, ErrorCode},
    protocol::{
        DirectorySnapshot, ReportDraft, ServerEvent, SessionResponse, SignInRequest,
        SignUpRequest, UpdateStatusRequest,
    },
};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

use crate::app_state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/signup", post(http_sign_up))
        .route("/auth/signin", post(http_sign_in))
        .route("/auth/session", get(http_session))
        .route("/directory", get(http_directory))
        .route("/reports", get(http_list_reports).post(http_submit_report))
        .route("/reports/latest", get(http_latest_report))
        .route("/reports/:report_id/status", post(http_update_status))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok("ok")
}

async fn http_sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<Identity>), HttpError> {
    let identity = sign_up(&state.api, &req).await.map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(identity)))
}

async fn http_sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SessionResponse>, HttpError> {
    let session = sign_in(&state.api, &req).await.map_err(http_error)?;
    Ok(Json(session))
}

async fn http_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Identity>, HttpError> {
    let claims = bearer_claims(&state, &headers)?;
    let identity = current_identity(&state.api, claims.user_id)
        .await
        .map_err(http_error)?;
    Ok(Json(identity))
}

async fn http_directory() -> Json<DirectorySnapshot> {
    Json(directory::snapshot())
}

async fn http_submit_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<ReportDraft>,
) -> Result<(StatusCode, Json<IncidentReport>), HttpError> {
    let claims = bearer_claims(&state, &headers)?;
    require_role(&claims, Role::Driver).map_err(http_error)?;

    let change = submit_report(&state.api, claims.user_id, &draft)
        .await
        .map_err(http_error)?;
    let report = change.report.clone();
    state.publish(ServerEvent::ReportChanged { change });
    Ok((StatusCode::CREATED, Json(report)))
}

async fn http_list_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<IncidentReport>>, HttpError> {
    let claims = bearer_claims(&state, &headers)?;
    require_role(&claims, Role::Hospital).map_err(http_error)?;
    let reports = list_reports(&state.api).await.map_err(http_error)?;
    Ok(Json(reports))
}

async fn http_latest_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Option<IncidentReport>>, HttpError> {
    let claims = bearer_claims(&state, &headers)?;
    let report = latest_report(&state.api, claims.user_id)
        .await
        .map_err(http_error)?;
    Ok(Json(report))
}

async fn http_update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<IncidentReport>, HttpError> {
    let claims = bearer_claims(&state, &headers)?;
    require_role(&claims, Role::Hospital).map_err(http_error)?;
    let report_id = report_id.parse::<ReportId>().map_err(|_| {
        http_error(ApiError::new(ErrorCode::Validation, "invalid report id"))
    })?;

    let change = decide_report(&state.api, report_id, req.status)
        .await
        .map_err(http_error)?;
    let report = change.report.clone();
    state.publish(ServerEvent::ReportChanged { change });
    Ok(Json(report))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let claims = authenticate(&state.api, &q.token).map_err(http_error)?;
    require_role(&claims, Role::Hospital).map_err(http_error)?;
    // Subscribe before the upgrade so nothing published during the handshake is lost.
    let events_rx = state.events.subscribe();
    Ok(ws.on_upgrade(move |socket| ws_connection(socket, events_rx, claims)))
}

async fn ws_connection(
    socket: WebSocket,
    mut events_rx: broadcast::Receiver<ServerEvent>,
    claims: SessionClaims,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    debug!(user_id = %claims.user_id, "change feed subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change feed subscriber lagged");
                    ServerEvent::Error(ApiError::new(
                        ErrorCode::Internal,
                        format!("change feed lagged; {skipped} changes were dropped"),
                    ))
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    debug!(user_id = %claims.user_id, "change feed subscriber disconnected");
}

fn bearer_claims(state: &AppState, headers: &HeaderMap) -> Result<SessionClaims, HttpError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            http_error(ApiError::new(
                ErrorCode::Unauthorized,
                "missing bearer token",
            ))
        })?;
    authenticate(&state.api, token).map_err(http_error)
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
