use super::*;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use shared::{
    directory,
    domain::{Identity, Role},
    protocol::{ChangeKind, ReportChange, SessionResponse, SignInRequest, SignUpRequest},
};
use tokio::net::TcpListener;

use crate::{
    auth::AuthClient,
    error::{AuthError, ClientError},
    session::{IdentitySource, SessionGate},
};

const TOKEN: &str = "stub-token";

#[derive(Clone)]
struct StubState {
    report: IncidentReport,
    identity: Identity,
}

fn canned_report(submitter: UserId) -> IncidentReport {
    let hospital = directory::find_hospital("Banashankari", "Fortis Hospital").expect("hospital");
    IncidentReport {
        id: ReportId::generate(),
        created_at: Utc::now(),
        submitter_id: submitter,
        location: "Banashankari".into(),
        incident_type: "medical".into(),
        persons_injured: Some("1".into()),
        consciousness_state: "unconscious".into(),
        hospital_id: hospital.id,
        hospital_name: hospital.name.into(),
        status: ReportStatus::Pending,
    }
}

fn api_error(status: StatusCode, code: ErrorCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(code, message)))
}

fn authorized(headers: &HeaderMap) -> Result<(), (StatusCode, Json<ApiError>)> {
    let expected = format!("Bearer {TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(api_error(
            StatusCode::UNAUTHORIZED,
            ErrorCode::Unauthorized,
            "missing bearer token",
        )),
    }
}

async fn spawn_stub() -> (SocketAddr, Arc<StubState>) {
    let identity = Identity {
        user_id: UserId::generate(),
        email: "er@example.com".into(),
        username: "er".into(),
        role: Role::Hospital,
    };
    let state = Arc::new(StubState {
        report: canned_report(identity.user_id),
        identity,
    });

    let app = Router::new()
        .route(
            "/auth/signin",
            post(
                |State(state): State<Arc<StubState>>, Json(req): Json<SignInRequest>| async move {
                    if req.password != "right-pass" {
                        return Err(api_error(
                            StatusCode::UNAUTHORIZED,
                            ErrorCode::Unauthorized,
                            "Invalid login credentials",
                        ));
                    }
                    Ok(Json(SessionResponse {
                        token: TOKEN.into(),
                        identity: state.identity.clone(),
                        expires_at: Utc::now(),
                    }))
                },
            ),
        )
        .route(
            "/auth/signup",
            post(
                |State(state): State<Arc<StubState>>, Json(req): Json<SignUpRequest>| async move {
                    if req.email == "taken@example.com" {
                        return Err(api_error(
                            StatusCode::CONFLICT,
                            ErrorCode::Conflict,
                            "duplicate key: email already registered",
                        ));
                    }
                    Ok((StatusCode::CREATED, Json(state.identity.clone())))
                },
            ),
        )
        .route(
            "/reports",
            get(
                |State(state): State<Arc<StubState>>, headers: HeaderMap| async move {
                    authorized(&headers)?;
                    Ok::<_, (StatusCode, Json<ApiError>)>(Json(vec![state.report.clone()]))
                },
            ),
        )
        .route(
            "/reports/latest",
            get(
                |State(state): State<Arc<StubState>>, headers: HeaderMap| async move {
                    authorized(&headers)?;
                    Ok::<_, (StatusCode, Json<ApiError>)>(Json(Some(state.report.clone())))
                },
            ),
        )
        .route(
            "/reports/:report_id/status",
            post(|Path(_report_id): Path<String>| async move {
                api_error(
                    StatusCode::CONFLICT,
                    ErrorCode::Conflict,
                    "report already accepted",
                )
            }),
        )
        .route(
            "/ws",
            get(
                |ws: WebSocketUpgrade,
                 State(state): State<Arc<StubState>>,
                 Query(query): Query<std::collections::HashMap<String, String>>| async move {
                    if query.get("token").map(String::as_str) != Some(TOKEN) {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    ws.on_upgrade(move |mut socket| async move {
                        use axum::extract::ws::Message as AxumMessage;
                        let event = ServerEvent::ReportChanged {
                            change: ReportChange {
                                kind: ChangeKind::Update,
                                report: state.report.with_status(ReportStatus::Accepted),
                            },
                        };
                        let text = serde_json::to_string(&event).expect("event json");
                        let lagged = serde_json::to_string(&ServerEvent::Error(ApiError::new(
                            ErrorCode::Internal,
                            "change feed lagged; 3 changes were dropped",
                        )))
                        .expect("error json");
                        let _ = socket.send(AxumMessage::Text("not json".into())).await;
                        let _ = socket.send(AxumMessage::Text(lagged)).await;
                        let _ = socket.send(AxumMessage::Text(text)).await;
                        while let Some(Ok(_)) = socket.recv().await {}
                    })
                },
            ),
        )
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, state)
}

fn endpoint(addr: SocketAddr) -> ServerEndpoint {
    ServerEndpoint::parse(&format!("http://{addr}")).expect("endpoint")
}

#[test]
fn endpoint_builds_http_and_websocket_urls() {
    let endpoint = ServerEndpoint::parse("https://dispatch.example.com/api").expect("endpoint");
    assert_eq!(
        endpoint.http("/reports/latest").expect("url").as_str(),
        "https://dispatch.example.com/api/reports/latest"
    );
    assert_eq!(
        endpoint.websocket("a b").expect("ws").as_str(),
        "wss://dispatch.example.com/api/ws?token=a+b"
    );

    let plain = ServerEndpoint::parse("http://127.0.0.1:8443").expect("endpoint");
    assert_eq!(
        plain.websocket("t").expect("ws").as_str(),
        "ws://127.0.0.1:8443/ws?token=t"
    );
}

#[test]
fn endpoint_rejects_non_http_scheme() {
    assert!(ServerEndpoint::parse("ftp://example.com").is_err());
    assert!(ServerEndpoint::parse("not a url").is_err());
}

#[tokio::test]
async fn store_queries_with_bearer_token() {
    let (addr, state) = spawn_stub().await;
    let store = HttpReportStore::new(endpoint(addr), TOKEN);

    let all = store.query_all().await.expect("all");
    assert_eq!(all, vec![state.report.clone()]);

    let latest = store
        .query_latest_by_submitter(state.identity.user_id)
        .await
        .expect("latest");
    assert_eq!(latest, Some(state.report.clone()));
}

#[tokio::test]
async fn store_surfaces_server_error_body() {
    let (addr, state) = spawn_stub().await;
    let unauthorized = HttpReportStore::new(endpoint(addr), "wrong");
    let err = unauthorized.query_all().await.expect_err("unauthorized");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::Unauthorized);

    let store = HttpReportStore::new(endpoint(addr), TOKEN);
    let err = store
        .update_status(state.report.id, ReportStatus::Rejected)
        .await
        .expect_err("conflict");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::Conflict);
    assert_eq!(api.message, "report already accepted");
}

#[tokio::test]
async fn subscription_forwards_report_changes() {
    let (addr, state) = spawn_stub().await;
    let store = HttpReportStore::new(endpoint(addr), TOKEN);

    let mut subscription = store.subscribe().await.expect("subscribe");
    let change = tokio::time::timeout(std::time::Duration::from_secs(5), subscription.next_change())
        .await
        .expect("timely change")
        .expect("change");

    assert_eq!(change.kind, ChangeKind::Update);
    assert_eq!(change.report.id, state.report.id);
    assert_eq!(change.report.status, ReportStatus::Accepted);

    subscription.unsubscribe();
    assert_eq!(subscription.next_change().await, None);
}

#[tokio::test]
async fn subscribe_with_bad_token_fails() {
    let (addr, _) = spawn_stub().await;
    let store = HttpReportStore::new(endpoint(addr), "wrong");
    assert!(store.subscribe().await.is_err());
}

#[tokio::test]
async fn sign_in_publishes_identity_to_gate() {
    let (addr, state) = spawn_stub().await;
    let gate = SessionGate::new();
    let auth = AuthClient::new(endpoint(addr), gate.clone());

    let session = auth
        .sign_in("er@example.com", "right-pass")
        .await
        .expect("signed in");

    assert_eq!(session.token, TOKEN);
    assert_eq!(gate.current_identity(), Some(state.identity.clone()));

    auth.sign_out();
    assert!(gate.current_identity().is_none());
}

#[tokio::test]
async fn wrong_password_maps_to_wrong_credentials() {
    let (addr, _) = spawn_stub().await;
    let gate = SessionGate::new();
    let auth = AuthClient::new(endpoint(addr), gate.clone());

    let err = auth
        .sign_in("er@example.com", "wrong-pass")
        .await
        .expect_err("rejected");

    assert_eq!(err, ClientError::Auth(AuthError::WrongCredentials));
    assert!(gate.current_identity().is_none());
}

#[tokio::test]
async fn duplicate_sign_up_maps_to_already_registered() {
    let (addr, _) = spawn_stub().await;
    let auth = AuthClient::new(endpoint(addr), SessionGate::new());

    let err = auth
        .sign_up("taken@example.com", "secret-pw", "taken", Role::Driver)
        .await
        .expect_err("duplicate");

    assert_eq!(err, ClientError::Auth(AuthError::AlreadyRegistered));
}

#[tokio::test]
async fn short_password_fails_before_any_request() {
    let auth = AuthClient::new(
        ServerEndpoint::parse("http://127.0.0.1:9").expect("endpoint"),
        SessionGate::new(),
    );
    let err = auth
        .sign_up("new@example.com", "12345", "new", Role::Driver)
        .await
        .expect_err("too short");
    assert_eq!(
        err,
        ClientError::Validation(shared::validation::ValidationError::PasswordTooShort)
    );
}
