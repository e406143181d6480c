use auth_tokens::{mint_token, verify_token, SessionClaims, SessionTokenConfig};
use shared::{
    domain::{Identity, IncidentReport, ReportId, ReportStatus, Role, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ChangeKind, ReportChange, ReportDraft, SessionResponse, SignInRequest, SignUpRequest},
    validation::{validate_credentials, validate_draft, ValidationError},
};
use storage::{StatusTransition, Storage};
use tracing::{info, warn};

pub const INVALID_CREDENTIALS: &str = "Invalid login credentials";
pub const DUPLICATE_ACCOUNT: &str = "duplicate key: email already registered";

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub sessions: SessionTokenConfig,
}

pub async fn sign_up(ctx: &ApiContext, req: &SignUpRequest) -> Result<Identity, ApiError> {
    validate_credentials(&req.email, &req.password).map_err(validation)?;
    if req.username.trim().is_empty() {
        return Err(validation(ValidationError::MissingUsername));
    }

    let account = ctx
        .storage
        .create_account(&req.email, &req.username, req.role, &req.password)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Conflict, DUPLICATE_ACCOUNT))?;
    info!(user_id = %account.user_id, role = account.role.as_str(), "account created");
    Ok(account.identity())
}

pub async fn sign_in(ctx: &ApiContext, req: &SignInRequest) -> Result<SessionResponse, ApiError> {
    let Some(account) = ctx
        .storage
        .verify_credentials(&req.email, &req.password)
        .await
        .map_err(internal)?
    else {
        warn!(email = %req.email.trim(), "sign-in rejected");
        return Err(ApiError::new(ErrorCode::Unauthorized, INVALID_CREDENTIALS));
    };

    let (token, expires_at) = mint_token(&ctx.sessions, account.user_id, account.role)
        .map_err(|e| ApiError::new(ErrorCode::Internal, e.to_string()))?;
    Ok(SessionResponse {
        token,
        identity: account.identity(),
        expires_at,
    })
}

pub fn authenticate(ctx: &ApiContext, token: &str) -> Result<SessionClaims, ApiError> {
    verify_token(&ctx.sessions, token)
        .map_err(|e| ApiError::new(ErrorCode::Unauthorized, e.to_string()))
}

pub fn require_role(claims: &SessionClaims, role: Role) -> Result<(), ApiError> {
    if claims.role != role {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            format!("{} role required", role.as_str()),
        ));
    }
    Ok(())
}

pub async fn current_identity(ctx: &ApiContext, user_id: UserId) -> Result<Identity, ApiError> {
    ctx.storage
        .load_account(user_id)
        .await
        .map_err(internal)?
        .map(|account| account.identity())
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "account no longer exists"))
}

pub async fn submit_report(
    ctx: &ApiContext,
    submitter: UserId,
    draft: &ReportDraft,
) -> Result<ReportChange, ApiError> {
    let new_report = validate_draft(draft, submitter).map_err(validation)?;
    let report = ctx
        .storage
        .insert_report(&new_report)
        .await
        .map_err(internal)?;
    info!(
        report_id = %report.id,
        submitter_id = %submitter,
        hospital = %report.hospital_name,
        "incident report submitted"
    );
    Ok(ReportChange {
        kind: ChangeKind::Insert,
        report,
    })
}

pub async fn list_reports(ctx: &ApiContext) -> Result<Vec<IncidentReport>, ApiError> {
    ctx.storage.list_reports().await.map_err(internal)
}

pub async fn latest_report(
    ctx: &ApiContext,
    submitter: UserId,
) -> Result<Option<IncidentReport>, ApiError> {
    ctx.storage
        .latest_report_for_submitter(submitter)
        .await
        .map_err(internal)
}

pub async fn decide_report(
    ctx: &ApiContext,
    report_id: ReportId,
    status: ReportStatus,
) -> Result<ReportChange, ApiError> {
    if !status.is_terminal() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "status must be accepted or rejected",
        ));
    }

    match ctx
        .storage
        .transition_report_status(report_id, status)
        .await
        .map_err(internal)?
    {
        StatusTransition::Applied(report) => {
            info!(report_id = %report_id, status = status.as_str(), "report decided");
            Ok(ReportChange {
                kind: ChangeKind::Update,
                report,
            })
        }
        StatusTransition::AlreadyDecided(report) => Err(ApiError::new(
            ErrorCode::Conflict,
            format!("report already {}", report.status.as_str()),
        )),
        StatusTransition::NotFound => {
            Err(ApiError::new(ErrorCode::NotFound, "report not found"))
        }
    }
}

fn validation(err: ValidationError) -> ApiError {
    ApiError::new(ErrorCode::Validation, err.to_string())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
