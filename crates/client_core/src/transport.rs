//! HTTP and websocket plumbing against the dispatch server.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use shared::{
    domain::{IncidentReport, NewReport, ReportId, ReportStatus, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{ReportDraft, ServerEvent, UpdateStatusRequest},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::store::{ReportStore, Subscription};

const CHANGE_BUFFER: usize = 256;

/// Base url of a dispatch server plus the helpers to address its endpoints.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    base: Url,
}

impl ServerEndpoint {
    pub fn parse(server_url: &str) -> Result<Self> {
        let mut base = Url::parse(server_url)
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!("server_url must start with http:// or https://"));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn http(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    pub fn websocket(&self, token: &str) -> Result<Url> {
        let mut url = self.http("ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot derive websocket url from {}", self.base))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// Turns a non-2xx response into an [`ApiException`] carrying the server's
/// `ApiError` body when there is one.
pub(crate) async fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let code = match status.as_u16() {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            400 | 422 => ErrorCode::Validation,
            409 => ErrorCode::Conflict,
            _ => ErrorCode::Internal,
        };
        ApiError::new(code, format!("{status}: {body}"))
    });
    Err(ApiException::from(api_error).into())
}

/// [`ReportStore`] backed by the dispatch server's REST routes and change feed.
#[derive(Clone)]
pub struct HttpReportStore {
    http: Client,
    endpoint: ServerEndpoint,
    token: String,
}

impl HttpReportStore {
    pub fn new(endpoint: ServerEndpoint, token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint, token)
    }

    pub fn with_client(http: Client, endpoint: ServerEndpoint, token: impl Into<String>) -> Self {
        Self {
            http,
            endpoint,
            token: token.into(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }
}

#[async_trait]
impl ReportStore for HttpReportStore {
    /// The server takes the submitter from the bearer token, not from
    /// `report.submitter_id`.
    async fn insert(&self, report: NewReport) -> Result<IncidentReport> {
        let draft = ReportDraft {
            location: report.location,
            hospital: report.hospital_id.to_string(),
            incident_type: report.incident_type,
            consciousness_state: report.consciousness_state,
            persons_injured: report.persons_injured,
        };
        let response = self
            .authorized(self.http.post(self.endpoint.http("reports")?))
            .json(&draft)
            .send()
            .await
            .context("failed to reach dispatch server")?;
        Ok(expect_success(response).await?.json().await?)
    }

    async fn update_status(&self, id: ReportId, status: ReportStatus) -> Result<IncidentReport> {
        let url = self.endpoint.http(&format!("reports/{id}/status"))?;
        let response = self
            .authorized(self.http.post(url))
            .json(&UpdateStatusRequest { status })
            .send()
            .await
            .context("failed to reach dispatch server")?;
        Ok(expect_success(response).await?.json().await?)
    }

    async fn query_all(&self) -> Result<Vec<IncidentReport>> {
        let response = self
            .authorized(self.http.get(self.endpoint.http("reports")?))
            .send()
            .await
            .context("failed to reach dispatch server")?;
        Ok(expect_success(response).await?.json().await?)
    }

    /// Served for the caller's own account; `submitter` must be the signed-in user.
    async fn query_latest_by_submitter(
        &self,
        submitter: UserId,
    ) -> Result<Option<IncidentReport>> {
        let response = self
            .authorized(self.http.get(self.endpoint.http("reports/latest")?))
            .send()
            .await
            .context("failed to reach dispatch server")?;
        let latest: Option<IncidentReport> = expect_success(response).await?.json().await?;
        if let Some(report) = &latest {
            if report.submitter_id != submitter {
                return Err(anyhow!(
                    "latest report belongs to {}, not {submitter}",
                    report.submitter_id
                ));
            }
        }
        Ok(latest)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let ws_url = self.endpoint.websocket(&self.token)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .context("failed to connect change feed websocket")?;
        let (_, mut ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);

        let task = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::ReportChanged { change }) => {
                            if tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Ok(ServerEvent::Error(err)) => {
                            warn!(code = ?err.code, message = %err.message, "change feed error");
                        }
                        Err(err) => warn!(%err, "invalid change feed event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "change feed receive failed");
                        break;
                    }
                }
            }
            debug!("change feed closed");
        });

        Ok(Subscription::new(rx, Some(task)))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
