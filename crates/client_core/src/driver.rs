//! Driver side: fill in an incident report, send it, watch its status.

use std::sync::Arc;

use shared::{
    directory,
    domain::{Identity, IncidentReport, ReportStatus},
    protocol::ReportDraft,
    validation::validate_draft,
};
use tracing::{error, info, warn};

use crate::{
    error::{describe, ClientError},
    store::ReportStore,
};

pub const SUBMITTED_MESSAGE: &str = "Request sent successfully! Status: Pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverView {
    Submit,
    Status,
}

pub struct DriverFlow<S: ReportStore + ?Sized> {
    store: Arc<S>,
    identity: Identity,
    form: ReportDraft,
    view: DriverView,
    latest: Option<IncidentReport>,
    error: Option<String>,
    success: Option<String>,
}

impl<S: ReportStore + ?Sized> DriverFlow<S> {
    pub fn new(store: Arc<S>, identity: Identity) -> Self {
        Self {
            store,
            identity,
            form: ReportDraft::default(),
            view: DriverView::Submit,
            latest: None,
            error: None,
            success: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn form(&self) -> &ReportDraft {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ReportDraft {
        &mut self.form
    }

    /// A new location invalidates whichever hospital was picked for the old one.
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.form.location = location.into();
        self.form.hospital.clear();
    }

    pub fn view(&self) -> DriverView {
        self.view
    }

    pub fn show_submit(&mut self) {
        self.view = DriverView::Submit;
    }

    pub fn latest(&self) -> Option<&IncidentReport> {
        self.latest.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn success(&self) -> Option<&str> {
        self.success.as_deref()
    }

    /// Validates the form, stores it as a pending report and switches to the
    /// status view. The form is only cleared once the store accepted it.
    pub async fn submit(&mut self) -> Result<IncidentReport, ClientError> {
        self.error = None;
        self.success = None;

        let new_report = match validate_draft(&self.form, self.identity.user_id) {
            Ok(report) => report,
            Err(err) => {
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };

        let stored = match self.store.insert(new_report).await {
            Ok(report) => report,
            Err(err) => {
                error!(user_id = %self.identity.user_id, error = %describe(&err), "report submission failed");
                let err = ClientError::Submission(describe(&err));
                self.error = Some("Failed to submit form. Please try again.".into());
                return Err(err);
            }
        };
        info!(report_id = %stored.id, hospital = %stored.hospital_name, "report submitted");

        self.form = ReportDraft::default();
        self.success = Some(SUBMITTED_MESSAGE.into());
        self.view = DriverView::Status;
        self.latest = Some(stored.clone());
        // On a failed refresh the stored copy stays and only the success banner shows.
        if self.refresh_status().await.is_err() {
            self.error = None;
        }
        Ok(stored)
    }

    /// Switches to the status view and reloads the latest report.
    pub async fn show_status(&mut self) -> Result<Option<&IncidentReport>, ClientError> {
        self.view = DriverView::Status;
        self.refresh_status().await
    }

    pub async fn refresh_status(&mut self) -> Result<Option<&IncidentReport>, ClientError> {
        match self
            .store
            .query_latest_by_submitter(self.identity.user_id)
            .await
        {
            Ok(latest) => {
                self.latest = latest;
                Ok(self.latest.as_ref())
            }
            Err(err) => {
                warn!(user_id = %self.identity.user_id, error = %describe(&err), "status refresh failed");
                self.error = Some("Failed to fetch request status".into());
                Err(ClientError::Fetch(describe(&err)))
            }
        }
    }

    /// Maps link to the destination hospital, offered once the report is accepted.
    pub fn navigation_link(&self) -> Option<String> {
        let report = self.latest.as_ref()?;
        if report.status != ReportStatus::Accepted {
            return None;
        }
        Some(directory::maps_link(&report.hospital_name, &report.location))
    }
}

#[cfg(test)]
#[path = "tests/driver_tests.rs"]
mod tests;
