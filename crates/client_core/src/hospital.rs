//! Hospital side: a live, newest-first list of every report with the
//! accept/reject decision for the ones still pending.

use std::sync::Arc;

use shared::{
    domain::{Decision, IncidentReport, ReportId, ReportStatus},
    protocol::ReportChange,
};
use tracing::{debug, info, warn};

use crate::{
    error::{describe, ClientError},
    reconcile::{merge_report, MergeOutcome},
    store::{ReportStore, Subscription},
};

pub struct HospitalDashboard<S: ReportStore + ?Sized> {
    store: Arc<S>,
    reports: Vec<IncidentReport>,
    subscription: Option<Subscription>,
    error: Option<String>,
}

impl<S: ReportStore + ?Sized> HospitalDashboard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            reports: Vec::new(),
            subscription: None,
            error: None,
        }
    }

    pub fn reports(&self) -> &[IncidentReport] {
        &self.reports
    }

    pub fn report(&self, id: ReportId) -> Option<&IncidentReport> {
        self.reports.iter().find(|report| report.id == id)
    }

    /// Reports that can still be accepted or rejected.
    pub fn actionable(&self) -> impl Iterator<Item = &IncidentReport> {
        self.reports
            .iter()
            .filter(|report| report.status == ReportStatus::Pending)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribes first, then loads the full list, then folds in anything the
    /// feed delivered while the load was in flight.
    pub async fn mount(&mut self) -> Result<(), ClientError> {
        self.error = None;
        if self.subscription.is_none() {
            match self.store.subscribe().await {
                Ok(subscription) => self.subscription = Some(subscription),
                Err(err) => {
                    warn!(error = %describe(&err), "change feed unavailable");
                    self.error = Some("Failed to load submissions".into());
                    return Err(ClientError::Fetch(describe(&err)));
                }
            }
        }

        match self.store.query_all().await {
            Ok(reports) => self.reports = reports,
            Err(err) => {
                warn!(error = %describe(&err), "initial report load failed");
                self.error = Some("Failed to load submissions".into());
                return Err(ClientError::Fetch(describe(&err)));
            }
        }

        let queued = self.drain_pending();
        debug!(reports = self.reports.len(), queued, "dashboard mounted");
        Ok(())
    }

    pub fn apply_change(&mut self, change: ReportChange) -> MergeOutcome {
        let report_id = change.report.id;
        let outcome = merge_report(&mut self.reports, change.report);
        if outcome == MergeOutcome::IgnoredStale {
            debug!(report_id = %report_id, "ignored stale pending copy");
        }
        outcome
    }

    /// Applies every change already delivered by the feed; returns how many.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(change) = self
            .subscription
            .as_mut()
            .and_then(Subscription::try_next_change)
        {
            self.apply_change(change);
            applied += 1;
        }
        applied
    }

    /// Waits for the next pushed change and applies it. `None` once the feed
    /// has ended or the dashboard was torn down.
    pub async fn next_change(&mut self) -> Option<MergeOutcome> {
        let change = self.subscription.as_mut()?.next_change().await?;
        Some(self.apply_change(change))
    }

    pub async fn accept(&mut self, id: ReportId) -> Result<&IncidentReport, ClientError> {
        self.decide(id, Decision::Accept).await
    }

    pub async fn reject(&mut self, id: ReportId) -> Result<&IncidentReport, ClientError> {
        self.decide(id, Decision::Reject).await
    }

    pub async fn decide(
        &mut self,
        id: ReportId,
        decision: Decision,
    ) -> Result<&IncidentReport, ClientError> {
        self.set_status(id, decision.target_status()).await
    }

    /// Only a locally known `Pending` report may move, and only to a terminal
    /// status. The local entry changes after the store confirms.
    pub async fn set_status(
        &mut self,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<&IncidentReport, ClientError> {
        self.error = None;
        let allowed = self
            .report(id)
            .is_some_and(|report| report.status.can_transition_to(status));
        if !allowed {
            return Err(ClientError::InvalidTransition { report_id: id });
        }

        let updated = match self.store.update_status(id, status).await {
            Ok(report) => report,
            Err(err) => {
                warn!(report_id = %id, status = status.as_str(), error = %describe(&err), "status update failed");
                let verb = if status == ReportStatus::Accepted {
                    "accept"
                } else {
                    "reject"
                };
                self.error = Some(format!("Failed to {verb} submission"));
                return Err(ClientError::Update(describe(&err)));
            }
        };
        info!(report_id = %id, status = status.as_str(), "report decided");

        merge_report(&mut self.reports, updated);
        self.report(id)
            .ok_or(ClientError::InvalidTransition { report_id: id })
    }

    /// Stops the change feed; nothing reaches the list afterwards.
    pub fn teardown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("dashboard torn down");
        }
    }
}

impl<S: ReportStore + ?Sized> Drop for HospitalDashboard<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "tests/hospital_tests.rs"]
mod tests;
