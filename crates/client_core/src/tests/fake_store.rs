use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, SubsecRound, Utc};
use shared::{
    directory,
    domain::{IncidentReport, NewReport, ReportId, ReportStatus, UserId},
    protocol::{ChangeKind, ReportChange},
};
use tokio::sync::mpsc;

use crate::store::{ReportStore, Subscription};

/// In-memory store that records every call and can be told to fail.
#[derive(Default)]
pub(crate) struct FakeStore {
    reports: Mutex<Vec<IncidentReport>>,
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    feed: Mutex<Option<mpsc::Sender<ReportChange>>>,
    delivered_during_fetch: Mutex<Vec<ReportChange>>,
}

impl FakeStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail(&self, operation: &'static str) {
        self.failing.lock().expect("lock").insert(operation);
    }

    pub(crate) fn recover(&self, operation: &'static str) {
        self.failing.lock().expect("lock").remove(operation);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("lock").clone()
    }

    pub(crate) fn stored(&self) -> Vec<IncidentReport> {
        self.reports.lock().expect("lock").clone()
    }

    /// Seeds a report `minutes_ago` old without emitting a change.
    pub(crate) fn seed(&self, submitter: UserId, minutes_ago: i64) -> IncidentReport {
        let report = sample_report(submitter, minutes_ago);
        let mut reports = self.reports.lock().expect("lock");
        reports.push(report.clone());
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        report
    }

    /// Pushes a change to the subscriber as if another client caused it.
    /// Dropped silently once the subscriber has gone.
    pub(crate) fn push(&self, change: ReportChange) {
        if let Some(feed) = self.feed.lock().expect("lock").as_ref() {
            let _ = feed.try_send(change);
        }
    }

    /// Changes to deliver while `query_all` is in flight.
    pub(crate) fn deliver_during_fetch(&self, changes: Vec<ReportChange>) {
        *self.delivered_during_fetch.lock().expect("lock") = changes;
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        self.calls.lock().expect("lock").push(operation);
        if self.failing.lock().expect("lock").contains(operation) {
            return Err(anyhow!("{operation} unavailable"));
        }
        Ok(())
    }
}

pub(crate) fn sample_report(submitter: UserId, minutes_ago: i64) -> IncidentReport {
    let hospital = directory::find_hospital("Banashankari", "Sagar Hospitals").expect("hospital");
    IncidentReport {
        id: ReportId::generate(),
        created_at: (Utc::now() - Duration::minutes(minutes_ago)).trunc_subsecs(6),
        submitter_id: submitter,
        location: "Banashankari".into(),
        incident_type: "accident".into(),
        persons_injured: None,
        consciousness_state: "conscious".into(),
        hospital_id: hospital.id,
        hospital_name: hospital.name.into(),
        status: ReportStatus::Pending,
    }
}

#[async_trait]
impl ReportStore for FakeStore {
    async fn insert(&self, report: NewReport) -> Result<IncidentReport> {
        self.record("insert")?;
        let stored = IncidentReport {
            id: ReportId::generate(),
            created_at: Utc::now().trunc_subsecs(6),
            submitter_id: report.submitter_id,
            location: report.location,
            incident_type: report.incident_type,
            persons_injured: report.persons_injured,
            consciousness_state: report.consciousness_state,
            hospital_id: report.hospital_id,
            hospital_name: report.hospital_name,
            status: ReportStatus::Pending,
        };
        self.reports.lock().expect("lock").insert(0, stored.clone());
        self.push(ReportChange {
            kind: ChangeKind::Insert,
            report: stored.clone(),
        });
        Ok(stored)
    }

    async fn update_status(&self, id: ReportId, status: ReportStatus) -> Result<IncidentReport> {
        self.record("update_status")?;
        let updated = {
            let mut reports = self.reports.lock().expect("lock");
            let report = reports
                .iter_mut()
                .find(|report| report.id == id)
                .ok_or_else(|| anyhow!("report not found"))?;
            if !report.status.can_transition_to(status) {
                return Err(anyhow!("report already {}", report.status.as_str()));
            }
            report.status = status;
            report.clone()
        };
        self.push(ReportChange {
            kind: ChangeKind::Update,
            report: updated.clone(),
        });
        Ok(updated)
    }

    async fn query_all(&self) -> Result<Vec<IncidentReport>> {
        self.record("query_all")?;
        let snapshot = self.stored();
        let during = std::mem::take(&mut *self.delivered_during_fetch.lock().expect("lock"));
        for change in during {
            self.push(change);
        }
        Ok(snapshot)
    }

    async fn query_latest_by_submitter(
        &self,
        submitter: UserId,
    ) -> Result<Option<IncidentReport>> {
        self.record("query_latest_by_submitter")?;
        Ok(self
            .stored()
            .into_iter()
            .filter(|report| report.submitter_id == submitter)
            .max_by_key(|report| report.created_at))
    }

    async fn subscribe(&self) -> Result<Subscription> {
        self.record("subscribe")?;
        let (tx, rx) = mpsc::channel(64);
        *self.feed.lock().expect("lock") = Some(tx);
        Ok(Subscription::new(rx, None))
    }
}
