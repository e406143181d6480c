use std::{
    pin::Pin,
    task::{Context, Poll},
};

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use shared::{
    domain::{IncidentReport, NewReport, ReportId, ReportStatus, UserId},
    protocol::ReportChange,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// The persistence and change-feed operations the client flows depend on.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert(&self, report: NewReport) -> Result<IncidentReport>;
    async fn update_status(&self, id: ReportId, status: ReportStatus) -> Result<IncidentReport>;
    /// All reports, newest first.
    async fn query_all(&self) -> Result<Vec<IncidentReport>>;
    async fn query_latest_by_submitter(&self, submitter: UserId)
        -> Result<Option<IncidentReport>>;
    async fn subscribe(&self) -> Result<Subscription>;
}

/// A live feed of report changes. Dropping it has the same effect as
/// [`Subscription::unsubscribe`].
pub struct Subscription {
    changes: mpsc::Receiver<ReportChange>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `task` is the producer feeding `rx`; it is aborted on unsubscribe.
    pub fn new(rx: mpsc::Receiver<ReportChange>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            changes: rx,
            task,
        }
    }

    pub async fn next_change(&mut self) -> Option<ReportChange> {
        self.changes.recv().await
    }

    /// Returns an already-delivered change without waiting.
    pub fn try_next_change(&mut self) -> Option<ReportChange> {
        self.changes.try_recv().ok()
    }

    pub fn unsubscribe(&mut self) {
        self.changes.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Stream for Subscription {
    type Item = ReportChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.changes.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
