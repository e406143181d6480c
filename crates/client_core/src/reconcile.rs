use shared::domain::{IncidentReport, ReportStatus};

/// What [`merge_report`] did with an incoming report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Replaced(usize),
    Prepended,
    /// A `Pending` copy arrived for a report already decided locally.
    IgnoredStale,
}

/// Folds one report into a newest-first list.
///
/// An entry with the same id is replaced where it stands; the list is never
/// re-sorted. An unknown id goes to the front. Delivering the same report
/// twice leaves the list as it was after the first delivery.
pub fn merge_report(reports: &mut Vec<IncidentReport>, incoming: IncidentReport) -> MergeOutcome {
    match reports.iter().position(|existing| existing.id == incoming.id) {
        Some(index) => {
            let current = &reports[index];
            if current.status.is_terminal() && incoming.status == ReportStatus::Pending {
                return MergeOutcome::IgnoredStale;
            }
            reports[index] = incoming;
            MergeOutcome::Replaced(index)
        }
        None => {
            reports.insert(0, incoming);
            MergeOutcome::Prepended
        }
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
