use super::*;

use shared::{
    domain::{Role, UserId},
    validation::ValidationError,
};

use crate::fake_store::FakeStore;

fn driver() -> Identity {
    Identity {
        user_id: UserId::generate(),
        email: "driver@example.com".into(),
        username: "driver".into(),
        role: Role::Driver,
    }
}

fn fill(flow: &mut DriverFlow<FakeStore>) {
    flow.set_location("Banashankari");
    let form = flow.form_mut();
    form.hospital = "Sagar Hospitals".into();
    form.incident_type = "fire".into();
    form.consciousness_state = "conscious".into();
    form.persons_injured = Some("3".into());
}

#[tokio::test]
async fn empty_location_never_reaches_the_store() {
    let store = FakeStore::new();
    let mut flow = DriverFlow::new(store.clone(), driver());
    fill(&mut flow);
    flow.form_mut().location.clear();

    let err = flow.submit().await.expect_err("invalid");

    assert_eq!(err, ClientError::Validation(ValidationError::MissingLocation));
    assert!(store.calls().is_empty());
    assert_eq!(flow.error(), Some("location is required"));
}

#[tokio::test]
async fn missing_hospital_never_reaches_the_store() {
    let store = FakeStore::new();
    let mut flow = DriverFlow::new(store.clone(), driver());
    fill(&mut flow);
    flow.form_mut().hospital.clear();

    let err = flow.submit().await.expect_err("invalid");

    assert_eq!(err, ClientError::Validation(ValidationError::MissingHospital));
    assert!(store.calls().is_empty());
    assert_eq!(flow.view(), DriverView::Submit);
}

#[tokio::test]
async fn hospital_outside_location_is_rejected() {
    let store = FakeStore::new();
    let mut flow = DriverFlow::new(store.clone(), driver());
    fill(&mut flow);
    flow.form_mut().hospital = "Elsewhere General".into();

    let err = flow.submit().await.expect_err("invalid");

    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::HospitalNotInLocation { .. })
    ));
    assert!(store.calls().is_empty());
}

#[test]
fn changing_location_clears_hospital() {
    let mut flow = DriverFlow::new(FakeStore::new(), driver());
    fill(&mut flow);
    assert_eq!(flow.form().hospital, "Sagar Hospitals");

    flow.set_location("Jayanagar");

    assert_eq!(flow.form().location, "Jayanagar");
    assert!(flow.form().hospital.is_empty());
    assert_eq!(flow.form().incident_type, "fire");
}

#[tokio::test]
async fn successful_submission_stores_pending_report_for_identity() {
    let store = FakeStore::new();
    let identity = driver();
    let mut flow = DriverFlow::new(store.clone(), identity.clone());
    fill(&mut flow);

    let report = flow.submit().await.expect("submitted");

    assert_eq!(report.status, ReportStatus::Pending);
    assert_eq!(report.submitter_id, identity.user_id);
    assert_eq!(report.hospital_name, "Sagar Hospitals");
    assert_eq!(report.persons_injured.as_deref(), Some("3"));
    assert_eq!(store.stored(), vec![report.clone()]);

    assert_eq!(flow.success(), Some(SUBMITTED_MESSAGE));
    assert_eq!(flow.error(), None);
    assert_eq!(flow.view(), DriverView::Status);
    assert_eq!(flow.form(), &ReportDraft::default());
    assert_eq!(flow.latest(), Some(&report));
    assert_eq!(store.calls(), vec!["insert", "query_latest_by_submitter"]);
}

#[tokio::test]
async fn hospital_can_be_selected_by_id() {
    let store = FakeStore::new();
    let mut flow = DriverFlow::new(store.clone(), driver());
    fill(&mut flow);
    flow.form_mut().hospital = "550e8400-e29b-41d4-a716-446655440001".into();

    let report = flow.submit().await.expect("submitted");

    assert_eq!(report.hospital_name, "Fortis Hospital");
}

#[tokio::test]
async fn store_failure_keeps_the_form() {
    let store = FakeStore::new();
    store.fail("insert");
    let mut flow = DriverFlow::new(store.clone(), driver());
    fill(&mut flow);
    let before = flow.form().clone();

    let err = flow.submit().await.expect_err("store down");

    assert!(matches!(err, ClientError::Submission(_)));
    assert_eq!(flow.form(), &before);
    assert_eq!(flow.view(), DriverView::Submit);
    assert_eq!(flow.error(), Some("Failed to submit form. Please try again."));
    assert!(store.stored().is_empty());

    store.recover("insert");
    flow.submit().await.expect("manual retry succeeds");
    assert_eq!(store.stored().len(), 1);
}

#[tokio::test]
async fn status_is_empty_before_any_submission() {
    let store = FakeStore::new();
    let mut flow = DriverFlow::new(store.clone(), driver());

    let latest = flow.show_status().await.expect("query");

    assert!(latest.is_none());
    assert_eq!(flow.view(), DriverView::Status);
    assert_eq!(flow.navigation_link(), None);
}

#[tokio::test]
async fn status_shows_only_own_latest_report() {
    let store = FakeStore::new();
    let identity = driver();
    store.seed(identity.user_id, 30);
    let newest = store.seed(identity.user_id, 5);
    store.seed(UserId::generate(), 1);
    let mut flow = DriverFlow::new(store.clone(), identity);

    let latest = flow.refresh_status().await.expect("query").cloned();

    assert_eq!(latest, Some(newest));
}

#[tokio::test]
async fn fetch_failure_keeps_previous_status() {
    let store = FakeStore::new();
    let identity = driver();
    let seeded = store.seed(identity.user_id, 1);
    let mut flow = DriverFlow::new(store.clone(), identity);
    flow.refresh_status().await.expect("query");

    store.fail("query_latest_by_submitter");
    let err = flow.refresh_status().await.expect_err("store down");

    assert!(matches!(err, ClientError::Fetch(_)));
    assert_eq!(flow.latest(), Some(&seeded));
    assert_eq!(flow.error(), Some("Failed to fetch request status"));
}

#[tokio::test]
async fn navigation_link_appears_once_accepted() {
    let store = FakeStore::new();
    let identity = driver();
    let mut flow = DriverFlow::new(store.clone(), identity);
    fill(&mut flow);
    let report = flow.submit().await.expect("submitted");
    assert_eq!(flow.navigation_link(), None);

    store
        .update_status(report.id, ReportStatus::Accepted)
        .await
        .expect("accepted");
    flow.refresh_status().await.expect("query");

    assert_eq!(
        flow.navigation_link().as_deref(),
        Some("https://www.google.com/maps/search/?api=1&query=Sagar+Hospitals%2C+Banashankari")
    );
}

#[tokio::test]
async fn failed_refresh_after_submit_keeps_single_success_banner() {
    let store = FakeStore::new();
    let mut flow = DriverFlow::new(store.clone(), driver());
    fill(&mut flow);
    store.fail("query_latest_by_submitter");

    let stored = flow.submit().await.expect("stored despite refresh failure");

    assert_eq!(flow.success(), Some(SUBMITTED_MESSAGE));
    assert_eq!(flow.error(), None);
    assert_eq!(flow.view(), DriverView::Status);
    assert_eq!(flow.latest(), Some(&stored));
    assert_eq!(store.calls(), vec!["insert", "query_latest_by_submitter"]);
}
