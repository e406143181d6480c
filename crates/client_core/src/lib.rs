//! Client side of the dispatch system: the driver submission flow, the
//! hospital dashboard with its live reconciliation, and the session gate
//! both of them sit behind.

pub mod auth;
pub mod driver;
pub mod error;
pub mod hospital;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod transport;

pub use auth::AuthClient;
pub use driver::{DriverFlow, DriverView};
pub use error::{AuthError, ClientError};
pub use hospital::HospitalDashboard;
pub use reconcile::{merge_report, MergeOutcome};
pub use session::{gate, home_route, IdentitySource, Route, Session, SessionGate};
pub use store::{ReportStore, Subscription};
pub use transport::{HttpReportStore, ServerEndpoint};

#[cfg(test)]
#[path = "tests/fake_store.rs"]
mod fake_store;
