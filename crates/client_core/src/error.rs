use shared::{domain::ReportId, validation::ValidationError};
use thiserror::Error;

/// Sign-in and sign-up failures, told apart by the text the server sends back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Wrong credentials. Please check your email and password.")]
    WrongCredentials,
    #[error("This email is already registered. Please sign in instead.")]
    AlreadyRegistered,
    #[error("{0}")]
    Other(String),
}

impl AuthError {
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("invalid login credentials") {
            Self::WrongCredentials
        } else if lowered.contains("duplicate") {
            Self::AlreadyRegistered
        } else {
            Self::Other(message.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Failed to submit form. Please try again. ({0})")]
    Submission(String),
    #[error("Failed to update report status: {0}")]
    Update(String),
    #[error("Failed to load reports: {0}")]
    Fetch(String),
    #[error("report {report_id} is not awaiting a decision")]
    InvalidTransition { report_id: ReportId },
    #[error("User not authenticated")]
    NotAuthenticated,
}

/// Flattens an error chain into one line for a banner or a `ClientError`.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
