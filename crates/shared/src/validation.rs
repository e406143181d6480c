use thiserror::Error;

use crate::{
    directory,
    domain::{NewReport, UserId},
    protocol::ReportDraft,
};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("location is required")]
    MissingLocation,
    #[error("please select a hospital")]
    MissingHospital,
    #[error("please select a type of incident")]
    MissingIncidentType,
    #[error("please select a state of consciousness")]
    MissingConsciousness,
    #[error("unknown location '{0}'")]
    UnknownLocation(String),
    #[error("hospital '{hospital}' does not serve {location}")]
    HospitalNotInLocation { location: String, hospital: String },
    #[error("number of persons injured must be a whole number")]
    InvalidPersonsInjured,
    #[error("email is required")]
    MissingEmail,
    #[error("username is required")]
    MissingUsername,
    #[error("password must be at least 6 characters")]
    PasswordTooShort,
}

/// Checks a draft and resolves its hospital against the directory. Performs
/// no I/O; a failure here means no store call should be attempted.
pub fn validate_draft(draft: &ReportDraft, submitter: UserId) -> Result<NewReport, ValidationError> {
    let location = draft.location.trim();
    if location.is_empty() {
        return Err(ValidationError::MissingLocation);
    }
    let selection = draft.hospital.trim();
    if selection.is_empty() {
        return Err(ValidationError::MissingHospital);
    }
    if directory::hospitals_for(location).is_none() {
        return Err(ValidationError::UnknownLocation(location.to_string()));
    }
    let hospital = directory::find_hospital(location, selection).ok_or_else(|| {
        ValidationError::HospitalNotInLocation {
            location: location.to_string(),
            hospital: selection.to_string(),
        }
    })?;

    let incident_type = draft.incident_type.trim();
    if incident_type.is_empty() {
        return Err(ValidationError::MissingIncidentType);
    }
    let consciousness_state = draft.consciousness_state.trim();
    if consciousness_state.is_empty() {
        return Err(ValidationError::MissingConsciousness);
    }

    let persons_injured = draft
        .persons_injured
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(value) = persons_injured {
        value
            .parse::<u32>()
            .map_err(|_| ValidationError::InvalidPersonsInjured)?;
    }

    Ok(NewReport {
        submitter_id: submitter,
        location: location.to_string(),
        incident_type: incident_type.to_string(),
        persons_injured: persons_injured.map(str::to_string),
        consciousness_state: consciousness_state.to_string(),
        hospital_id: hospital.id,
        hospital_name: hospital.name.to_string(),
    })
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}
