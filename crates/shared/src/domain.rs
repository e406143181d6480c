use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ReportId);
id_newtype!(HospitalId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Hospital,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Hospital => "hospital",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver" => Ok(Role::Driver),
            "hospital" => Ok(Role::Hospital),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Lifecycle of a report. `Pending` is the only state with outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Accepted => "accepted",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ReportStatus::Pending)
    }

    pub fn can_transition_to(self, target: ReportStatus) -> bool {
        self == ReportStatus::Pending && target.is_terminal()
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::Accepted => "Accepted",
            ReportStatus::Rejected => "Rejected",
        })
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "accepted" => Ok(ReportStatus::Accepted),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(format!("unknown report status '{other}'")),
        }
    }
}

/// A hospital's verdict on a pending report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn target_status(self) -> ReportStatus {
        match self {
            Decision::Accept => ReportStatus::Accepted,
            Decision::Reject => ReportStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: ReportId,
    pub created_at: DateTime<Utc>,
    pub submitter_id: UserId,
    pub location: String,
    pub incident_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persons_injured: Option<String>,
    pub consciousness_state: String,
    pub hospital_id: HospitalId,
    pub hospital_name: String,
    pub status: ReportStatus,
}

impl IncidentReport {
    pub fn with_status(&self, status: ReportStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// A validated report that has not been assigned an id or timestamp yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub submitter_id: UserId,
    pub location: String,
    pub incident_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persons_injured: Option<String>,
    pub consciousness_state: String,
    pub hospital_id: HospitalId,
    pub hospital_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
    pub role: Role,
}
