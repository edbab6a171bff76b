use serde::{Deserialize, Serialize};

use qupid_shared::errors::{AppError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Reviewing,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Open,
        ReportStatus::Reviewing,
        ReportStatus::Resolved,
        ReportStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Rejected)
    }

    /// open -> reviewing -> resolved | rejected. Staying in place is allowed
    /// so admins can amend the note.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (ReportStatus::Open, ReportStatus::Reviewing)
                | (ReportStatus::Reviewing, ReportStatus::Resolved)
                | (ReportStatus::Reviewing, ReportStatus::Rejected)
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ReportStatus::Open),
            "reviewing" => Ok(ReportStatus::Reviewing),
            "resolved" => Ok(ReportStatus::Resolved),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(AppError::new(
                ErrorCode::ValidationError,
                format!("invalid report status: {other}"),
            )),
        }
    }
}

pub fn ensure_transition(current: ReportStatus, next: ReportStatus) -> Result<(), AppError> {
    if current.can_transition_to(next) {
        return Ok(());
    }
    Err(AppError::with_details(
        ErrorCode::InvalidReportTransition,
        format!("cannot move report from {current} to {next}"),
        serde_json::json!({ "from": current, "to": next }),
    ))
}
