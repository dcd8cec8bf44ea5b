//! Issue domain model and request payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Issue category, a fixed enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Road,
    Water,
    Electricity,
    Sanitation,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Road,
        Category::Water,
        Category::Electricity,
        Category::Sanitation,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Road => "road",
            Category::Water => "water",
            Category::Electricity => "electricity",
            Category::Sanitation => "sanitation",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Invalid category: {}", s))
    }
}

/// Issue lifecycle status: pending → acknowledged → in_progress → resolved
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    Acknowledged,
    InProgress,
    Resolved,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 4] = [
        IssueStatus::Pending,
        IssueStatus::Acknowledged,
        IssueStatus::InProgress,
        IssueStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Acknowledged => "acknowledged",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Resolved => "resolved",
        }
    }

    /// Resolved is the terminal state; only it carries a resolution note
    pub fn is_resolved(&self) -> bool {
        matches!(self, IssueStatus::Resolved)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid status: {}", s))
    }
}

/// A WGS84 point as (longitude, latitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Coordinates must be finite and inside the valid WGS84 ranges
    pub fn validate(&self) -> Result<(), String> {
        if !self.longitude.is_finite() || !self.latitude.is_finite() {
            return Err("Coordinates must be finite numbers".to_string());
        }
        if self.longitude < -180.0 || self.longitude > 180.0 {
            return Err("Longitude must be between -180 and 180".to_string());
        }
        if self.latitude < -90.0 || self.latitude > 90.0 {
            return Err("Latitude must be between -90 and 90".to_string());
        }
        Ok(())
    }
}

/// A single comment on an issue
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Issue entity
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub id: Uuid,
    pub category: Category,
    pub details: String,
    pub location: Location,
    pub status: IssueStatus,
    pub upvotes: i64,
    pub comments: Vec<Comment>,
    pub resolution_note: Option<String>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for inserting a new issue
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub category: Category,
    pub details: String,
    pub location: Location,
    pub reported_by: Uuid,
}

/// Filter for issue listings
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
}

/// Account role carried in the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Citizen,
    GovEmployee,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "gov_employee" => Ok(Role::GovEmployee),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

/// The authenticated caller, extracted from the bearer token by the
/// middleware and passed explicitly into every operation that needs it
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// Request to report a new issue
#[derive(Debug, Deserialize)]
pub struct ReportIssueRequest {
    pub category: String,
    pub details: String,
    pub location: Location,
}

/// Request to move an issue through the status lifecycle
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    pub resolution_note: Option<String>,
}

/// Request to append a comment
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

/// Query parameters for issue listings
#[derive(Debug, Default, Deserialize)]
pub struct IssueQuery {
    pub status: Option<String>,
}
