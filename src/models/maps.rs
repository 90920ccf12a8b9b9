//! Map domain models: categories, points of interest, submissions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// POI category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Submission moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    #[serde(other)]
    Unknown,
}

/// Point of interest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub submitted_by: Option<String>,
    /// Verdict text produced by the backend's automatic review
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// New POI submission
#[derive(Debug, Clone, Serialize, Validate)]
pub struct PoiSubmission {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: i64,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Geocoding hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Bulk upload outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkUploadReport {
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Moderator decision on a submission
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ModerationDecision {
    Approve,
    Reject { reason: String },
}
