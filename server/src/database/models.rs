//! Entity models
//!
//! Rust structs for every stored record plus the request bodies that
//! create or patch them. Everything crosses the wire in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

// ===== Enumerations =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Staff,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Staff, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Staff and admins run the school's safety operations
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }

    /// Notice audiences are stored sorted and without duplicates
    pub fn normalize_audience(mut roles: Vec<Role>) -> Vec<Role> {
        roles.sort_by_key(|r| r.as_str());
        roles.dedup();
        roles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
        }
    }

    fn rank(self) -> u8 {
        match self {
            ReportStatus::Pending => 0,
            ReportStatus::InProgress => 1,
            ReportStatus::Resolved => 2,
        }
    }

    /// Reports only move forward; staying put is allowed
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        next.rank() >= self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisitorStatus {
    #[default]
    CheckedIn,
    CheckedOut,
}

// ===== Entities =====

/// A person with access to the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// An incident report, possibly anonymous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub description: String,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_id: Option<String>,
    pub status: ReportStatus,
    pub priority: Priority,
    #[serde(default)]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub version: u64,
}

/// A broadcast message aimed at one or more roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub target_audience: Vec<Role>,
    pub is_active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(default)]
    pub read_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Notice {
    /// Active, unexpired and addressed to `role`
    pub fn is_visible_to(&self, role: Role, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.expires_at.map(|at| at > now).unwrap_or(true)
            && self.target_audience.contains(&role)
    }
}

/// Someone signed in at the front desk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub id: String,
    pub name: String,
    pub document: String,
    pub purpose: String,
    pub host_name: String,
    pub check_in_time: DateTime<Utc>,
    #[serde(default)]
    pub check_out_time: Option<DateTime<Utc>>,
    pub status: VisitorStatus,
    #[serde(default)]
    pub badge_number: Option<String>,
    pub registered_by: String,
    #[serde(default)]
    pub version: u64,
}

/// Entry in the append-only occurrence log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub location: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_completed: bool,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// A scheduled safety drill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drill {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub drill_type: String,
    pub scheduled_date: DateTime<Utc>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// Awareness campaign with a read counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_active: bool,
    pub created_by: String,
    pub read_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
    pub triggered_by: String,
    pub is_active: bool,
    pub is_resolved: bool,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

// ===== Requests =====

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 120, message = "must be 1-120 characters"))]
    pub name: String,
    pub role: Option<Role>,
}

/// Profile edit; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 120, message = "must be 1-120 characters"))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    #[serde(default, rename = "type")]
    #[validate(length(min = 1, max = 60, message = "must be 1-60 characters"))]
    pub report_type: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 5000, message = "must be 1-5000 characters"))]
    pub description: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub priority: Option<Priority>,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateReportStatusRequest {
    #[validate(required(message = "is required"))]
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoticeRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 10000, message = "must be 1-10000 characters"))]
    pub content: String,
    pub priority: Option<Priority>,
    #[validate(length(min = 1, message = "must name at least one role"))]
    pub target_audience: Option<Vec<Role>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoticeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 10000, message = "must be 1-10000 characters"))]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "must name at least one role"))]
    pub target_audience: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// `Some(None)` (an explicit `null`) removes the expiry
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVisitorRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 120, message = "must be 1-120 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 60, message = "must be 1-60 characters"))]
    pub document: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 300, message = "must be 1-300 characters"))]
    pub purpose: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 120, message = "must be 1-120 characters"))]
    pub host_name: String,
    #[validate(length(min = 1, max = 30, message = "must be 1-30 characters"))]
    pub badge_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOccurrenceRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 5000, message = "must be 1-5000 characters"))]
    pub description: String,
    #[validate(required(message = "is required"))]
    pub severity: Option<Severity>,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChecklistItemRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChecklistItemRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: Option<String>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDrillRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    #[validate(length(min = 1, max = 60, message = "must be 1-60 characters"))]
    pub drill_type: String,
    #[validate(required(message = "is required"))]
    pub scheduled_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 10000, message = "must be 1-10000 characters"))]
    pub content: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 60, message = "must be 1-60 characters"))]
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 10000, message = "must be 1-10000 characters"))]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 60, message = "must be 1-60 characters"))]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmergencyAlertRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 1000, message = "must be 1-1000 characters"))]
    pub message: String,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub location: Option<String>,
}

/// Marks a field as present even when its value is `null`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ===== Views =====

/// Aggregate counters for the staff dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub active_users: usize,
    pub total_reports: usize,
    pub pending_reports: usize,
    pub in_progress_reports: usize,
    pub resolved_reports: usize,
    pub active_visitors: usize,
    pub active_alerts: usize,
    pub upcoming_drills: usize,
    pub recent_reports: Vec<Report>,
}
