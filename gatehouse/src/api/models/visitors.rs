//! API request/response models for visit requests.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::residents::ResidentDBResponse;
use crate::db::models::visitors::VisitorDBResponse;
use crate::lifecycle::time::format_12h;
use crate::types::{ResidentId, VisitorId, deserialize_code, deserialize_flexible_id};

/// Where a visit request stands in the approval flow.
///
/// Arrival and departure are tracked separately through the in/out timestamps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "visitor_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VisitorStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for VisitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitorStatus::Pending => write!(f, "pending"),
            VisitorStatus::Approved => write!(f, "approved"),
            VisitorStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A resident's answer to a visit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(self) -> VisitorStatus {
        match self {
            Decision::Approve => VisitorStatus::Approved,
            Decision::Reject => VisitorStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Decision::Approve),
            "rejected" | "reject" => Ok(Decision::Reject),
            other => Err(format!("status must be 'approved' or 'rejected', got {other:?}")),
        }
    }
}

/// Filter for the visitor list, mirroring the guard dashboard's status dropdown
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VisitorListStatus {
    Pending,
    Approved,
    Rejected,
    /// Checked in and not yet checked out
    Inside,
    /// Checked out
    Completed,
}

/// Query parameters for listing visitors
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListVisitorsQuery {
    /// Only return visitors in this state
    pub status: Option<VisitorListStatus>,
}

/// Visitor self-registration form.
///
/// Every field defaults to empty, whether missing or `null`, so that an absent value is
/// reported by name rather than as a generic deserialization failure.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitorRequestCreate {
    #[serde_as(as = "DefaultOnNull")]
    pub visitor_name: String,
    #[serde_as(as = "DefaultOnNull")]
    pub visitor_email: String,
    #[serde_as(as = "DefaultOnNull")]
    pub resident_name: String,
    #[serde_as(as = "DefaultOnNull")]
    pub resident_email: String,
    #[serde_as(as = "DefaultOnNull")]
    pub visit_reason: String,
    pub car_number: Option<String>,
}

/// Body of `PUT /visitor-status/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisitorStatusUpdate {
    /// Either `approved` or `rejected`
    #[schema(example = "approved")]
    pub status: String,
}

/// Body of `POST /guard-verify`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuardVerifyRequest {
    /// Visit request id, as a number or numeric string
    #[serde(deserialize_with = "deserialize_flexible_id")]
    #[schema(value_type = i64)]
    pub visitor_id: VisitorId,
    /// The 4-digit code the visitor presents
    #[serde(deserialize_with = "deserialize_code")]
    #[schema(value_type = String, example = "4821")]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResidentResponse {
    pub id: ResidentId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<ResidentDBResponse> for ResidentResponse {
    fn from(db: ResidentDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisitorResponse {
    pub id: VisitorId,
    pub visitor_name: String,
    pub visitor_email: String,
    pub resident_name: String,
    pub resident_email: String,
    pub visit_reason: String,
    pub car_number: Option<String>,
    /// Only present when the service is configured to expose codes over the API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    pub status: VisitorStatus,
    #[schema(value_type = Option<String>, format = Date)]
    pub in_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, example = "14:05:00")]
    pub in_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = Date)]
    pub out_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, example = "16:30:00")]
    pub out_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident: Option<ResidentResponse>,
    /// 12-hour rendering of the check-in time, e.g. `2:05 PM`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_time: Option<String>,
    /// 12-hour rendering of the check-out time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_out_time: Option<String>,
}

impl VisitorResponse {
    /// Build the response, hiding the verification code unless `expose_code` is set.
    ///
    /// Formatted times are derived from the stored in/out times when present.
    pub fn from_db(db: VisitorDBResponse, expose_code: bool) -> Self {
        Self {
            id: db.id,
            visitor_name: db.visitor_name,
            visitor_email: db.visitor_email,
            resident_name: db.resident_name,
            resident_email: db.resident_email,
            visit_reason: db.visit_reason,
            car_number: db.car_number,
            verification_code: expose_code.then_some(db.verification_code),
            status: db.status,
            in_date: db.in_date,
            formatted_time: db.in_time.map(format_12h),
            in_time: db.in_time,
            out_date: db.out_date,
            formatted_out_time: db.out_time.map(format_12h),
            out_time: db.out_time,
            created_at: db.created_at,
            resident: db.resident.map(Into::into),
        }
    }
}
