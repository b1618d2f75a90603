//! Database models for visit requests.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::FromRow;

use crate::api::models::visitors::{VisitorListStatus, VisitorStatus};
use crate::db::models::residents::ResidentDBResponse;
use crate::types::{ResidentId, VisitorId};

/// Database request for creating a new visit request
#[derive(Debug, Clone)]
pub struct VisitorCreateDBRequest {
    pub visitor_name: String,
    pub visitor_email: String,
    pub resident_name: String,
    pub resident_email: String,
    pub visit_reason: String,
    pub car_number: Option<String>,
    pub verification_code: String,
}

/// Database response for a visit request, joined with the resident it is addressed to
#[derive(Debug, Clone)]
pub struct VisitorDBResponse {
    pub id: VisitorId,
    pub visitor_name: String,
    pub visitor_email: String,
    pub resident_name: String,
    pub resident_email: String,
    pub visit_reason: String,
    pub car_number: Option<String>,
    pub verification_code: String,
    pub status: VisitorStatus,
    pub in_date: Option<NaiveDate>,
    pub in_time: Option<NaiveTime>,
    pub out_date: Option<NaiveDate>,
    pub out_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub resident: Option<ResidentDBResponse>,
}

impl VisitorDBResponse {
    pub fn is_checked_in(&self) -> bool {
        self.in_time.is_some()
    }

    pub fn is_checked_out(&self) -> bool {
        self.out_time.is_some()
    }
}

/// Row shape produced by the visitor/resident join
#[derive(Debug, Clone, FromRow)]
pub(crate) struct VisitorRow {
    pub id: VisitorId,
    pub visitor_name: String,
    pub visitor_email: String,
    pub resident_name: String,
    pub resident_email: String,
    pub visit_reason: String,
    pub car_number: Option<String>,
    pub verification_code: String,
    pub status: VisitorStatus,
    pub in_date: Option<NaiveDate>,
    pub in_time: Option<NaiveTime>,
    pub out_date: Option<NaiveDate>,
    pub out_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub resident_id: Option<ResidentId>,
    pub resident_display_name: Option<String>,
    pub resident_created_at: Option<DateTime<Utc>>,
}

impl From<VisitorRow> for VisitorDBResponse {
    fn from(row: VisitorRow) -> Self {
        let resident = match (row.resident_id, row.resident_display_name, row.resident_created_at) {
            (Some(id), Some(name), Some(created_at)) => Some(ResidentDBResponse {
                id,
                name,
                email: row.resident_email.clone(),
                created_at,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            visitor_name: row.visitor_name,
            visitor_email: row.visitor_email,
            resident_name: row.resident_name,
            resident_email: row.resident_email,
            visit_reason: row.visit_reason,
            car_number: row.car_number,
            verification_code: row.verification_code,
            status: row.status,
            in_date: row.in_date,
            in_time: row.in_time,
            out_date: row.out_date,
            out_time: row.out_time,
            created_at: row.created_at,
            resident,
        }
    }
}

/// Filter for listing visit requests
#[derive(Debug, Clone, Default)]
pub struct VisitorFilter {
    pub status: Option<VisitorListStatus>,
}

/// The wall-clock instant a guard recorded an entry or exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStamp {
    pub date: NaiveDate,
    pub time: NaiveTime,
}
