//! Database models for residents.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::ResidentId;

/// Database request for creating a new resident
#[derive(Debug, Clone)]
pub struct ResidentCreateDBRequest {
    pub name: String,
    pub email: String,
}

/// Database response for a resident
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ResidentDBResponse {
    pub id: ResidentId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing residents
#[derive(Debug, Clone)]
pub struct ResidentFilter {
    pub skip: i64,
    pub limit: i64,
}

impl ResidentFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}
