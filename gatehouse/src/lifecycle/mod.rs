//! Visit request lifecycle.
//!
//! A request moves `pending → approved | rejected`; an approved visitor is then checked in by a
//! guard presenting the verification code and later checked out. Check-in and check-out are
//! tracked by the presence of the in/out timestamps rather than extra status values.
//!
//! By default every transition is accepted as long as the request exists, and a decision can be
//! overwritten. With [`LifecycleConfig::enforce_transitions`] set, out-of-order transitions are
//! refused with [`Error::Conflict`] instead. Guards are evaluated inside the same `UPDATE` that
//! applies the transition, so two guards racing on the same request cannot both win.

pub mod code;
pub mod time;
pub mod validation;

use sqlx::{PgPool, Postgres, pool::PoolConnection};
use tracing::{debug, info, instrument};

use crate::{
    api::models::visitors::{Decision, VisitorRequestCreate, VisitorStatus},
    config::LifecycleConfig,
    db::{
        errors::DbError,
        handlers::{Repository, Residents, Visitors},
        models::visitors::{GateStamp, VisitorCreateDBRequest, VisitorDBResponse, VisitorFilter},
    },
    errors::{Error, Result},
    notifications::NotificationDispatcher,
    types::VisitorId,
};

const RESOURCE: &str = "Visitor request";

fn not_found(id: VisitorId) -> Error {
    Error::NotFound {
        resource: RESOURCE.to_string(),
        id: id.to_string(),
    }
}

/// A resident that lost a creation race and still cannot be read back is a conflict
fn resident_lookup_error(err: DbError) -> Error {
    match err {
        DbError::NotFound => Error::Conflict {
            message: "Failed to create or find resident".to_string(),
        },
        other => Error::Database(other),
    }
}

/// Drives visit requests through their lifecycle and fires notifications on the way.
#[derive(Debug, Clone)]
pub struct VisitorLifecycle {
    db: PgPool,
    notifications: NotificationDispatcher,
    config: LifecycleConfig,
}

impl VisitorLifecycle {
    pub fn new(db: PgPool, notifications: NotificationDispatcher, config: LifecycleConfig) -> Self {
        Self { db, notifications, config }
    }

    async fn connection(&self) -> Result<PoolConnection<Postgres>> {
        self.db.acquire().await.map_err(|e| Error::Database(e.into()))
    }

    /// Register a visit request on behalf of a visitor.
    ///
    /// The resident is created on first sight. The new request is `pending` and carries a fresh
    /// verification code; the resident is asked to decide by email.
    #[instrument(skip_all, fields(resident_email = %form.resident_email))]
    pub async fn submit_request(&self, form: &VisitorRequestCreate) -> Result<VisitorDBResponse> {
        let submission = validation::validate_submission(form)?;

        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let resident = Residents::new(&mut tx)
            .ensure(&submission.resident_name, &submission.resident_email)
            .await
            .map_err(resident_lookup_error)?;

        let request = VisitorCreateDBRequest {
            visitor_name: submission.visitor_name,
            visitor_email: submission.visitor_email,
            resident_name: submission.resident_name,
            resident_email: resident.email.clone(),
            visit_reason: submission.visit_reason,
            car_number: submission.car_number,
            verification_code: code::generate_code(),
        };
        let visitor = Visitors::new(&mut tx).create(&request).await?;

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        info!(visitor_id = visitor.id, resident_id = resident.id, "Visitor request submitted");
        self.notifications.request_created(&visitor);

        Ok(visitor)
    }

    /// Record the resident's decision. Approving emails the visitor their code.
    #[instrument(skip(self))]
    pub async fn decide(&self, id: VisitorId, decision: Decision) -> Result<VisitorDBResponse> {
        let mut conn = self.connection().await?;
        let mut repo = Visitors::new(&mut conn);

        let Some(visitor) = repo.set_status(id, decision.status(), self.config.enforce_transitions).await? else {
            return Err(match repo.get_by_id(id).await? {
                Some(existing) => Error::Conflict {
                    message: format!("{RESOURCE} {id} has already been {}", existing.status),
                },
                None => not_found(id),
            });
        };

        info!(visitor_id = id, status = %visitor.status, "Visitor request decided");
        if decision == Decision::Approve {
            self.notifications.approved(&visitor);
        }

        Ok(visitor)
    }

    /// Check a visitor in at the gate.
    ///
    /// Succeeds only when `code` equals the code issued for `id`. Every mismatch, including an
    /// unknown id, yields the same [`Error::InvalidCode`] so the response does not reveal which
    /// ids exist.
    #[instrument(skip(self, code))]
    pub async fn verify(&self, id: VisitorId, code: &str) -> Result<VisitorDBResponse> {
        if !code::is_well_formed(code) {
            debug!(visitor_id = id, "Rejected malformed verification code");
            return Err(Error::InvalidCode);
        }

        let strict = self.config.enforce_transitions;
        let stamp = GateStamp::now();
        let mut conn = self.connection().await?;
        let mut repo = Visitors::new(&mut conn);

        if let Some(visitor) = repo.check_in(id, code, stamp, strict).await? {
            info!(visitor_id = id, in_time = %stamp.time, "Visitor checked in");
            return Ok(visitor);
        }

        if strict {
            // The code was right, so the refusal reason is safe to reveal
            if let Some(existing) = repo.get_by_id_and_code(id, code).await? {
                let message = if existing.status != VisitorStatus::Approved {
                    format!("{RESOURCE} {id} is {}, not approved", existing.status)
                } else {
                    format!("Visitor {id} has already checked in")
                };
                return Err(Error::Conflict { message });
            }
        }

        debug!(visitor_id = id, "Verification code did not match");
        Err(Error::InvalidCode)
    }

    /// Stamp a visitor's departure.
    #[instrument(skip(self))]
    pub async fn check_out(&self, id: VisitorId) -> Result<VisitorDBResponse> {
        let stamp = GateStamp::now();
        let mut conn = self.connection().await?;
        let mut repo = Visitors::new(&mut conn);

        let Some(visitor) = repo.check_out(id, stamp, self.config.enforce_transitions).await? else {
            return Err(match repo.get_by_id(id).await? {
                Some(existing) if !existing.is_checked_in() => Error::Conflict {
                    message: format!("Visitor {id} has not checked in"),
                },
                Some(_) => Error::Conflict {
                    message: format!("Visitor {id} has already checked out"),
                },
                None => not_found(id),
            });
        };

        info!(visitor_id = id, out_time = %stamp.time, "Visitor checked out");
        Ok(visitor)
    }

    /// All visit requests, newest first, joined with their residents.
    #[instrument(skip(self))]
    pub async fn list_all(&self, filter: &VisitorFilter) -> Result<Vec<VisitorDBResponse>> {
        let mut conn = self.connection().await?;
        let visitors = Visitors::new(&mut conn).list(filter).await?;
        debug!(count = visitors.len(), "Listed visitor requests");
        Ok(visitors)
    }

    /// Whether API responses may include verification codes
    pub fn exposes_codes(&self) -> bool {
        self.config.expose_verification_code
    }
}
