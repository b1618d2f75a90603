//! Database repository for visit requests.
//!
//! Every query returns the visit joined with its resident. Mutations are single `UPDATE`
//! statements wrapped in a CTE so the guard conditions and the write happen atomically; a
//! `None` result means the row either does not exist or did not satisfy the guard, and callers
//! tell the two apart with a follow-up read.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    api::models::visitors::{VisitorListStatus, VisitorStatus},
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::visitors::{GateStamp, VisitorCreateDBRequest, VisitorDBResponse, VisitorFilter, VisitorRow},
    },
    types::VisitorId,
};

/// Columns selected from a visitor row `v` left-joined with its resident `r`
const VISITOR_PROJECTION: &str = r#"
    v.id, v.visitor_name, v.visitor_email, v.resident_name, v.resident_email, v.visit_reason,
    v.car_number, v.verification_code, v.status, v.in_date, v.in_time, v.out_date, v.out_time,
    v.created_at,
    r.id AS resident_id, r.name AS resident_display_name, r.created_at AS resident_created_at
"#;

/// Wrap a data-modifying statement that `RETURNING *` from visitors so the result is joined
fn joined(statement: &str) -> String {
    format!(
        "WITH v AS ({statement}) SELECT {VISITOR_PROJECTION} FROM v LEFT JOIN residents r ON r.email = v.resident_email"
    )
}

pub struct Visitors<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Visitors<'c> {
    type CreateRequest = VisitorCreateDBRequest;
    type Response = VisitorDBResponse;
    type Id = VisitorId;
    type Filter = VisitorFilter;

    #[instrument(skip(self, request), fields(resident_email = %request.resident_email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let sql = joined(
            r#"
            INSERT INTO visitors
                (visitor_name, visitor_email, resident_name, resident_email, visit_reason, car_number, verification_code, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        );

        let row = sqlx::query_as::<_, VisitorRow>(&sql)
            .bind(&request.visitor_name)
            .bind(&request.visitor_email)
            .bind(&request.resident_name)
            .bind(&request.resident_email)
            .bind(&request.visit_reason)
            .bind(&request.car_number)
            .bind(&request.verification_code)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(row.into())
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let sql = format!("SELECT {VISITOR_PROJECTION} FROM visitors v LEFT JOIN residents r ON r.email = v.resident_email WHERE v.id = $1");

        let row = sqlx::query_as::<_, VisitorRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(status = ?filter.status), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = format!("SELECT {VISITOR_PROJECTION} FROM visitors v LEFT JOIN residents r ON r.email = v.resident_email");

        let mut bind_status = None;
        match filter.status {
            None => {}
            Some(VisitorListStatus::Pending) => bind_status = Some(VisitorStatus::Pending),
            Some(VisitorListStatus::Approved) => bind_status = Some(VisitorStatus::Approved),
            Some(VisitorListStatus::Rejected) => bind_status = Some(VisitorStatus::Rejected),
            Some(VisitorListStatus::Inside) => query.push_str(" WHERE v.in_time IS NOT NULL AND v.out_time IS NULL"),
            Some(VisitorListStatus::Completed) => query.push_str(" WHERE v.out_time IS NOT NULL"),
        }
        if bind_status.is_some() {
            query.push_str(" WHERE v.status = $1");
        }

        query.push_str(" ORDER BY v.created_at DESC, v.id DESC");

        let mut sql_query = sqlx::query_as::<_, VisitorRow>(&query);
        if let Some(status) = bind_status {
            sql_query = sql_query.bind(status);
        }

        let rows = sql_query.fetch_all(&mut *self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

impl<'c> Visitors<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a resident's decision.
    ///
    /// With `only_pending` set, a request that has already been decided is left untouched.
    #[instrument(skip(self), err)]
    pub async fn set_status(&mut self, id: VisitorId, status: VisitorStatus, only_pending: bool) -> Result<Option<VisitorDBResponse>> {
        let sql = joined(
            r#"
            UPDATE visitors SET status = $2
            WHERE id = $1 AND ($3::boolean = FALSE OR status = 'pending')
            RETURNING *
            "#,
        );

        let row = sqlx::query_as::<_, VisitorRow>(&sql)
            .bind(id)
            .bind(status)
            .bind(only_pending)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Stamp the entry time on the request matching both `id` and `code`.
    ///
    /// With `require_approved` set, only approved requests that have not yet checked in match.
    #[instrument(skip(self, code), err)]
    pub async fn check_in(
        &mut self,
        id: VisitorId,
        code: &str,
        stamp: GateStamp,
        require_approved: bool,
    ) -> Result<Option<VisitorDBResponse>> {
        let sql = joined(
            r#"
            UPDATE visitors SET in_date = $3, in_time = $4
            WHERE id = $1 AND verification_code = $2
              AND ($5::boolean = FALSE OR (status = 'approved' AND in_time IS NULL))
            RETURNING *
            "#,
        );

        let row = sqlx::query_as::<_, VisitorRow>(&sql)
            .bind(id)
            .bind(code)
            .bind(stamp.date)
            .bind(stamp.time)
            .bind(require_approved)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Stamp the exit time.
    ///
    /// With `require_inside` set, only requests that have checked in and not yet out match.
    #[instrument(skip(self), err)]
    pub async fn check_out(&mut self, id: VisitorId, stamp: GateStamp, require_inside: bool) -> Result<Option<VisitorDBResponse>> {
        let sql = joined(
            r#"
            UPDATE visitors SET out_date = $2, out_time = $3
            WHERE id = $1
              AND ($4::boolean = FALSE OR (in_time IS NOT NULL AND out_time IS NULL))
            RETURNING *
            "#,
        );

        let row = sqlx::query_as::<_, VisitorRow>(&sql)
            .bind(id)
            .bind(stamp.date)
            .bind(stamp.time)
            .bind(require_inside)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, code), err)]
    pub async fn get_by_id_and_code(&mut self, id: VisitorId, code: &str) -> Result<Option<VisitorDBResponse>> {
        let sql = format!(
            "SELECT {VISITOR_PROJECTION} FROM visitors v LEFT JOIN residents r ON r.email = v.resident_email \
             WHERE v.id = $1 AND v.verification_code = $2"
        );

        let row = sqlx::query_as::<_, VisitorRow>(&sql)
            .bind(id)
            .bind(code)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Residents;
    use chrono::{NaiveDate, NaiveTime};
    use sqlx::PgPool;

    fn stamp(h: u32, m: u32) -> GateStamp {
        GateStamp {
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
        }
    }

    async fn insert_visitor(conn: &mut PgConnection, visitor_name: &str, code: &str) -> VisitorDBResponse {
        Residents::new(conn).ensure("Bob", "b@x.com").await.unwrap();
        Visitors::new(conn)
            .create(&VisitorCreateDBRequest {
                visitor_name: visitor_name.to_string(),
                visitor_email: "a@x.com".to_string(),
                resident_name: "Bob".to_string(),
                resident_email: "b@x.com".to_string(),
                visit_reason: "delivery".to_string(),
                car_number: None,
                verification_code: code.to_string(),
            })
            .await
            .unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_joins_resident(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let visitor = insert_visitor(&mut conn, "Alice", "1234").await;

        assert_eq!(visitor.status, VisitorStatus::Pending);
        assert_eq!(visitor.verification_code, "1234");
        assert!(visitor.in_time.is_none());
        let resident = visitor.resident.expect("resident should be joined");
        assert_eq!(resident.email, "b@x.com");
        assert_eq!(resident.name, "Bob");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_rejects_malformed_code(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        Residents::new(&mut conn).ensure("Bob", "b@x.com").await.unwrap();

        let err = Visitors::new(&mut conn)
            .create(&VisitorCreateDBRequest {
                visitor_name: "Alice".to_string(),
                visitor_email: "a@x.com".to_string(),
                resident_name: "Bob".to_string(),
                resident_email: "b@x.com".to_string(),
                visit_reason: "delivery".to_string(),
                car_number: None,
                verification_code: "12a4".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, crate::db::errors::DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_status_guard(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let visitor = insert_visitor(&mut conn, "Alice", "1234").await;
        let mut repo = Visitors::new(&mut conn);

        let approved = repo.set_status(visitor.id, VisitorStatus::Approved, true).await.unwrap().unwrap();
        assert_eq!(approved.status, VisitorStatus::Approved);

        // Guarded: already decided
        assert!(repo.set_status(visitor.id, VisitorStatus::Rejected, true).await.unwrap().is_none());
        // Unguarded: overwrite
        let rejected = repo.set_status(visitor.id, VisitorStatus::Rejected, false).await.unwrap().unwrap();
        assert_eq!(rejected.status, VisitorStatus::Rejected);

        assert!(repo.set_status(9999, VisitorStatus::Approved, false).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_in_requires_matching_code(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let visitor = insert_visitor(&mut conn, "Alice", "1234").await;
        let mut repo = Visitors::new(&mut conn);

        assert!(repo.check_in(visitor.id, "4321", stamp(9, 5), false).await.unwrap().is_none());
        assert!(repo.check_in(visitor.id + 1, "1234", stamp(9, 5), false).await.unwrap().is_none());

        let checked_in = repo.check_in(visitor.id, "1234", stamp(9, 5), false).await.unwrap().unwrap();
        assert_eq!(checked_in.in_time, NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(checked_in.in_date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert!(checked_in.is_checked_in());
        assert!(!checked_in.is_checked_out());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_in_guarded_requires_approval(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let visitor = insert_visitor(&mut conn, "Alice", "1234").await;
        let mut repo = Visitors::new(&mut conn);

        assert!(repo.check_in(visitor.id, "1234", stamp(9, 5), true).await.unwrap().is_none());

        repo.set_status(visitor.id, VisitorStatus::Approved, true).await.unwrap().unwrap();
        assert!(repo.check_in(visitor.id, "1234", stamp(9, 5), true).await.unwrap().is_some());
        // Second check-in refused
        assert!(repo.check_in(visitor.id, "1234", stamp(9, 10), true).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_out_guarded_requires_check_in(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let visitor = insert_visitor(&mut conn, "Alice", "1234").await;
        let mut repo = Visitors::new(&mut conn);

        assert!(repo.check_out(visitor.id, stamp(17, 0), true).await.unwrap().is_none());

        // Unguarded check-out stamps regardless
        let out = repo.check_out(visitor.id, stamp(17, 0), false).await.unwrap().unwrap();
        assert_eq!(out.out_time, NaiveTime::from_hms_opt(17, 0, 0));
        assert!(out.in_time.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_orders_newest_first_and_filters(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let first = insert_visitor(&mut conn, "First", "1111").await;
        let second = insert_visitor(&mut conn, "Second", "2222").await;
        let third = insert_visitor(&mut conn, "Third", "3333").await;

        let mut repo = Visitors::new(&mut conn);
        let all = repo.list(&VisitorFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        repo.set_status(second.id, VisitorStatus::Approved, false).await.unwrap();
        repo.check_in(second.id, "2222", stamp(10, 0), false).await.unwrap();
        repo.set_status(third.id, VisitorStatus::Approved, false).await.unwrap();
        repo.check_in(third.id, "3333", stamp(10, 0), false).await.unwrap();
        repo.check_out(third.id, stamp(11, 0), false).await.unwrap();

        let filter = |status| VisitorFilter { status: Some(status) };

        let pending = repo.list(&filter(VisitorListStatus::Pending)).await.unwrap();
        assert_eq!(pending.iter().map(|v| v.id).collect::<Vec<_>>(), vec![first.id]);

        let approved = repo.list(&filter(VisitorListStatus::Approved)).await.unwrap();
        assert_eq!(approved.iter().map(|v| v.id).collect::<Vec<_>>(), vec![third.id, second.id]);

        let inside = repo.list(&filter(VisitorListStatus::Inside)).await.unwrap();
        assert_eq!(inside.iter().map(|v| v.id).collect::<Vec<_>>(), vec![second.id]);

        let completed = repo.list(&filter(VisitorListStatus::Completed)).await.unwrap();
        assert_eq!(completed.iter().map(|v| v.id).collect::<Vec<_>>(), vec![third.id]);

        assert!(repo.list(&filter(VisitorListStatus::Rejected)).await.unwrap().is_empty());
    }
}
