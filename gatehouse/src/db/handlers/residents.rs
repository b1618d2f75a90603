//! Database repository for residents.

use sqlx::{Connection, PgConnection};
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::residents::{ResidentCreateDBRequest, ResidentDBResponse, ResidentFilter},
    },
    types::ResidentId,
};

/// Name given to residents first seen without one
pub const DEFAULT_RESIDENT_NAME: &str = "Resident";

pub struct Residents<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Residents<'c> {
    type CreateRequest = ResidentCreateDBRequest;
    type Response = ResidentDBResponse;
    type Id = ResidentId;
    type Filter = ResidentFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let resident = sqlx::query_as::<_, ResidentDBResponse>(
            r#"
            INSERT INTO residents (name, email)
            VALUES ($1, $2)
            RETURNING id, name, email, created_at
            "#,
        )
        .bind(&request.name)
        .bind(&request.email)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(resident)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let resident = sqlx::query_as::<_, ResidentDBResponse>("SELECT id, name, email, created_at FROM residents WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(resident)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let residents = sqlx::query_as::<_, ResidentDBResponse>(
            "SELECT id, name, email, created_at FROM residents ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(residents)
    }
}

impl<'c> Residents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<ResidentDBResponse>> {
        let resident = sqlx::query_as::<_, ResidentDBResponse>("SELECT id, name, email, created_at FROM residents WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(resident)
    }

    /// Look up a resident by email, creating one if none exists yet.
    ///
    /// The first name seen for an email wins; later calls never rename. A concurrent insert
    /// for the same email surfaces as a unique violation, in which case the row the other
    /// writer created is returned instead. The insert runs in a nested transaction so that
    /// the violation does not abort a transaction the caller may hold.
    #[instrument(skip(self, name), err)]
    pub async fn ensure(&mut self, name: &str, email: &str) -> Result<ResidentDBResponse> {
        if let Some(existing) = self.get_by_email(email).await? {
            return Ok(existing);
        }

        let name = match name.trim() {
            "" => DEFAULT_RESIDENT_NAME,
            trimmed => trimmed,
        };
        let request = ResidentCreateDBRequest {
            name: name.to_string(),
            email: email.to_string(),
        };

        let mut tx = self.db.begin().await?;
        let created = Residents::new(&mut tx).create(&request).await;

        match created {
            Ok(resident) => {
                tx.commit().await?;
                tracing::info!(resident_id = resident.id, "Created new resident");
                Ok(resident)
            }
            Err(e) if e.is_unique_violation() => {
                tx.rollback().await?;
                tracing::debug!("Resident created concurrently, re-fetching");
                self.get_by_email(email).await?.ok_or(DbError::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_ensure_creates_resident_on_first_sight(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Residents::new(&mut conn);

        let resident = repo.ensure("Bob", "b@x.com").await.unwrap();
        assert_eq!(resident.name, "Bob");
        assert_eq!(resident.email, "b@x.com");

        let fetched = repo.get_by_email("b@x.com").await.unwrap().unwrap();
        assert_eq!(fetched, resident);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ensure_is_first_write_wins(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Residents::new(&mut conn);

        let first = repo.ensure("Bob", "b@x.com").await.unwrap();
        let second = repo.ensure("Robert", "b@x.com").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Bob");

        let all = repo.list(&ResidentFilter::new(0, 100)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ensure_defaults_blank_name(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Residents::new(&mut conn);

        let resident = repo.ensure("   ", "anon@x.com").await.unwrap();
        assert_eq!(resident.name, DEFAULT_RESIDENT_NAME);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ensure_inside_open_transaction_survives_conflict(pool: PgPool) {
        // Another writer creates the row between our lookup and insert: simulate by inserting
        // directly, then calling create, which must fail with a unique violation.
        let mut tx = pool.begin().await.unwrap();
        let mut repo = Residents::new(&mut tx);
        repo.ensure("Bob", "b@x.com").await.unwrap();

        let duplicate = ResidentCreateDBRequest {
            name: "Other".to_string(),
            email: "b@x.com".to_string(),
        };
        let mut savepoint = tx.begin().await.unwrap();
        let err = Residents::new(&mut savepoint).create(&duplicate).await.unwrap_err();
        assert!(err.is_unique_violation());
        savepoint.rollback().await.unwrap();

        // The outer transaction is still usable
        let mut repo = Residents::new(&mut tx);
        let resident = repo.ensure("Robert", "b@x.com").await.unwrap();
        assert_eq!(resident.name, "Bob");
        tx.commit().await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_ensure_yields_single_resident(pool: PgPool) {
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let mut conn = pool.acquire().await.unwrap();
                    Residents::new(&mut conn).ensure(&format!("Name {i}"), "race@x.com").await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM residents WHERE email = 'race@x.com'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
