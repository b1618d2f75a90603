//! Database layer for data persistence and access.
//!
//! Access goes through repositories in [`handlers`], each wrapping a `&mut PgConnection` so it
//! works equally over a pooled connection or an open transaction:
//!
//! ```text
//! api handlers → lifecycle → db::handlers (repositories) → db::models → PostgreSQL
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! ```ignore
//! use gatehouse::db::handlers::{Residents, Visitors, Repository};
//!
//! let mut tx = pool.begin().await?;
//! let resident = Residents::new(&mut tx).ensure("Bob", "b@x.com").await?;
//! let visitor = Visitors::new(&mut tx).create(&request).await?;
//! tx.commit().await?;
//! ```
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded at compile time; see [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
