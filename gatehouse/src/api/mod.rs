//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures (camelCase on the wire)
//!
//! All lifecycle routes are nested under `/api`. Documentation is served at `/docs`.

pub mod handlers;
pub mod models;
