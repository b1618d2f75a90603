//! HTTP request handlers.
//!
//! Handlers deserialize, hand off to [`crate::lifecycle::VisitorLifecycle`], and convert the
//! result to an API model. Errors are [`crate::errors::Error`], which renders as
//! `{"error": "..."}` with the matching status code.

pub mod visitors;
