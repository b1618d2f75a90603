//! Database record models matching table schemas.
//!
//! These are distinct from the API models in [`crate::api::models`], which convert from them
//! and decide what leaves the service (for example whether the verification code is shown).

pub mod residents;
pub mod visitors;
