//! Repository implementations for database access.
//!
//! - [`Residents`]: resident directory, including the race-tolerant `ensure`
//! - [`Visitors`]: visit requests and their guarded status/check-in/check-out updates
//!
//! Both implement the [`Repository`] trait for create/get/list.

pub mod repository;
pub mod residents;
pub mod visitors;

pub use repository::Repository;
pub use residents::Residents;
pub use visitors::Visitors;
