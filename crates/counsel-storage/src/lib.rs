//! Counsel Storage Layer
//!
//! SQLite-backed persistence for client state that must survive a reload.
//! All writes are transactional.

mod database;
mod error;
mod migrations;

pub use database::{Database, StoredAuthSession};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
