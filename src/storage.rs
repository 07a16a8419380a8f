//! Storage subsystem
//!
//! This module provides abstractions and implementations for persisting
//! templates, sessions, and per-element evaluation state.
//!
//! Components:
//! - `storage_trait`: the TemplateStore and SessionStore traits defining a uniform API.
//! - `types`: shared record types used by storage backends.
//! - `database_storage`: SQLite implementation using sqlx.
//! - `memory_storage`: in-memory implementation for tests and database-free runs.

pub mod database_storage;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

pub use database_storage::SqliteStorage;
pub use memory_storage::MemoryStorage;
pub use storage_trait::{SessionStore, TemplateStore};
