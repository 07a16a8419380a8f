//! Session lifecycle
//!
//! Creating a mock-oral session, seeding its evaluation ledger, and
//! closing it out.

pub mod session_manager;

pub use session_manager::{SessionManager, StartedSession};
