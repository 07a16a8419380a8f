pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod evaluation;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use configuration::Config;
pub use controller::Controller;
pub use evaluation::{
    compute_progress, compute_readiness, flatten_elements, Evaluator, HierarchyBuilder,
    TemplateCache,
};
pub use session_management::SessionManager;
pub use storage::{MemoryStorage, SessionStore, SqliteStorage, TemplateStore};
