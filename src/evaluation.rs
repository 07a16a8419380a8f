//! Evaluation core
//!
//! The session-scoped view of an ACS template and the logic that scores
//! against it:
//! - `hierarchy`: merges the template tree with the session ledger.
//! - `scoring`: applies status, score, mention and deficiency writes.
//! - `progress`: completion and readiness aggregation over the merged tree.
//! - `cache`: injectable cache for the immutable template side.
//! - `types`: merged/derived view entities.

pub mod cache;
pub mod hierarchy;
pub mod progress;
pub mod scoring;
pub mod types;

pub use cache::TemplateCache;
pub use hierarchy::HierarchyBuilder;
pub use progress::{compute_progress, compute_readiness, flatten_elements};
pub use scoring::Evaluator;
pub use types::{AreaNode, ElementStatus, MergedElement, Progress, Readiness, TaskNode};
