//! Storage Traits
//!
//! This module defines the two collaborator seams the evaluation core
//! reads and writes through:
//! - `TemplateStore`: read-only traversal of the Area -> Task -> Element
//!   hierarchy of a template.
//! - `SessionStore`: sessions, the per-element ledger, and task-level
//!   feedback tags.
//!
//! All methods return a `Result` to handle potential storage errors.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::types::{
    Area, Element, ElementEvaluation, ElementType, NewSession, Session, SessionElementRow,
    SessionFilter, SessionUpdate, Task, TaskFeedback, Template,
};

/// Read-only access to template hierarchies.
///
/// Implementors must return children in their stable order: areas by
/// `order_number`, tasks by `order_letter` within their area, elements by
/// `code` within their task. The batch variants preserve parent order
/// first so that callers can group without re-sorting.
pub trait TemplateStore: Send + Sync {
    fn get_template(&self, template_id: Uuid) -> Result<Option<Template>, StorageError>;

    fn get_areas(&self, template_id: Uuid) -> Result<Vec<Area>, StorageError>;

    fn get_tasks_by_area(&self, area_id: Uuid) -> Result<Vec<Task>, StorageError>;

    fn get_tasks_for_areas(&self, area_ids: &[Uuid]) -> Result<Vec<Task>, StorageError>;

    fn get_elements_by_task(
        &self,
        task_id: Uuid,
        element_type: Option<ElementType>,
    ) -> Result<Vec<Element>, StorageError>;

    fn get_elements_for_tasks(&self, task_ids: &[Uuid]) -> Result<Vec<Element>, StorageError>;
}

/// Sessions and their evaluation state.
///
/// The ledger is keyed on `(session_id, element_id)`; upserts resolve
/// conflicts on that key so repeated saves of the same element are
/// last-write-wins.
pub trait SessionStore: Send + Sync {
    fn create_session(&self, session: &NewSession) -> Result<Uuid, StorageError>;

    fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StorageError>;

    fn get_sessions(&self, filter: Option<SessionFilter>) -> Result<Vec<Session>, StorageError>;

    fn update_session(
        &self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<(), StorageError>;

    /// Ledger rows for one session, keyed by element id. The rows are
    /// filtered to `session_id` here, before any caller joins them
    /// against template elements. `element_ids` narrows the read when
    /// only a subset is needed.
    fn get_session_elements(
        &self,
        session_id: Uuid,
        element_ids: Option<&[Uuid]>,
    ) -> Result<HashMap<Uuid, SessionElementRow>, StorageError>;

    /// Writes performance status, comment and the derived review flag;
    /// clears any rubric score on the row.
    fn upsert_element_evaluation(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        evaluation: &ElementEvaluation,
    ) -> Result<(), StorageError>;

    /// Writes the 1-4 rubric score without touching performance status.
    fn upsert_element_score(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        score: u8,
    ) -> Result<(), StorageError>;

    fn upsert_element_mentions(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        instructor_mentioned: bool,
        student_mentioned: bool,
    ) -> Result<(), StorageError>;

    /// Insert-or-ignore on the ledger key; returns the number of rows
    /// actually inserted. Existing rows are never overwritten, which
    /// makes prepopulation safe to repeat.
    fn bulk_insert_session_elements(
        &self,
        rows: &[SessionElementRow],
    ) -> Result<usize, StorageError>;

    fn set_a2_deficiencies(
        &self,
        session_id: Uuid,
        element_ids: &[Uuid],
    ) -> Result<(), StorageError>;

    fn save_task_feedback(
        &self,
        session_id: Uuid,
        task_id: Uuid,
        feedback: TaskFeedback,
    ) -> Result<(), StorageError>;

    fn get_task_feedback(
        &self,
        session_id: Uuid,
    ) -> Result<HashMap<Uuid, TaskFeedback>, StorageError>;
}
