use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ACS evaluation template. Areas, tasks and elements hang off it and
/// are immutable once a session has been bound to the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// Area of operation within a template, ordered by `order_number`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: Uuid,
    pub template_id: Uuid,
    pub order_number: i32,
    pub title: String,
    pub description: String,
}

/// Task within an area, ordered by `order_letter` ("A", "B", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub area_id: Uuid,
    pub order_letter: String,
    pub title: String,
    pub objective: String,
    pub is_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Knowledge,
    Risk,
    Skill,
}

/// Leaf node of the template hierarchy and the unit of evaluation.
/// `code` orders elements within their task ("PA.I.A.K1", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: Uuid,
    pub task_id: Uuid,
    pub code: String,
    pub element_type: ElementType,
    pub label: String,
    pub description: String,
    pub performance_criteria: Vec<String>,
    pub common_errors: Vec<String>,
    pub references: Vec<String>,
}

/// Live performance state of one element, as scored by the instructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceStatus {
    Satisfactory,
    Unsatisfactory,
    NotObserved,
}

/// One mock-oral encounter between an instructor and a student, bound to
/// exactly one template for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub student_id: Uuid,
    pub template_id: Uuid,
    pub scenario_id: Option<Uuid>,
    pub session_name: String,
    pub notes: String,
    pub date_started: DateTime<Utc>,
    pub date_completed: Option<DateTime<Utc>>,
}

/// Payload for creating a session; the id and start timestamp are
/// assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub instructor_id: Uuid,
    pub student_id: Uuid,
    pub template_id: Uuid,
    pub scenario_id: Option<Uuid>,
    pub session_name: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub session_name: Option<String>,
    pub notes: Option<String>,
    pub date_completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    pub instructor_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub completed: Option<bool>,
}

/// Ledger row: the sole mutable state of an evaluation, keyed on
/// `(session_id, element_id)`. Never deleted while the session exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionElementRow {
    pub session_id: Uuid,
    pub element_id: Uuid,
    pub performance_status: PerformanceStatus,
    pub instructor_comment: String,
    pub instructor_mentioned: bool,
    pub student_mentioned: bool,
    pub a2_deficiency: bool,
    pub needs_review: bool,
    pub score: Option<u8>,
}

impl SessionElementRow {
    /// Default row seeded by prepopulation: nothing observed yet.
    pub fn prepopulated(session_id: Uuid, element_id: Uuid) -> Self {
        Self {
            session_id,
            element_id,
            performance_status: PerformanceStatus::NotObserved,
            instructor_comment: String::new(),
            instructor_mentioned: false,
            student_mentioned: false,
            a2_deficiency: false,
            needs_review: false,
            score: None,
        }
    }
}

/// Fields written by the status-based scoring path. The rubric score is
/// cleared whenever this is applied; mention and deficiency flags are
/// left untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementEvaluation {
    pub performance_status: PerformanceStatus,
    pub instructor_comment: String,
    pub needs_review: bool,
}

/// Instructor's task-level feedback tag, the input to readiness
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFeedback {
    Excellent,
    Proficient,
    NeedsReview,
    Weak,
}
