use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::types::{Element, ElementType, PerformanceStatus, SessionElementRow};

/// Display state of an element inside a session, always derived from its
/// performance status and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementStatus {
    Completed,
    InProgress,
    Issue,
}

impl ElementStatus {
    /// The one place the performance -> display mapping lives.
    pub fn from_performance(status: PerformanceStatus) -> Self {
        match status {
            PerformanceStatus::Satisfactory => ElementStatus::Completed,
            PerformanceStatus::Unsatisfactory => ElementStatus::Issue,
            PerformanceStatus::NotObserved => ElementStatus::InProgress,
        }
    }
}

/// An element annotated with its live per-session state. Built fresh on
/// every read from the immutable `Element` and its optional ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedElement {
    pub id: Uuid,
    pub task_id: Uuid,
    pub code: String,
    pub element_type: ElementType,
    pub label: String,
    pub description: String,
    pub performance_criteria: Vec<String>,
    pub common_errors: Vec<String>,
    pub references: Vec<String>,
    pub performance_status: PerformanceStatus,
    pub instructor_comment: String,
    pub instructor_mentioned: bool,
    pub student_mentioned: bool,
    pub a2_deficiency: bool,
    pub needs_review: bool,
    pub score: Option<u8>,
    pub status: ElementStatus,
}

impl MergedElement {
    /// Joins one template element with its ledger row. An element that
    /// has never been scored gets the not-observed defaults.
    pub fn from_parts(element: Element, row: Option<&SessionElementRow>) -> Self {
        let (
            performance_status,
            instructor_comment,
            instructor_mentioned,
            student_mentioned,
            a2_deficiency,
            needs_review,
            score,
        ) = match row {
            Some(r) => (
                r.performance_status,
                r.instructor_comment.clone(),
                r.instructor_mentioned,
                r.student_mentioned,
                r.a2_deficiency,
                r.needs_review,
                r.score,
            ),
            None => (
                PerformanceStatus::NotObserved,
                String::new(),
                false,
                false,
                false,
                false,
                None,
            ),
        };
        Self {
            id: element.id,
            task_id: element.task_id,
            code: element.code,
            element_type: element.element_type,
            label: element.label,
            description: element.description,
            performance_criteria: element.performance_criteria,
            common_errors: element.common_errors,
            references: element.references,
            performance_status,
            instructor_comment,
            instructor_mentioned,
            student_mentioned,
            a2_deficiency,
            needs_review,
            score,
            status: ElementStatus::from_performance(performance_status),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: Uuid,
    pub area_id: Uuid,
    pub order_letter: String,
    pub title: String,
    pub objective: String,
    pub is_required: bool,
    pub elements: Vec<MergedElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaNode {
    pub id: Uuid,
    pub template_id: Uuid,
    pub order_number: i32,
    pub title: String,
    pub description: String,
    pub tasks: Vec<TaskNode>,
}

/// Completion counts over a merged hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub issues: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessLevel {
    #[serde(rename = "Checkride Ready")]
    CheckrideReady,
    #[serde(rename = "Almost There")]
    AlmostThere,
    #[serde(rename = "Needs Review")]
    NeedsReview,
}

impl fmt::Display for ReadinessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessLevel::CheckrideReady => write!(f, "Checkride Ready"),
            ReadinessLevel::AlmostThere => write!(f, "Almost There"),
            ReadinessLevel::NeedsReview => write!(f, "Needs Review"),
        }
    }
}

/// Checkride preparedness classification from task-level feedback tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub percent: u32,
    pub level: ReadinessLevel,
}

/// What a successful status save reports back: the authoritative derived
/// state, so optimistic UI updates patch with confirmed data instead of
/// assumed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEvaluation {
    pub performance_status: PerformanceStatus,
    pub status: ElementStatus,
    pub needs_review: bool,
}
