use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::types::{PerformanceStatus, TaskFeedback};

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub instructor_id: Uuid,
    pub student_id: Uuid,
    pub template_id: Uuid,
    pub scenario_id: Option<Uuid>,
    pub session_name: String,
    #[serde(default)]
    pub notes: String,
    /// Elements the instructor pre-flags as written-test weak areas.
    #[serde(default)]
    pub a2_deficiencies: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StartedSessionResponse {
    pub session_id: Uuid,
    pub elements_seeded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationRequest {
    pub performance_status: PerformanceStatus,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub score: u8,
}

#[derive(Debug, Deserialize)]
pub struct MentionsRequest {
    pub instructor_mentioned: bool,
    pub student_mentioned: bool,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: TaskFeedback,
}

#[derive(Debug, Deserialize)]
pub struct DeficienciesRequest {
    pub element_ids: Vec<Uuid>,
}
