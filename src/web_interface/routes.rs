use std::sync::Arc;

use uuid::Uuid;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use crate::error_handling::types::{EvaluationError, HierarchyError, SessionError};
use crate::evaluation::hierarchy::HierarchyBuilder;
use crate::evaluation::progress::{compute_progress, compute_readiness};
use crate::evaluation::scoring::Evaluator;
use crate::evaluation::types::AreaNode;
use crate::session_management::session_manager::SessionManager;
use crate::storage::storage_trait::SessionStore;
use crate::storage::types::TaskFeedback;
use crate::web_interface::types::{
    ApiError, CreateSessionRequest, DeficienciesRequest, EvaluationRequest, FeedbackRequest,
    MentionsRequest, ScoreRequest, StartedSessionResponse,
};

fn internal_error(message: &str) -> warp::reply::Response {
    reply::with_status(
        reply::json(&ApiError::new(message)),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .into_response()
}

fn not_found(message: &str) -> warp::reply::Response {
    reply::with_status(reply::json(&ApiError::new(message)), StatusCode::NOT_FOUND)
        .into_response()
}

/// Session lookup + merge, run off the async worker since storage
/// methods block.
async fn load_hierarchy(
    sessions: Arc<dyn SessionStore>,
    builder: Arc<HierarchyBuilder>,
    session_id: Uuid,
) -> Result<Result<Option<Vec<AreaNode>>, HierarchyError>, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || match sessions.get_session(session_id) {
        Ok(Some(session)) => builder
            .build_session_hierarchy(session.template_id, session_id)
            .map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(HierarchyError::StorageError(e)),
    })
    .await
}

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(|| async move {
        let html = r#"<html><head><title>Checkride Dashboard</title></head>
                <body><h1>Checkride is running</h1><p>See /sessions for JSON.</p></body></html>"#;
        Ok::<_, Rejection>(reply::html(html))
    })
}

/// GET /sessions
pub fn list_sessions_route(
    sessions: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("sessions")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let sessions = sessions.clone();
            async move {
                let result =
                    tokio::task::spawn_blocking(move || sessions.get_sessions(None)).await;
                let res = match result {
                    Ok(Ok(list)) => {
                        reply::with_status(reply::json(&list), StatusCode::OK).into_response()
                    }
                    Ok(Err(_)) => internal_error("Failed to load sessions"),
                    Err(_) => internal_error("Session listing did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// POST /sessions
pub fn create_session_route(
    manager: Arc<SessionManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("sessions")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |body: CreateSessionRequest| {
            let manager = manager.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    let payload = crate::storage::types::NewSession {
                        instructor_id: body.instructor_id,
                        student_id: body.student_id,
                        template_id: body.template_id,
                        scenario_id: body.scenario_id,
                        session_name: body.session_name.clone(),
                        notes: body.notes.clone(),
                    };
                    manager.start_session(payload, &body.a2_deficiencies)
                })
                .await;
                let res = match result {
                    Ok(Ok(started)) => reply::with_status(
                        reply::json(&StartedSessionResponse {
                            session_id: started.session_id,
                            elements_seeded: started.elements_seeded,
                            warning: started.warning,
                        }),
                        StatusCode::CREATED,
                    )
                    .into_response(),
                    Ok(Err(SessionError::TemplateNotFound)) => not_found("Template not found"),
                    Ok(Err(_)) => internal_error("Failed to create session"),
                    Err(_) => internal_error("Session creation did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /sessions/:id
pub fn get_session_route(
    sessions: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid)
        .and(warp::get())
        .and_then(move |session_id: Uuid| {
            let sessions = sessions.clone();
            async move {
                let result =
                    tokio::task::spawn_blocking(move || sessions.get_session(session_id)).await;
                let res = match result {
                    Ok(Ok(Some(session))) => {
                        reply::with_status(reply::json(&session), StatusCode::OK).into_response()
                    }
                    Ok(Ok(None)) => not_found("Session not found"),
                    Ok(Err(_)) => internal_error("Failed to load session"),
                    Err(_) => internal_error("Session lookup did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// POST /sessions/:id/complete
pub fn complete_session_route(
    manager: Arc<SessionManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "complete")
        .and(warp::post())
        .and_then(move |session_id: Uuid| {
            let manager = manager.clone();
            async move {
                let result =
                    tokio::task::spawn_blocking(move || manager.complete_session(session_id))
                        .await;
                let res = match result {
                    Ok(Ok(session)) => {
                        reply::with_status(reply::json(&session), StatusCode::OK).into_response()
                    }
                    Ok(Err(SessionError::NotFound)) => not_found("Session not found"),
                    Ok(Err(SessionError::AlreadyCompleted)) => reply::with_status(
                        reply::json(&ApiError::new("Session already completed")),
                        StatusCode::CONFLICT,
                    )
                    .into_response(),
                    Ok(Err(_)) => internal_error("Failed to complete session"),
                    Err(_) => internal_error("Completion did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /sessions/:id/hierarchy
pub fn session_hierarchy_route(
    sessions: Arc<dyn SessionStore>,
    builder: Arc<HierarchyBuilder>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "hierarchy")
        .and(warp::get())
        .and_then(move |session_id: Uuid| {
            let sessions = sessions.clone();
            let builder = builder.clone();
            async move {
                let result = load_hierarchy(sessions, builder, session_id).await;
                let res = match result {
                    Ok(Ok(Some(areas))) => {
                        reply::with_status(reply::json(&areas), StatusCode::OK).into_response()
                    }
                    Ok(Ok(None))
                    | Ok(Err(HierarchyError::SessionNotFound))
                    | Ok(Err(HierarchyError::TemplateNotFound)) => {
                        not_found("Session or template not found")
                    }
                    Ok(Err(_)) => internal_error("Failed to build hierarchy"),
                    Err(_) => internal_error("Hierarchy build did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /sessions/:id/progress
pub fn session_progress_route(
    sessions: Arc<dyn SessionStore>,
    builder: Arc<HierarchyBuilder>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "progress")
        .and(warp::get())
        .and_then(move |session_id: Uuid| {
            let sessions = sessions.clone();
            let builder = builder.clone();
            async move {
                let result = load_hierarchy(sessions, builder, session_id).await;
                let res = match result {
                    Ok(Ok(Some(areas))) => reply::with_status(
                        reply::json(&compute_progress(&areas)),
                        StatusCode::OK,
                    )
                    .into_response(),
                    Ok(Ok(None))
                    | Ok(Err(HierarchyError::SessionNotFound))
                    | Ok(Err(HierarchyError::TemplateNotFound)) => {
                        not_found("Session or template not found")
                    }
                    Ok(Err(_)) => internal_error("Failed to compute progress"),
                    Err(_) => internal_error("Progress computation did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /sessions/:id/readiness
pub fn session_readiness_route(
    sessions: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "readiness")
        .and(warp::get())
        .and_then(move |session_id: Uuid| {
            let sessions = sessions.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    match sessions.get_session(session_id)? {
                        Some(_) => {
                            let feedback = sessions.get_task_feedback(session_id)?;
                            let tags: Vec<TaskFeedback> = feedback.values().copied().collect();
                            Ok(Some(compute_readiness(&tags)))
                        }
                        None => Ok(None),
                    }
                })
                .await;
                let res = match result {
                    Ok(Ok(Some(readiness))) => {
                        reply::with_status(reply::json(&readiness), StatusCode::OK).into_response()
                    }
                    Ok(Ok(None)) => not_found("Session not found"),
                    Ok(Err(crate::error_handling::types::StorageError::NotFound)) => {
                        not_found("Session not found")
                    }
                    Ok(Err(_)) => internal_error("Failed to compute readiness"),
                    Err(_) => internal_error("Readiness computation did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// PUT /sessions/:id/elements/:element_id/evaluation
pub fn save_evaluation_route(
    evaluator: Arc<Evaluator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "elements" / Uuid / "evaluation")
        .and(warp::put())
        .and(warp::body::json())
        .and_then(
            move |session_id: Uuid, element_id: Uuid, body: EvaluationRequest| {
                let evaluator = evaluator.clone();
                async move {
                    let result = tokio::task::spawn_blocking(move || {
                        evaluator.save_element_evaluation(
                            session_id,
                            element_id,
                            body.performance_status,
                            &body.comment,
                        )
                    })
                    .await;
                    let res = match result {
                        Ok(Ok(saved)) => {
                            reply::with_status(reply::json(&saved), StatusCode::OK).into_response()
                        }
                        Ok(Err(e)) => reply::with_status(
                            reply::json(&ApiError::new(format!(
                                "Save failed for element {}: {}",
                                element_id, e
                            ))),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        )
                        .into_response(),
                        Err(_) => internal_error("Evaluation save did not complete"),
                    };
                    Ok::<_, Rejection>(res)
                }
            },
        )
}

/// PUT /sessions/:id/elements/:element_id/score
pub fn save_score_route(
    evaluator: Arc<Evaluator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "elements" / Uuid / "score")
        .and(warp::put())
        .and(warp::body::json())
        .and_then(move |session_id: Uuid, element_id: Uuid, body: ScoreRequest| {
            let evaluator = evaluator.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    evaluator.save_element_score(session_id, element_id, body.score)
                })
                .await;
                let res = match result {
                    Ok(Ok(())) => {
                        reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response()
                    }
                    Ok(Err(EvaluationError::InvalidScore(score))) => reply::with_status(
                        reply::json(&ApiError::new(format!(
                            "Score {} outside the 1-4 rubric range",
                            score
                        ))),
                        StatusCode::BAD_REQUEST,
                    )
                    .into_response(),
                    Ok(Err(e)) => reply::with_status(
                        reply::json(&ApiError::new(format!(
                            "Save failed for element {}: {}",
                            element_id, e
                        ))),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response(),
                    Err(_) => internal_error("Score save did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// PUT /sessions/:id/elements/:element_id/mentions
pub fn save_mentions_route(
    evaluator: Arc<Evaluator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "elements" / Uuid / "mentions")
        .and(warp::put())
        .and(warp::body::json())
        .and_then(
            move |session_id: Uuid, element_id: Uuid, body: MentionsRequest| {
                let evaluator = evaluator.clone();
                async move {
                    let result = tokio::task::spawn_blocking(move || {
                        evaluator.save_element_mentions(
                            session_id,
                            element_id,
                            body.instructor_mentioned,
                            body.student_mentioned,
                        )
                    })
                    .await;
                    let res = match result {
                        Ok(Ok(())) => reply::with_status(reply::reply(), StatusCode::NO_CONTENT)
                            .into_response(),
                        Ok(Err(e)) => reply::with_status(
                            reply::json(&ApiError::new(format!(
                                "Save failed for element {}: {}",
                                element_id, e
                            ))),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        )
                        .into_response(),
                        Err(_) => internal_error("Mention save did not complete"),
                    };
                    Ok::<_, Rejection>(res)
                }
            },
        )
}

/// PUT /sessions/:id/tasks/:task_id/feedback
pub fn save_task_feedback_route(
    evaluator: Arc<Evaluator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "tasks" / Uuid / "feedback")
        .and(warp::put())
        .and(warp::body::json())
        .and_then(move |session_id: Uuid, task_id: Uuid, body: FeedbackRequest| {
            let evaluator = evaluator.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    evaluator.save_task_feedback(session_id, task_id, body.feedback)
                })
                .await;
                let res = match result {
                    Ok(Ok(())) => {
                        reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response()
                    }
                    Ok(Err(e)) => reply::with_status(
                        reply::json(&ApiError::new(format!(
                            "Save failed for task {}: {}",
                            task_id, e
                        ))),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response(),
                    Err(_) => internal_error("Feedback save did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// POST /sessions/:id/deficiencies
pub fn flag_deficiencies_route(
    evaluator: Arc<Evaluator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "deficiencies")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |session_id: Uuid, body: DeficienciesRequest| {
            let evaluator = evaluator.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    evaluator.flag_deficiencies(session_id, &body.element_ids)
                })
                .await;
                let res = match result {
                    Ok(Ok(())) => {
                        reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response()
                    }
                    Ok(Err(e)) => reply::with_status(
                        reply::json(&ApiError::new(format!(
                            "Deficiency flagging failed: {}",
                            e
                        ))),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response(),
                    Err(_) => internal_error("Deficiency flagging did not complete"),
                };
                Ok::<_, Rejection>(res)
            }
        })
}
