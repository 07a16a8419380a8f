use std::sync::Arc;

use log::{debug, error};
use uuid::Uuid;

use crate::error_handling::types::EvaluationError;
use crate::evaluation::types::{ElementStatus, SavedEvaluation};
use crate::storage::storage_trait::SessionStore;
use crate::storage::types::{ElementEvaluation, PerformanceStatus, TaskFeedback};

/// Valid rubric score range for the score-based path.
const SCORE_MIN: u8 = 1;
const SCORE_MAX: u8 = 4;

/// Applies scoring actions to the session ledger.
///
/// Performance status is a free-transition machine: not-observed,
/// satisfactory and unsatisfactory are mutually exclusive and any state
/// may move to any other, because instructors re-score at will during a
/// session. Repeated saves of the same element are last-write-wins;
/// there is no version token, and two writers to the same element will
/// silently overwrite each other.
pub struct Evaluator {
    sessions: Arc<dyn SessionStore>,
}

impl Evaluator {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    /// Saves a status evaluation for one element and reports the derived
    /// display state back, so callers can patch their local view with
    /// confirmed data.
    ///
    /// `needs_review` is derived from the status and written in the same
    /// upsert; the rubric score is cleared by this path. A storage
    /// failure is returned to the caller for retry, never swallowed.
    pub fn save_element_evaluation(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        performance_status: PerformanceStatus,
        comment: &str,
    ) -> Result<SavedEvaluation, EvaluationError> {
        let evaluation = ElementEvaluation {
            performance_status,
            instructor_comment: comment.to_string(),
            needs_review: performance_status == PerformanceStatus::Unsatisfactory,
        };
        if let Err(e) =
            self.sessions
                .upsert_element_evaluation(session_id, element_id, &evaluation)
        {
            error!(
                "Evaluation save failed for element {} in session {}: {}",
                element_id, session_id, e
            );
            return Err(e.into());
        }
        debug!(
            "Element {} in session {} marked {:?}",
            element_id, session_id, performance_status
        );
        Ok(SavedEvaluation {
            performance_status,
            status: ElementStatus::from_performance(performance_status),
            needs_review: evaluation.needs_review,
        })
    }

    /// The parallel rubric path: records a 1-4 score and leaves the
    /// performance status alone.
    pub fn save_element_score(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        score: u8,
    ) -> Result<(), EvaluationError> {
        if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
            return Err(EvaluationError::InvalidScore(score));
        }
        if let Err(e) = self.sessions.upsert_element_score(session_id, element_id, score) {
            error!(
                "Score save failed for element {} in session {}: {}",
                element_id, session_id, e
            );
            return Err(e.into());
        }
        Ok(())
    }

    pub fn save_element_mentions(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        instructor_mentioned: bool,
        student_mentioned: bool,
    ) -> Result<(), EvaluationError> {
        self.sessions
            .upsert_element_mentions(
                session_id,
                element_id,
                instructor_mentioned,
                student_mentioned,
            )
            .map_err(EvaluationError::from)
    }

    /// Bulk-flags elements that were weak areas on the written test.
    /// Orthogonal to performance status; used for highlighting only.
    pub fn flag_deficiencies(
        &self,
        session_id: Uuid,
        element_ids: &[Uuid],
    ) -> Result<(), EvaluationError> {
        if element_ids.is_empty() {
            return Ok(());
        }
        self.sessions
            .set_a2_deficiencies(session_id, element_ids)
            .map_err(EvaluationError::from)
    }

    /// Records the instructor's task-level feedback tag, the input to
    /// readiness classification.
    pub fn save_task_feedback(
        &self,
        session_id: Uuid,
        task_id: Uuid,
        feedback: TaskFeedback,
    ) -> Result<(), EvaluationError> {
        self.sessions
            .save_task_feedback(session_id, task_id, feedback)
            .map_err(EvaluationError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::error_handling::types::StorageError;
    use crate::storage::memory_storage::MemoryStorage;
    use crate::storage::types::{
        NewSession, Session, SessionElementRow, SessionFilter, SessionUpdate,
    };

    fn session_fixture() -> (Arc<MemoryStorage>, Uuid) {
        let storage = Arc::new(MemoryStorage::new());
        let session_id = storage
            .create_session(&NewSession {
                instructor_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                template_id: Uuid::new_v4(),
                scenario_id: None,
                session_name: "Mock oral".into(),
                notes: String::new(),
            })
            .unwrap();
        (storage, session_id)
    }

    #[test]
    fn test_save_reports_derived_status() {
        let (storage, session_id) = session_fixture();
        let evaluator = Evaluator::new(storage.clone());
        let element_id = Uuid::new_v4();

        let saved = evaluator
            .save_element_evaluation(
                session_id,
                element_id,
                PerformanceStatus::Satisfactory,
                "clean answer",
            )
            .unwrap();
        assert_eq!(saved.status, ElementStatus::Completed);
        assert!(!saved.needs_review);

        let saved = evaluator
            .save_element_evaluation(
                session_id,
                element_id,
                PerformanceStatus::Unsatisfactory,
                "missed weather minimums",
            )
            .unwrap();
        assert_eq!(saved.status, ElementStatus::Issue);
        assert!(saved.needs_review);

        let saved = evaluator
            .save_element_evaluation(session_id, element_id, PerformanceStatus::NotObserved, "")
            .unwrap();
        assert_eq!(saved.status, ElementStatus::InProgress);
        assert!(!saved.needs_review);
    }

    #[test]
    fn test_derivation_consistent_after_any_sequence() {
        let (storage, session_id) = session_fixture();
        let evaluator = Evaluator::new(storage.clone());
        let element_id = Uuid::new_v4();

        let sequence = [
            PerformanceStatus::Unsatisfactory,
            PerformanceStatus::Satisfactory,
            PerformanceStatus::NotObserved,
            PerformanceStatus::Satisfactory,
            PerformanceStatus::Unsatisfactory,
        ];
        for status in sequence {
            let saved = evaluator
                .save_element_evaluation(session_id, element_id, status, "")
                .unwrap();
            assert_eq!(saved.status, ElementStatus::from_performance(status));

            let rows = storage.get_session_elements(session_id, None).unwrap();
            let row = rows.get(&element_id).unwrap();
            assert_eq!(row.performance_status, status);
            assert_eq!(
                row.needs_review,
                status == PerformanceStatus::Unsatisfactory
            );
        }
    }

    #[test]
    fn test_repeated_identical_saves_keep_one_row() {
        let (storage, session_id) = session_fixture();
        let evaluator = Evaluator::new(storage.clone());
        let element_id = Uuid::new_v4();

        for _ in 0..2 {
            evaluator
                .save_element_evaluation(
                    session_id,
                    element_id,
                    PerformanceStatus::Satisfactory,
                    "same comment",
                )
                .unwrap();
        }
        let rows = storage.get_session_elements(session_id, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get(&element_id).unwrap().instructor_comment, "same comment");
    }

    #[test]
    fn test_score_path_is_orthogonal_to_status() {
        let (storage, session_id) = session_fixture();
        let evaluator = Evaluator::new(storage.clone());
        let element_id = Uuid::new_v4();

        evaluator
            .save_element_evaluation(
                session_id,
                element_id,
                PerformanceStatus::Unsatisfactory,
                "",
            )
            .unwrap();
        evaluator
            .save_element_score(session_id, element_id, 2)
            .unwrap();

        let rows = storage.get_session_elements(session_id, None).unwrap();
        let row = rows.get(&element_id).unwrap();
        assert_eq!(row.performance_status, PerformanceStatus::Unsatisfactory);
        assert_eq!(row.score, Some(2));

        // Re-scoring through the status path clears the rubric score.
        evaluator
            .save_element_evaluation(session_id, element_id, PerformanceStatus::Satisfactory, "")
            .unwrap();
        let rows = storage.get_session_elements(session_id, None).unwrap();
        assert_eq!(rows.get(&element_id).unwrap().score, None);
    }

    #[test]
    fn test_score_outside_rubric_is_rejected() {
        let (storage, session_id) = session_fixture();
        let evaluator = Evaluator::new(storage.clone());
        let element_id = Uuid::new_v4();

        assert!(matches!(
            evaluator.save_element_score(session_id, element_id, 0),
            Err(EvaluationError::InvalidScore(0))
        ));
        assert!(matches!(
            evaluator.save_element_score(session_id, element_id, 5),
            Err(EvaluationError::InvalidScore(5))
        ));
        assert!(storage
            .get_session_elements(session_id, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_deficiency_flags_do_not_disturb_status() {
        let (storage, session_id) = session_fixture();
        let evaluator = Evaluator::new(storage.clone());
        let element_id = Uuid::new_v4();

        evaluator
            .save_element_evaluation(session_id, element_id, PerformanceStatus::Satisfactory, "")
            .unwrap();
        evaluator
            .flag_deficiencies(session_id, &[element_id])
            .unwrap();

        let rows = storage.get_session_elements(session_id, None).unwrap();
        let row = rows.get(&element_id).unwrap();
        assert!(row.a2_deficiency);
        assert_eq!(row.performance_status, PerformanceStatus::Satisfactory);
    }

    /// SessionStore wrapper whose ledger writes always fail.
    struct BrokenLedger {
        inner: Arc<MemoryStorage>,
    }

    impl SessionStore for BrokenLedger {
        fn create_session(&self, session: &NewSession) -> Result<Uuid, StorageError> {
            self.inner.create_session(session)
        }

        fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StorageError> {
            self.inner.get_session(session_id)
        }

        fn get_sessions(
            &self,
            filter: Option<SessionFilter>,
        ) -> Result<Vec<Session>, StorageError> {
            self.inner.get_sessions(filter)
        }

        fn update_session(
            &self,
            session_id: Uuid,
            update: &SessionUpdate,
        ) -> Result<(), StorageError> {
            self.inner.update_session(session_id, update)
        }

        fn get_session_elements(
            &self,
            session_id: Uuid,
            element_ids: Option<&[Uuid]>,
        ) -> Result<HashMap<Uuid, SessionElementRow>, StorageError> {
            self.inner.get_session_elements(session_id, element_ids)
        }

        fn upsert_element_evaluation(
            &self,
            _session_id: Uuid,
            _element_id: Uuid,
            _evaluation: &ElementEvaluation,
        ) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn upsert_element_score(
            &self,
            _session_id: Uuid,
            _element_id: Uuid,
            _score: u8,
        ) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn upsert_element_mentions(
            &self,
            _session_id: Uuid,
            _element_id: Uuid,
            _instructor_mentioned: bool,
            _student_mentioned: bool,
        ) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn bulk_insert_session_elements(
            &self,
            _rows: &[SessionElementRow],
        ) -> Result<usize, StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn set_a2_deficiencies(
            &self,
            _session_id: Uuid,
            _element_ids: &[Uuid],
        ) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn save_task_feedback(
            &self,
            _session_id: Uuid,
            _task_id: Uuid,
            _feedback: TaskFeedback,
        ) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn get_task_feedback(
            &self,
            session_id: Uuid,
        ) -> Result<HashMap<Uuid, TaskFeedback>, StorageError> {
            self.inner.get_task_feedback(session_id)
        }
    }

    #[test]
    fn test_failed_write_surfaces_and_leaves_prior_state() {
        let (storage, session_id) = session_fixture();
        let element_id = Uuid::new_v4();

        // Seed a known state through the working store first.
        Evaluator::new(storage.clone())
            .save_element_evaluation(session_id, element_id, PerformanceStatus::Satisfactory, "ok")
            .unwrap();

        let broken = Evaluator::new(Arc::new(BrokenLedger {
            inner: storage.clone(),
        }));
        let result = broken.save_element_evaluation(
            session_id,
            element_id,
            PerformanceStatus::Unsatisfactory,
            "should not stick",
        );
        assert!(matches!(
            result,
            Err(EvaluationError::StorageError(StorageError::WriteFailed))
        ));

        // No partial write is visible.
        let rows = storage.get_session_elements(session_id, None).unwrap();
        let row = rows.get(&element_id).unwrap();
        assert_eq!(row.performance_status, PerformanceStatus::Satisfactory);
        assert_eq!(row.instructor_comment, "ok");
    }
}
