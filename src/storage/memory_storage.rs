use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use log::debug;
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::{SessionStore, TemplateStore};
use crate::storage::types::{
    Area, Element, ElementEvaluation, ElementType, NewSession, PerformanceStatus, Session,
    SessionElementRow, SessionFilter, SessionUpdate, Task, TaskFeedback, Template,
};

#[derive(Default)]
struct MemoryInner {
    templates: HashMap<Uuid, Template>,
    areas: Vec<Area>,
    tasks: Vec<Task>,
    elements: Vec<Element>,
    sessions: HashMap<Uuid, Session>,
    session_elements: HashMap<(Uuid, Uuid), SessionElementRow>,
    task_feedback: HashMap<(Uuid, Uuid), TaskFeedback>,
}

/// In-memory backend. Used by tests, which want fresh state per case,
/// and by the `memory` storage mode for running without a database file.
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::ReadFailed)
    }

    pub fn insert_template(&self, template: Template) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.templates.insert(template.id, template);
        Ok(())
    }

    pub fn insert_area(&self, area: Area) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.areas.push(area);
        Ok(())
    }

    pub fn insert_task(&self, task: Task) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.tasks.push(task);
        Ok(())
    }

    pub fn insert_element(&self, element: Element) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.elements.push(element);
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore for MemoryStorage {
    fn get_template(&self, template_id: Uuid) -> Result<Option<Template>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.templates.get(&template_id).cloned())
    }

    fn get_areas(&self, template_id: Uuid) -> Result<Vec<Area>, StorageError> {
        let inner = self.lock()?;
        let mut areas: Vec<Area> = inner
            .areas
            .iter()
            .filter(|a| a.template_id == template_id)
            .cloned()
            .collect();
        areas.sort_by_key(|a| a.order_number);
        Ok(areas)
    }

    fn get_tasks_by_area(&self, area_id: Uuid) -> Result<Vec<Task>, StorageError> {
        let inner = self.lock()?;
        let mut tasks: Vec<Task> = inner
            .tasks
            .iter()
            .filter(|t| t.area_id == area_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.order_letter.cmp(&b.order_letter));
        Ok(tasks)
    }

    fn get_tasks_for_areas(&self, area_ids: &[Uuid]) -> Result<Vec<Task>, StorageError> {
        let mut out = Vec::new();
        for area_id in area_ids {
            out.extend(self.get_tasks_by_area(*area_id)?);
        }
        Ok(out)
    }

    fn get_elements_by_task(
        &self,
        task_id: Uuid,
        element_type: Option<ElementType>,
    ) -> Result<Vec<Element>, StorageError> {
        let inner = self.lock()?;
        let mut elements: Vec<Element> = inner
            .elements
            .iter()
            .filter(|e| e.task_id == task_id)
            .filter(|e| element_type.map(|t| e.element_type == t).unwrap_or(true))
            .cloned()
            .collect();
        elements.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(elements)
    }

    fn get_elements_for_tasks(&self, task_ids: &[Uuid]) -> Result<Vec<Element>, StorageError> {
        let mut out = Vec::new();
        for task_id in task_ids {
            out.extend(self.get_elements_by_task(*task_id, None)?);
        }
        Ok(out)
    }
}

impl SessionStore for MemoryStorage {
    fn create_session(&self, session: &NewSession) -> Result<Uuid, StorageError> {
        let mut inner = self.lock()?;
        let id = Uuid::new_v4();
        inner.sessions.insert(
            id,
            Session {
                id,
                instructor_id: session.instructor_id,
                student_id: session.student_id,
                template_id: session.template_id,
                scenario_id: session.scenario_id,
                session_name: session.session_name.clone(),
                notes: session.notes.clone(),
                date_started: Utc::now(),
                date_completed: None,
            },
        );
        debug!("Created session {}", id);
        Ok(id)
    }

    fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.sessions.get(&session_id).cloned())
    }

    fn get_sessions(&self, filter: Option<SessionFilter>) -> Result<Vec<Session>, StorageError> {
        let inner = self.lock()?;
        let mut sessions: Vec<Session> = inner.sessions.values().cloned().collect();
        if let Some(f) = filter {
            sessions.retain(|s| {
                if let Some(id) = f.instructor_id {
                    if s.instructor_id != id {
                        return false;
                    }
                }
                if let Some(id) = f.student_id {
                    if s.student_id != id {
                        return false;
                    }
                }
                if let Some(id) = f.template_id {
                    if s.template_id != id {
                        return false;
                    }
                }
                if let Some(completed) = f.completed {
                    if s.date_completed.is_some() != completed {
                        return false;
                    }
                }
                true
            });
        }
        sessions.sort_by_key(|s| s.date_started);
        Ok(sessions)
    }

    fn update_session(
        &self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or(StorageError::NotFound)?;
        if let Some(ref name) = update.session_name {
            session.session_name = name.clone();
        }
        if let Some(ref notes) = update.notes {
            session.notes = notes.clone();
        }
        if let Some(completed) = update.date_completed {
            session.date_completed = Some(completed);
        }
        Ok(())
    }

    fn get_session_elements(
        &self,
        session_id: Uuid,
        element_ids: Option<&[Uuid]>,
    ) -> Result<HashMap<Uuid, SessionElementRow>, StorageError> {
        let inner = self.lock()?;
        let mut out = HashMap::new();
        for ((sid, eid), row) in inner.session_elements.iter() {
            if *sid != session_id {
                continue;
            }
            if let Some(ids) = element_ids {
                if !ids.contains(eid) {
                    continue;
                }
            }
            out.insert(*eid, row.clone());
        }
        Ok(out)
    }

    fn upsert_element_evaluation(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        evaluation: &ElementEvaluation,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.sessions.contains_key(&session_id) {
            return Err(StorageError::WriteFailed);
        }
        let row = inner
            .session_elements
            .entry((session_id, element_id))
            .or_insert_with(|| SessionElementRow::prepopulated(session_id, element_id));
        row.performance_status = evaluation.performance_status;
        row.instructor_comment = evaluation.instructor_comment.clone();
        row.needs_review = evaluation.needs_review;
        row.score = None;
        Ok(())
    }

    fn upsert_element_score(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        score: u8,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.sessions.contains_key(&session_id) {
            return Err(StorageError::WriteFailed);
        }
        let row = inner
            .session_elements
            .entry((session_id, element_id))
            .or_insert_with(|| SessionElementRow::prepopulated(session_id, element_id));
        row.score = Some(score);
        Ok(())
    }

    fn upsert_element_mentions(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        instructor_mentioned: bool,
        student_mentioned: bool,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.sessions.contains_key(&session_id) {
            return Err(StorageError::WriteFailed);
        }
        let row = inner
            .session_elements
            .entry((session_id, element_id))
            .or_insert_with(|| SessionElementRow::prepopulated(session_id, element_id));
        row.instructor_mentioned = instructor_mentioned;
        row.student_mentioned = student_mentioned;
        Ok(())
    }

    fn bulk_insert_session_elements(
        &self,
        rows: &[SessionElementRow],
    ) -> Result<usize, StorageError> {
        let mut inner = self.lock()?;
        let mut inserted = 0usize;
        for row in rows {
            if !inner.sessions.contains_key(&row.session_id) {
                return Err(StorageError::WriteFailed);
            }
            let key = (row.session_id, row.element_id);
            if let std::collections::hash_map::Entry::Vacant(entry) =
                inner.session_elements.entry(key)
            {
                entry.insert(row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn set_a2_deficiencies(
        &self,
        session_id: Uuid,
        element_ids: &[Uuid],
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.sessions.contains_key(&session_id) {
            return Err(StorageError::WriteFailed);
        }
        for element_id in element_ids {
            let row = inner
                .session_elements
                .entry((session_id, *element_id))
                .or_insert_with(|| SessionElementRow::prepopulated(session_id, *element_id));
            row.a2_deficiency = true;
        }
        Ok(())
    }

    fn save_task_feedback(
        &self,
        session_id: Uuid,
        task_id: Uuid,
        feedback: TaskFeedback,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.sessions.contains_key(&session_id) {
            return Err(StorageError::WriteFailed);
        }
        inner.task_feedback.insert((session_id, task_id), feedback);
        Ok(())
    }

    fn get_task_feedback(
        &self,
        session_id: Uuid,
    ) -> Result<HashMap<Uuid, TaskFeedback>, StorageError> {
        let inner = self.lock()?;
        let mut out = HashMap::new();
        for ((sid, tid), feedback) in inner.task_feedback.iter() {
            if *sid == session_id {
                out.insert(*tid, *feedback);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_template(storage: &MemoryStorage) -> (Uuid, Uuid, Vec<Uuid>) {
        let template_id = Uuid::new_v4();
        storage
            .insert_template(Template {
                id: template_id,
                name: "Private Pilot ACS".into(),
                description: "ASEL mock oral".into(),
            })
            .unwrap();
        let area_id = Uuid::new_v4();
        storage
            .insert_area(Area {
                id: area_id,
                template_id,
                order_number: 1,
                title: "Preflight Preparation".into(),
                description: String::new(),
            })
            .unwrap();
        let task_id = Uuid::new_v4();
        storage
            .insert_task(Task {
                id: task_id,
                area_id,
                order_letter: "A".into(),
                title: "Pilot Qualifications".into(),
                objective: String::new(),
                is_required: true,
            })
            .unwrap();
        let mut element_ids = Vec::new();
        for code in ["PA.I.A.K1", "PA.I.A.K2"] {
            let id = Uuid::new_v4();
            storage
                .insert_element(Element {
                    id,
                    task_id,
                    code: code.into(),
                    element_type: ElementType::Knowledge,
                    label: code.into(),
                    description: String::new(),
                    performance_criteria: vec![],
                    common_errors: vec![],
                    references: vec!["14 CFR 61".into()],
                })
                .unwrap();
            element_ids.push(id);
        }
        (template_id, task_id, element_ids)
    }

    fn new_session(template_id: Uuid) -> NewSession {
        NewSession {
            instructor_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            template_id,
            scenario_id: None,
            session_name: "Stage check prep".into(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_hierarchy_reads_are_ordered() {
        let storage = MemoryStorage::new();
        let (template_id, task_id, _) = seed_template(&storage);

        let areas = storage.get_areas(template_id).unwrap();
        assert_eq!(areas.len(), 1);
        let tasks = storage.get_tasks_by_area(areas[0].id).unwrap();
        assert_eq!(tasks.len(), 1);
        let elements = storage.get_elements_by_task(task_id, None).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].code, "PA.I.A.K1");
        assert_eq!(elements[1].code, "PA.I.A.K2");

        let knowledge = storage
            .get_elements_by_task(task_id, Some(ElementType::Knowledge))
            .unwrap();
        assert_eq!(knowledge.len(), 2);
        let skills = storage
            .get_elements_by_task(task_id, Some(ElementType::Skill))
            .unwrap();
        assert!(skills.is_empty());
    }

    #[test]
    fn test_bulk_insert_is_idempotent() {
        let storage = MemoryStorage::new();
        let (template_id, _, element_ids) = seed_template(&storage);
        let session_id = storage.create_session(&new_session(template_id)).unwrap();

        let rows: Vec<SessionElementRow> = element_ids
            .iter()
            .map(|id| SessionElementRow::prepopulated(session_id, *id))
            .collect();
        assert_eq!(storage.bulk_insert_session_elements(&rows).unwrap(), 2);
        assert_eq!(storage.bulk_insert_session_elements(&rows).unwrap(), 0);
        assert_eq!(
            storage.get_session_elements(session_id, None).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_evaluation_upsert_clears_score() {
        let storage = MemoryStorage::new();
        let (template_id, _, element_ids) = seed_template(&storage);
        let session_id = storage.create_session(&new_session(template_id)).unwrap();
        let element_id = element_ids[0];

        storage
            .upsert_element_score(session_id, element_id, 3)
            .unwrap();
        storage
            .upsert_element_evaluation(
                session_id,
                element_id,
                &ElementEvaluation {
                    performance_status: PerformanceStatus::Satisfactory,
                    instructor_comment: "solid".into(),
                    needs_review: false,
                },
            )
            .unwrap();

        let rows = storage.get_session_elements(session_id, None).unwrap();
        let row = rows.get(&element_id).unwrap();
        assert_eq!(row.performance_status, PerformanceStatus::Satisfactory);
        assert_eq!(row.instructor_comment, "solid");
        assert_eq!(row.score, None);
    }

    #[test]
    fn test_session_filter_and_update() {
        let storage = MemoryStorage::new();
        let (template_id, _, _) = seed_template(&storage);
        let payload = new_session(template_id);
        let session_id = storage.create_session(&payload).unwrap();

        let open = storage
            .get_sessions(Some(SessionFilter {
                completed: Some(false),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(open.len(), 1);

        storage
            .update_session(
                session_id,
                &SessionUpdate {
                    date_completed: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .unwrap();
        let open = storage
            .get_sessions(Some(SessionFilter {
                completed: Some(false),
                ..Default::default()
            }))
            .unwrap();
        assert!(open.is_empty());

        let missing = storage.update_session(Uuid::new_v4(), &SessionUpdate::default());
        assert!(matches!(missing, Err(StorageError::NotFound)));
    }

    #[test]
    fn test_ledger_rows_do_not_leak_across_sessions() {
        let storage = MemoryStorage::new();
        let (template_id, _, element_ids) = seed_template(&storage);
        let first = storage.create_session(&new_session(template_id)).unwrap();
        let second = storage.create_session(&new_session(template_id)).unwrap();

        storage
            .upsert_element_evaluation(
                first,
                element_ids[0],
                &ElementEvaluation {
                    performance_status: PerformanceStatus::Unsatisfactory,
                    instructor_comment: String::new(),
                    needs_review: true,
                },
            )
            .unwrap();

        assert_eq!(storage.get_session_elements(first, None).unwrap().len(), 1);
        assert!(storage.get_session_elements(second, None).unwrap().is_empty());
    }

    #[test]
    fn test_task_feedback_roundtrip() {
        let storage = MemoryStorage::new();
        let (template_id, task_id, _) = seed_template(&storage);
        let session_id = storage.create_session(&new_session(template_id)).unwrap();

        storage
            .save_task_feedback(session_id, task_id, TaskFeedback::Proficient)
            .unwrap();
        storage
            .save_task_feedback(session_id, task_id, TaskFeedback::Weak)
            .unwrap();

        let feedback = storage.get_task_feedback(session_id).unwrap();
        assert_eq!(feedback.get(&task_id), Some(&TaskFeedback::Weak));
    }
}
