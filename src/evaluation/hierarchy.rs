use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use uuid::Uuid;

use crate::error_handling::types::HierarchyError;
use crate::evaluation::cache::{TemplateCache, TemplateRecords};
use crate::evaluation::types::{AreaNode, MergedElement, TaskNode};
use crate::storage::storage_trait::{SessionStore, TemplateStore};
use crate::storage::types::{Area, Element, SessionElementRow, Task};

/// Builds the session-scoped view of a template: the immutable
/// Area -> Task -> Element hierarchy left-joined with the session's
/// ledger rows.
pub struct HierarchyBuilder {
    templates: Arc<dyn TemplateStore>,
    sessions: Arc<dyn SessionStore>,
    cache: Arc<TemplateCache>,
}

impl HierarchyBuilder {
    pub fn new(templates: Arc<dyn TemplateStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self::with_cache(templates, sessions, Arc::new(TemplateCache::new()))
    }

    pub fn with_cache(
        templates: Arc<dyn TemplateStore>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<TemplateCache>,
    ) -> Self {
        Self {
            templates,
            sessions,
            cache,
        }
    }

    /// Merged hierarchy for one session.
    ///
    /// A missing template or session is an error; missing children are
    /// not. Failed task or element fetches degrade to empty child lists
    /// so navigation stays usable, and are logged for the operator.
    pub fn build_session_hierarchy(
        &self,
        template_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<AreaNode>, HierarchyError> {
        if self.templates.get_template(template_id)?.is_none() {
            return Err(HierarchyError::TemplateNotFound);
        }
        if self.sessions.get_session(session_id)?.is_none() {
            return Err(HierarchyError::SessionNotFound);
        }

        if let Some(records) = self.cache.get(template_id) {
            let ledger = self.load_ledger(session_id);
            return Ok(assemble(
                &records.areas,
                &records.tasks,
                &records.elements,
                &ledger,
            ));
        }

        let areas = self.templates.get_areas(template_id)?;
        if areas.is_empty() {
            return Ok(Vec::new());
        }
        let area_ids: Vec<Uuid> = areas.iter().map(|a| a.id).collect();

        let tasks = match self.templates.get_tasks_for_areas(&area_ids) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(
                    "Task fetch failed for template {}: {}; returning areas without tasks",
                    template_id, e
                );
                return Ok(assemble(&areas, &[], &[], &HashMap::new()));
            }
        };
        let task_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();

        let elements = match self.templates.get_elements_for_tasks(&task_ids) {
            Ok(elements) => elements,
            Err(e) => {
                warn!(
                    "Element fetch failed for template {}: {}; returning tasks without elements",
                    template_id, e
                );
                return Ok(assemble(&areas, &tasks, &[], &HashMap::new()));
            }
        };

        let records = self.cache.put(
            template_id,
            TemplateRecords {
                areas,
                tasks,
                elements,
            },
        );
        let ledger = self.load_ledger(session_id);
        Ok(assemble(
            &records.areas,
            &records.tasks,
            &records.elements,
            &ledger,
        ))
    }

    /// Seeds a default ledger row for every element under the template.
    /// Safe to repeat: existing rows are never overwritten, and the
    /// return value counts only newly inserted rows.
    pub fn prepopulate_session_elements(
        &self,
        session_id: Uuid,
        template_id: Uuid,
    ) -> Result<usize, HierarchyError> {
        let records = self.template_records(template_id)?;
        let rows: Vec<SessionElementRow> = records
            .elements
            .iter()
            .map(|e| SessionElementRow::prepopulated(session_id, e.id))
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = self.sessions.bulk_insert_session_elements(&rows)?;
        debug!(
            "Prepopulated {} of {} ledger rows for session {}",
            inserted,
            rows.len(),
            session_id
        );
        Ok(inserted)
    }

    /// Full template record set, from the cache when possible. Unlike
    /// the session build, fetch failures here propagate: a partially
    /// seeded ledger is worse than a reported failure.
    fn template_records(&self, template_id: Uuid) -> Result<Arc<TemplateRecords>, HierarchyError> {
        if let Some(records) = self.cache.get(template_id) {
            return Ok(records);
        }
        if self.templates.get_template(template_id)?.is_none() {
            return Err(HierarchyError::TemplateNotFound);
        }
        let areas = self.templates.get_areas(template_id)?;
        let area_ids: Vec<Uuid> = areas.iter().map(|a| a.id).collect();
        let tasks = self.templates.get_tasks_for_areas(&area_ids)?;
        let task_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let elements = self.templates.get_elements_for_tasks(&task_ids)?;
        Ok(self.cache.put(
            template_id,
            TemplateRecords {
                areas,
                tasks,
                elements,
            },
        ))
    }

    fn load_ledger(&self, session_id: Uuid) -> HashMap<Uuid, SessionElementRow> {
        match self.sessions.get_session_elements(session_id, None) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "Ledger read failed for session {}: {}; treating all elements as unscored",
                    session_id, e
                );
                HashMap::new()
            }
        }
    }
}

/// Groups elements under tasks and tasks under areas, preserving the
/// fetch ordering. The ledger map is already session-scoped.
fn assemble(
    areas: &[Area],
    tasks: &[Task],
    elements: &[Element],
    ledger: &HashMap<Uuid, SessionElementRow>,
) -> Vec<AreaNode> {
    let mut elements_by_task: HashMap<Uuid, Vec<MergedElement>> = HashMap::new();
    for element in elements {
        let merged = MergedElement::from_parts(element.clone(), ledger.get(&element.id));
        elements_by_task
            .entry(element.task_id)
            .or_default()
            .push(merged);
    }

    let mut tasks_by_area: HashMap<Uuid, Vec<TaskNode>> = HashMap::new();
    for task in tasks {
        let node = TaskNode {
            id: task.id,
            area_id: task.area_id,
            order_letter: task.order_letter.clone(),
            title: task.title.clone(),
            objective: task.objective.clone(),
            is_required: task.is_required,
            elements: elements_by_task.remove(&task.id).unwrap_or_default(),
        };
        tasks_by_area.entry(task.area_id).or_default().push(node);
    }

    let mut out = Vec::with_capacity(areas.len());
    for area in areas {
        out.push(AreaNode {
            id: area.id,
            template_id: area.template_id,
            order_number: area.order_number,
            title: area.title.clone(),
            description: area.description.clone(),
            tasks: tasks_by_area.remove(&area.id).unwrap_or_default(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::StorageError;
    use crate::evaluation::types::ElementStatus;
    use crate::storage::memory_storage::MemoryStorage;
    use crate::storage::types::{
        ElementEvaluation, ElementType, NewSession, PerformanceStatus, Template,
    };

    struct Fixture {
        storage: Arc<MemoryStorage>,
        template_id: Uuid,
        element_ids: Vec<Uuid>,
    }

    /// Two areas, one task each, two elements in the first task and one
    /// in the second.
    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let template_id = Uuid::new_v4();
        storage
            .insert_template(Template {
                id: template_id,
                name: "Private Pilot ACS".into(),
                description: String::new(),
            })
            .unwrap();

        let mut element_ids = Vec::new();
        for (order, (area_title, codes)) in [
            ("Preflight Preparation", vec!["PA.I.A.K1", "PA.I.A.K2"]),
            ("Preflight Procedures", vec!["PA.II.A.R1"]),
        ]
        .into_iter()
        .enumerate()
        {
            let area_id = Uuid::new_v4();
            storage
                .insert_area(Area {
                    id: area_id,
                    template_id,
                    order_number: order as i32 + 1,
                    title: area_title.into(),
                    description: String::new(),
                })
                .unwrap();
            let task_id = Uuid::new_v4();
            storage
                .insert_task(Task {
                    id: task_id,
                    area_id,
                    order_letter: "A".into(),
                    title: format!("{} task", area_title),
                    objective: String::new(),
                    is_required: true,
                })
                .unwrap();
            for code in codes {
                let id = Uuid::new_v4();
                storage
                    .insert_element(Element {
                        id,
                        task_id,
                        code: code.into(),
                        element_type: if code.contains(".R") {
                            ElementType::Risk
                        } else {
                            ElementType::Knowledge
                        },
                        label: code.into(),
                        description: String::new(),
                        performance_criteria: vec![],
                        common_errors: vec![],
                        references: vec![],
                    })
                    .unwrap();
                element_ids.push(id);
            }
        }
        Fixture {
            storage,
            template_id,
            element_ids,
        }
    }

    fn start_session(fixture: &Fixture) -> Uuid {
        fixture
            .storage
            .create_session(&NewSession {
                instructor_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                template_id: fixture.template_id,
                scenario_id: None,
                session_name: "Mock oral".into(),
                notes: String::new(),
            })
            .unwrap()
    }

    fn builder(fixture: &Fixture) -> HierarchyBuilder {
        HierarchyBuilder::new(fixture.storage.clone(), fixture.storage.clone())
    }

    fn flattened_codes(areas: &[AreaNode]) -> Vec<String> {
        areas
            .iter()
            .flat_map(|a| a.tasks.iter())
            .flat_map(|t| t.elements.iter())
            .map(|e| e.code.clone())
            .collect()
    }

    #[test]
    fn test_missing_roots_are_errors() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let builder = builder(&fixture);

        let missing_template = builder.build_session_hierarchy(Uuid::new_v4(), session_id);
        assert!(matches!(
            missing_template,
            Err(HierarchyError::TemplateNotFound)
        ));
        let missing_session =
            builder.build_session_hierarchy(fixture.template_id, Uuid::new_v4());
        assert!(matches!(
            missing_session,
            Err(HierarchyError::SessionNotFound)
        ));
    }

    #[test]
    fn test_template_without_areas_builds_empty() {
        let storage = Arc::new(MemoryStorage::new());
        let template_id = Uuid::new_v4();
        storage
            .insert_template(Template {
                id: template_id,
                name: "Empty".into(),
                description: String::new(),
            })
            .unwrap();
        let session_id = storage
            .create_session(&NewSession {
                instructor_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                template_id,
                scenario_id: None,
                session_name: "Mock oral".into(),
                notes: String::new(),
            })
            .unwrap();

        let builder = HierarchyBuilder::new(storage.clone(), storage.clone());
        let areas = builder
            .build_session_hierarchy(template_id, session_id)
            .unwrap();
        assert!(areas.is_empty());
    }

    #[test]
    fn test_unscored_elements_default_to_in_progress() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let builder = builder(&fixture);

        let areas = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        let statuses: Vec<ElementStatus> = areas
            .iter()
            .flat_map(|a| a.tasks.iter())
            .flat_map(|t| t.elements.iter())
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|s| *s == ElementStatus::InProgress));
    }

    #[test]
    fn test_merge_reflects_ledger_state() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let builder = builder(&fixture);

        fixture
            .storage
            .upsert_element_evaluation(
                session_id,
                fixture.element_ids[0],
                &ElementEvaluation {
                    performance_status: PerformanceStatus::Satisfactory,
                    instructor_comment: "nailed it".into(),
                    needs_review: false,
                },
            )
            .unwrap();
        fixture
            .storage
            .upsert_element_evaluation(
                session_id,
                fixture.element_ids[1],
                &ElementEvaluation {
                    performance_status: PerformanceStatus::Unsatisfactory,
                    instructor_comment: String::new(),
                    needs_review: true,
                },
            )
            .unwrap();

        let areas = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        let elements: Vec<&MergedElement> = areas
            .iter()
            .flat_map(|a| a.tasks.iter())
            .flat_map(|t| t.elements.iter())
            .collect();
        assert_eq!(elements[0].status, ElementStatus::Completed);
        assert_eq!(elements[0].instructor_comment, "nailed it");
        assert_eq!(elements[1].status, ElementStatus::Issue);
        assert!(elements[1].needs_review);
        assert_eq!(elements[2].status, ElementStatus::InProgress);
    }

    #[test]
    fn test_no_cross_session_leakage() {
        let fixture = fixture();
        let scored = start_session(&fixture);
        let fresh = start_session(&fixture);
        let builder = builder(&fixture);

        fixture
            .storage
            .upsert_element_evaluation(
                scored,
                fixture.element_ids[0],
                &ElementEvaluation {
                    performance_status: PerformanceStatus::Unsatisfactory,
                    instructor_comment: String::new(),
                    needs_review: true,
                },
            )
            .unwrap();

        let areas = builder
            .build_session_hierarchy(fixture.template_id, fresh)
            .unwrap();
        let statuses: Vec<ElementStatus> = areas
            .iter()
            .flat_map(|a| a.tasks.iter())
            .flat_map(|t| t.elements.iter())
            .map(|e| e.status)
            .collect();
        assert!(statuses.iter().all(|s| *s == ElementStatus::InProgress));
    }

    #[test]
    fn test_navigation_order_is_stable_across_builds() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let builder = builder(&fixture);

        let first = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        let second = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        assert_eq!(flattened_codes(&first), flattened_codes(&second));
        assert_eq!(
            flattened_codes(&first),
            vec!["PA.I.A.K1", "PA.I.A.K2", "PA.II.A.R1"]
        );
    }

    #[test]
    fn test_prepopulation_is_idempotent() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let builder = builder(&fixture);

        let inserted = builder
            .prepopulate_session_elements(session_id, fixture.template_id)
            .unwrap();
        assert_eq!(inserted, 3);
        let repeated = builder
            .prepopulate_session_elements(session_id, fixture.template_id)
            .unwrap();
        assert_eq!(repeated, 0);
    }

    #[test]
    fn test_cache_serves_template_until_invalidated() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let cache = Arc::new(TemplateCache::new());
        let builder = HierarchyBuilder::with_cache(
            fixture.storage.clone(),
            fixture.storage.clone(),
            cache.clone(),
        );

        let first = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        assert_eq!(flattened_codes(&first).len(), 3);

        // A late addition to the template is invisible until the cache
        // entry is dropped.
        let task_id = first[0].tasks[0].id;
        fixture
            .storage
            .insert_element(Element {
                id: Uuid::new_v4(),
                task_id,
                code: "PA.I.A.K3".into(),
                element_type: ElementType::Knowledge,
                label: "late addition".into(),
                description: String::new(),
                performance_criteria: vec![],
                common_errors: vec![],
                references: vec![],
            })
            .unwrap();
        let cached = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        assert_eq!(flattened_codes(&cached).len(), 3);

        cache.invalidate(fixture.template_id);
        let reloaded = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        assert_eq!(flattened_codes(&reloaded).len(), 4);
    }

    /// TemplateStore wrapper that fails selected fetches, for exercising
    /// the degraded read paths.
    struct FlakyTemplates {
        inner: Arc<MemoryStorage>,
        fail_tasks: bool,
        fail_elements: bool,
    }

    impl TemplateStore for FlakyTemplates {
        fn get_template(&self, template_id: Uuid) -> Result<Option<Template>, StorageError> {
            self.inner.get_template(template_id)
        }

        fn get_areas(&self, template_id: Uuid) -> Result<Vec<Area>, StorageError> {
            self.inner.get_areas(template_id)
        }

        fn get_tasks_by_area(&self, area_id: Uuid) -> Result<Vec<Task>, StorageError> {
            if self.fail_tasks {
                return Err(StorageError::ReadFailed);
            }
            self.inner.get_tasks_by_area(area_id)
        }

        fn get_tasks_for_areas(&self, area_ids: &[Uuid]) -> Result<Vec<Task>, StorageError> {
            if self.fail_tasks {
                return Err(StorageError::ReadFailed);
            }
            self.inner.get_tasks_for_areas(area_ids)
        }

        fn get_elements_by_task(
            &self,
            task_id: Uuid,
            element_type: Option<ElementType>,
        ) -> Result<Vec<Element>, StorageError> {
            if self.fail_elements {
                return Err(StorageError::ReadFailed);
            }
            self.inner.get_elements_by_task(task_id, element_type)
        }

        fn get_elements_for_tasks(&self, task_ids: &[Uuid]) -> Result<Vec<Element>, StorageError> {
            if self.fail_elements {
                return Err(StorageError::ReadFailed);
            }
            self.inner.get_elements_for_tasks(task_ids)
        }
    }

    #[test]
    fn test_failed_task_fetch_degrades_to_bare_areas() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let flaky = Arc::new(FlakyTemplates {
            inner: fixture.storage.clone(),
            fail_tasks: true,
            fail_elements: false,
        });
        let builder = HierarchyBuilder::new(flaky, fixture.storage.clone());

        let areas = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        assert_eq!(areas.len(), 2);
        assert!(areas.iter().all(|a| a.tasks.is_empty()));
    }

    #[test]
    fn test_failed_element_fetch_degrades_to_bare_tasks() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let flaky = Arc::new(FlakyTemplates {
            inner: fixture.storage.clone(),
            fail_tasks: false,
            fail_elements: true,
        });
        let builder = HierarchyBuilder::new(flaky, fixture.storage.clone());

        let areas = builder
            .build_session_hierarchy(fixture.template_id, session_id)
            .unwrap();
        assert_eq!(areas.len(), 2);
        assert!(areas.iter().flat_map(|a| a.tasks.iter()).count() > 0);
        assert!(areas
            .iter()
            .flat_map(|a| a.tasks.iter())
            .all(|t| t.elements.is_empty()));
    }

    #[test]
    fn test_prepopulation_propagates_fetch_failures() {
        let fixture = fixture();
        let session_id = start_session(&fixture);
        let flaky = Arc::new(FlakyTemplates {
            inner: fixture.storage.clone(),
            fail_tasks: true,
            fail_elements: false,
        });
        let builder = HierarchyBuilder::new(flaky, fixture.storage.clone());

        let result = builder.prepopulate_session_elements(session_id, fixture.template_id);
        assert!(matches!(result, Err(HierarchyError::StorageError(_))));
    }
}
