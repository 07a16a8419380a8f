use std::collections::HashMap;
use std::env;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::{SessionStore, TemplateStore};
use crate::storage::types::{
    Area, Element, ElementEvaluation, ElementType, NewSession, PerformanceStatus, Session,
    SessionElementRow, SessionFilter, SessionUpdate, Task, TaskFeedback, Template,
};

fn status_to_str(status: PerformanceStatus) -> &'static str {
    match status {
        PerformanceStatus::Satisfactory => "satisfactory",
        PerformanceStatus::Unsatisfactory => "unsatisfactory",
        PerformanceStatus::NotObserved => "not-observed",
    }
}

fn status_from_str(s: &str) -> PerformanceStatus {
    match s {
        "satisfactory" => PerformanceStatus::Satisfactory,
        "unsatisfactory" => PerformanceStatus::Unsatisfactory,
        _ => PerformanceStatus::NotObserved,
    }
}

fn element_type_to_str(t: ElementType) -> &'static str {
    match t {
        ElementType::Knowledge => "knowledge",
        ElementType::Risk => "risk",
        ElementType::Skill => "skill",
    }
}

fn element_type_from_str(s: &str) -> ElementType {
    match s {
        "risk" => ElementType::Risk,
        "skill" => ElementType::Skill,
        _ => ElementType::Knowledge,
    }
}

fn feedback_to_str(f: TaskFeedback) -> &'static str {
    match f {
        TaskFeedback::Excellent => "excellent",
        TaskFeedback::Proficient => "proficient",
        TaskFeedback::NeedsReview => "needs_review",
        TaskFeedback::Weak => "weak",
    }
}

fn feedback_from_str(s: &str) -> TaskFeedback {
    match s {
        "excellent" => TaskFeedback::Excellent,
        "proficient" => TaskFeedback::Proficient,
        "weak" => TaskFeedback::Weak,
        _ => TaskFeedback::NeedsReview,
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

// Internal row mappings to avoid manual try_get
#[derive(Debug, sqlx::FromRow)]
struct AreaRow {
    id: String,
    template_id: String,
    order_number: i64,
    title: String,
    description: String,
}

impl AreaRow {
    fn into_area(self) -> Result<Area, StorageError> {
        Ok(Area {
            id: Uuid::parse_str(&self.id).map_err(|_| StorageError::ReadFailed)?,
            template_id: Uuid::parse_str(&self.template_id)
                .map_err(|_| StorageError::ReadFailed)?,
            order_number: self.order_number as i32,
            title: self.title,
            description: self.description,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    area_id: String,
    order_letter: String,
    title: String,
    objective: String,
    is_required: i64,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, StorageError> {
        Ok(Task {
            id: Uuid::parse_str(&self.id).map_err(|_| StorageError::ReadFailed)?,
            area_id: Uuid::parse_str(&self.area_id).map_err(|_| StorageError::ReadFailed)?,
            order_letter: self.order_letter,
            title: self.title,
            objective: self.objective,
            is_required: self.is_required != 0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ElementRow {
    id: String,
    task_id: String,
    code: String,
    element_type: String,
    label: String,
    description: String,
    performance_criteria: String,
    common_errors: String,
    refs: String,
}

impl ElementRow {
    fn into_element(self) -> Result<Element, StorageError> {
        Ok(Element {
            id: Uuid::parse_str(&self.id).map_err(|_| StorageError::ReadFailed)?,
            task_id: Uuid::parse_str(&self.task_id).map_err(|_| StorageError::ReadFailed)?,
            code: self.code,
            element_type: element_type_from_str(&self.element_type),
            label: self.label,
            description: self.description,
            performance_criteria: serde_json::from_str(&self.performance_criteria)
                .map_err(|_| StorageError::ReadFailed)?,
            common_errors: serde_json::from_str(&self.common_errors)
                .map_err(|_| StorageError::ReadFailed)?,
            references: serde_json::from_str(&self.refs).map_err(|_| StorageError::ReadFailed)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    instructor_id: String,
    student_id: String,
    template_id: String,
    scenario_id: Option<String>,
    session_name: String,
    notes: String,
    date_started: String,
    date_completed: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<Session, StorageError> {
        let parse_date = |s: &str| -> Result<DateTime<Utc>, StorageError> {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| StorageError::ReadFailed)
        };
        Ok(Session {
            id: Uuid::parse_str(&self.id).map_err(|_| StorageError::ReadFailed)?,
            instructor_id: Uuid::parse_str(&self.instructor_id)
                .map_err(|_| StorageError::ReadFailed)?,
            student_id: Uuid::parse_str(&self.student_id)
                .map_err(|_| StorageError::ReadFailed)?,
            template_id: Uuid::parse_str(&self.template_id)
                .map_err(|_| StorageError::ReadFailed)?,
            scenario_id: match self.scenario_id {
                Some(s) => Some(Uuid::parse_str(&s).map_err(|_| StorageError::ReadFailed)?),
                None => None,
            },
            session_name: self.session_name,
            notes: self.notes,
            date_started: parse_date(&self.date_started)?,
            date_completed: match self.date_completed {
                Some(s) => Some(parse_date(&s)?),
                None => None,
            },
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    session_id: String,
    element_id: String,
    performance_status: String,
    instructor_comment: String,
    instructor_mentioned: i64,
    student_mentioned: i64,
    a2_deficiency: i64,
    needs_review: i64,
    score: Option<i64>,
}

impl LedgerRow {
    fn into_row(self) -> Result<SessionElementRow, StorageError> {
        Ok(SessionElementRow {
            session_id: Uuid::parse_str(&self.session_id)
                .map_err(|_| StorageError::ReadFailed)?,
            element_id: Uuid::parse_str(&self.element_id)
                .map_err(|_| StorageError::ReadFailed)?,
            performance_status: status_from_str(&self.performance_status),
            instructor_comment: self.instructor_comment,
            instructor_mentioned: self.instructor_mentioned != 0,
            student_mentioned: self.student_mentioned != 0,
            a2_deficiency: self.a2_deficiency != 0,
            needs_review: self.needs_review != 0,
            score: self.score.map(|s| s as u8),
        })
    }
}

pub struct SqliteStorage {
    rt: tokio::runtime::Runtime,
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Default database filename used in the application's working directory
    const DEFAULT_DB_FILE: &'static str = "checkride.sqlite3";

    /// Create or open the database in the current working directory with the default filename
    pub fn new() -> Result<Self, StorageError> {
        let cwd = env::current_dir().map_err(|_| StorageError::ConnectionFailed)?;
        let path = cwd.join(Self::DEFAULT_DB_FILE);
        Self::new_file(path)
    }

    pub fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|_| StorageError::ConnectionFailed)?;
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent).map_err(|_| StorageError::WriteFailed)?;
        }
        let pool = rt.block_on(async {
            let opts = SqliteConnectOptions::new()
                .filename(path_ref)
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(opts)
                .await
                .map_err(|_| StorageError::ConnectionFailed)?;
            // ensure foreign keys
            sqlx::query("PRAGMA foreign_keys = ON;")
                .execute(&pool)
                .await
                .map_err(|_| StorageError::WriteFailed)?;
            // create schema
            let statements = [
                "CREATE TABLE IF NOT EXISTS templates (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL
                );",
                "CREATE TABLE IF NOT EXISTS areas (
                    id TEXT PRIMARY KEY,
                    template_id TEXT NOT NULL,
                    order_number INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    FOREIGN KEY(template_id) REFERENCES templates(id) ON DELETE CASCADE
                );",
                "CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    area_id TEXT NOT NULL,
                    order_letter TEXT NOT NULL,
                    title TEXT NOT NULL,
                    objective TEXT NOT NULL,
                    is_required INTEGER NOT NULL,
                    FOREIGN KEY(area_id) REFERENCES areas(id) ON DELETE CASCADE
                );",
                "CREATE TABLE IF NOT EXISTS elements (
                    id TEXT PRIMARY KEY,
                    task_id TEXT NOT NULL,
                    code TEXT NOT NULL,
                    element_type TEXT NOT NULL,
                    label TEXT NOT NULL,
                    description TEXT NOT NULL,
                    performance_criteria TEXT NOT NULL,
                    common_errors TEXT NOT NULL,
                    refs TEXT NOT NULL,
                    FOREIGN KEY(task_id) REFERENCES tasks(id) ON DELETE CASCADE
                );",
                "CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    instructor_id TEXT NOT NULL,
                    student_id TEXT NOT NULL,
                    template_id TEXT NOT NULL,
                    scenario_id TEXT,
                    session_name TEXT NOT NULL,
                    notes TEXT NOT NULL,
                    date_started TEXT NOT NULL,
                    date_completed TEXT,
                    FOREIGN KEY(template_id) REFERENCES templates(id)
                );",
                "CREATE TABLE IF NOT EXISTS session_elements (
                    session_id TEXT NOT NULL,
                    element_id TEXT NOT NULL,
                    performance_status TEXT NOT NULL,
                    instructor_comment TEXT NOT NULL,
                    instructor_mentioned INTEGER NOT NULL,
                    student_mentioned INTEGER NOT NULL,
                    a2_deficiency INTEGER NOT NULL,
                    needs_review INTEGER NOT NULL,
                    score INTEGER,
                    PRIMARY KEY(session_id, element_id),
                    FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );",
                "CREATE TABLE IF NOT EXISTS task_feedback (
                    session_id TEXT NOT NULL,
                    task_id TEXT NOT NULL,
                    feedback TEXT NOT NULL,
                    PRIMARY KEY(session_id, task_id),
                    FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );",
            ];
            for stmt in statements {
                sqlx::query(stmt)
                    .execute(&pool)
                    .await
                    .map_err(|_| StorageError::WriteFailed)?;
            }
            Ok::<_, StorageError>(pool)
        })?;
        Ok(Self { rt, pool })
    }

    pub fn insert_template(&self, template: &Template) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query("INSERT INTO templates (id, name, description) VALUES (?1, ?2, ?3)")
                .bind(template.id.to_string())
                .bind(&template.name)
                .bind(&template.description)
                .execute(&self.pool)
                .await
                .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    pub fn insert_area(&self, area: &Area) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO areas (id, template_id, order_number, title, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(area.id.to_string())
            .bind(area.template_id.to_string())
            .bind(area.order_number as i64)
            .bind(&area.title)
            .bind(&area.description)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    pub fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO tasks (id, area_id, order_letter, title, objective, is_required)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(task.id.to_string())
            .bind(task.area_id.to_string())
            .bind(&task.order_letter)
            .bind(&task.title)
            .bind(&task.objective)
            .bind(task.is_required as i64)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    pub fn insert_element(&self, element: &Element) -> Result<(), StorageError> {
        self.rt.block_on(async {
            let criteria = serde_json::to_string(&element.performance_criteria)
                .map_err(|_| StorageError::WriteFailed)?;
            let errors = serde_json::to_string(&element.common_errors)
                .map_err(|_| StorageError::WriteFailed)?;
            let refs = serde_json::to_string(&element.references)
                .map_err(|_| StorageError::WriteFailed)?;
            sqlx::query(
                "INSERT INTO elements (id, task_id, code, element_type, label, description,
                                       performance_criteria, common_errors, refs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(element.id.to_string())
            .bind(element.task_id.to_string())
            .bind(&element.code)
            .bind(element_type_to_str(element.element_type))
            .bind(&element.label)
            .bind(&element.description)
            .bind(criteria)
            .bind(errors)
            .bind(refs)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }
}

impl TemplateStore for SqliteStorage {
    fn get_template(&self, template_id: Uuid) -> Result<Option<Template>, StorageError> {
        self.rt.block_on(async {
            let row: Option<(String, String, String)> =
                sqlx::query_as("SELECT id, name, description FROM templates WHERE id = ?1")
                    .bind(template_id.to_string())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|_| StorageError::ReadFailed)?;
            match row {
                Some((id, name, description)) => Ok(Some(Template {
                    id: Uuid::parse_str(&id).map_err(|_| StorageError::ReadFailed)?,
                    name,
                    description,
                })),
                None => Ok(None),
            }
        })
    }

    fn get_areas(&self, template_id: Uuid) -> Result<Vec<Area>, StorageError> {
        self.rt.block_on(async {
            let rows: Vec<AreaRow> = sqlx::query_as(
                "SELECT id, template_id, order_number, title, description
                 FROM areas WHERE template_id = ?1 ORDER BY order_number",
            )
            .bind(template_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| StorageError::ReadFailed)?;
            rows.into_iter().map(|r| r.into_area()).collect()
        })
    }

    fn get_tasks_by_area(&self, area_id: Uuid) -> Result<Vec<Task>, StorageError> {
        self.rt.block_on(async {
            let rows: Vec<TaskRow> = sqlx::query_as(
                "SELECT id, area_id, order_letter, title, objective, is_required
                 FROM tasks WHERE area_id = ?1 ORDER BY order_letter",
            )
            .bind(area_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| StorageError::ReadFailed)?;
            rows.into_iter().map(|r| r.into_task()).collect()
        })
    }

    fn get_tasks_for_areas(&self, area_ids: &[Uuid]) -> Result<Vec<Task>, StorageError> {
        if area_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.rt.block_on(async {
            let sql = format!(
                "SELECT t.id, t.area_id, t.order_letter, t.title, t.objective, t.is_required
                 FROM tasks t JOIN areas a ON a.id = t.area_id
                 WHERE t.area_id IN ({})
                 ORDER BY a.order_number, t.order_letter",
                placeholders(area_ids.len())
            );
            let mut q = sqlx::query_as::<_, TaskRow>(&sql);
            for id in area_ids {
                q = q.bind(id.to_string());
            }
            let rows = q
                .fetch_all(&self.pool)
                .await
                .map_err(|_| StorageError::ReadFailed)?;
            rows.into_iter().map(|r| r.into_task()).collect()
        })
    }

    fn get_elements_by_task(
        &self,
        task_id: Uuid,
        element_type: Option<ElementType>,
    ) -> Result<Vec<Element>, StorageError> {
        self.rt.block_on(async {
            let mut sql = String::from(
                "SELECT id, task_id, code, element_type, label, description,
                        performance_criteria, common_errors, refs
                 FROM elements WHERE task_id = ?",
            );
            if element_type.is_some() {
                sql.push_str(" AND element_type = ?");
            }
            sql.push_str(" ORDER BY code");
            let mut q = sqlx::query_as::<_, ElementRow>(&sql).bind(task_id.to_string());
            if let Some(t) = element_type {
                q = q.bind(element_type_to_str(t));
            }
            let rows = q
                .fetch_all(&self.pool)
                .await
                .map_err(|_| StorageError::ReadFailed)?;
            rows.into_iter().map(|r| r.into_element()).collect()
        })
    }

    fn get_elements_for_tasks(&self, task_ids: &[Uuid]) -> Result<Vec<Element>, StorageError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.rt.block_on(async {
            let sql = format!(
                "SELECT e.id, e.task_id, e.code, e.element_type, e.label, e.description,
                        e.performance_criteria, e.common_errors, e.refs
                 FROM elements e
                 JOIN tasks t ON t.id = e.task_id
                 JOIN areas a ON a.id = t.area_id
                 WHERE e.task_id IN ({})
                 ORDER BY a.order_number, t.order_letter, e.code",
                placeholders(task_ids.len())
            );
            let mut q = sqlx::query_as::<_, ElementRow>(&sql);
            for id in task_ids {
                q = q.bind(id.to_string());
            }
            let rows = q
                .fetch_all(&self.pool)
                .await
                .map_err(|_| StorageError::ReadFailed)?;
            rows.into_iter().map(|r| r.into_element()).collect()
        })
    }
}

impl SessionStore for SqliteStorage {
    fn create_session(&self, session: &NewSession) -> Result<Uuid, StorageError> {
        self.rt.block_on(async {
            let id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO sessions (id, instructor_id, student_id, template_id, scenario_id,
                                       session_name, notes, date_started, date_completed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
            )
            .bind(id.to_string())
            .bind(session.instructor_id.to_string())
            .bind(session.student_id.to_string())
            .bind(session.template_id.to_string())
            .bind(session.scenario_id.map(|s| s.to_string()))
            .bind(&session.session_name)
            .bind(&session.notes)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(id)
        })
    }

    fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StorageError> {
        self.rt.block_on(async {
            let row: Option<SessionRow> = sqlx::query_as(
                "SELECT id, instructor_id, student_id, template_id, scenario_id,
                        session_name, notes, date_started, date_completed
                 FROM sessions WHERE id = ?1",
            )
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| StorageError::ReadFailed)?;
            row.map(|r| r.into_session()).transpose()
        })
    }

    fn get_sessions(&self, filter: Option<SessionFilter>) -> Result<Vec<Session>, StorageError> {
        self.rt.block_on(async {
            let mut sql = String::from(
                "SELECT id, instructor_id, student_id, template_id, scenario_id,
                        session_name, notes, date_started, date_completed FROM sessions",
            );
            let mut clauses: Vec<String> = Vec::new();
            let mut binds: Vec<String> = Vec::new();
            if let Some(f) = &filter {
                if let Some(id) = f.instructor_id {
                    clauses.push("instructor_id = ?".into());
                    binds.push(id.to_string());
                }
                if let Some(id) = f.student_id {
                    clauses.push("student_id = ?".into());
                    binds.push(id.to_string());
                }
                if let Some(id) = f.template_id {
                    clauses.push("template_id = ?".into());
                    binds.push(id.to_string());
                }
                if let Some(completed) = f.completed {
                    if completed {
                        clauses.push("date_completed IS NOT NULL".into());
                    } else {
                        clauses.push("date_completed IS NULL".into());
                    }
                }
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY date_started");

            let mut q = sqlx::query_as::<_, SessionRow>(&sql);
            for b in &binds {
                q = q.bind(b);
            }
            let rows: Vec<SessionRow> = q
                .fetch_all(&self.pool)
                .await
                .map_err(|_| StorageError::ReadFailed)?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(row.into_session()?);
            }
            Ok(out)
        })
    }

    fn update_session(
        &self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<(), StorageError> {
        self.rt.block_on(async {
            let mut sets: Vec<String> = Vec::new();
            let mut binds: Vec<String> = Vec::new();
            if let Some(ref name) = update.session_name {
                sets.push("session_name = ?".into());
                binds.push(name.clone());
            }
            if let Some(ref notes) = update.notes {
                sets.push("notes = ?".into());
                binds.push(notes.clone());
            }
            if let Some(completed) = update.date_completed {
                sets.push("date_completed = ?".into());
                binds.push(completed.to_rfc3339());
            }
            if sets.is_empty() {
                return Ok(());
            }
            let sql = format!("UPDATE sessions SET {} WHERE id = ?", sets.join(", "));
            let mut q = sqlx::query(&sql);
            for b in &binds {
                q = q.bind(b);
            }
            let result = q
                .bind(session_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|_| StorageError::WriteFailed)?;
            if result.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
            Ok(())
        })
    }

    fn get_session_elements(
        &self,
        session_id: Uuid,
        element_ids: Option<&[Uuid]>,
    ) -> Result<HashMap<Uuid, SessionElementRow>, StorageError> {
        self.rt.block_on(async {
            let mut sql = String::from(
                "SELECT session_id, element_id, performance_status, instructor_comment,
                        instructor_mentioned, student_mentioned, a2_deficiency, needs_review, score
                 FROM session_elements WHERE session_id = ?",
            );
            if let Some(ids) = element_ids {
                if ids.is_empty() {
                    return Ok(HashMap::new());
                }
                sql.push_str(&format!(" AND element_id IN ({})", placeholders(ids.len())));
            }
            let mut q = sqlx::query_as::<_, LedgerRow>(&sql).bind(session_id.to_string());
            if let Some(ids) = element_ids {
                for id in ids {
                    q = q.bind(id.to_string());
                }
            }
            let rows = q
                .fetch_all(&self.pool)
                .await
                .map_err(|_| StorageError::ReadFailed)?;
            let mut out = HashMap::with_capacity(rows.len());
            for row in rows {
                let row = row.into_row()?;
                out.insert(row.element_id, row);
            }
            Ok(out)
        })
    }

    fn upsert_element_evaluation(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        evaluation: &ElementEvaluation,
    ) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO session_elements (session_id, element_id, performance_status,
                     instructor_comment, instructor_mentioned, student_mentioned,
                     a2_deficiency, needs_review, score)
                 VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5, NULL)
                 ON CONFLICT(session_id, element_id) DO UPDATE SET
                   performance_status = excluded.performance_status,
                   instructor_comment = excluded.instructor_comment,
                   needs_review = excluded.needs_review,
                   score = NULL",
            )
            .bind(session_id.to_string())
            .bind(element_id.to_string())
            .bind(status_to_str(evaluation.performance_status))
            .bind(&evaluation.instructor_comment)
            .bind(evaluation.needs_review as i64)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    fn upsert_element_score(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        score: u8,
    ) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO session_elements (session_id, element_id, performance_status,
                     instructor_comment, instructor_mentioned, student_mentioned,
                     a2_deficiency, needs_review, score)
                 VALUES (?1, ?2, 'not-observed', '', 0, 0, 0, 0, ?3)
                 ON CONFLICT(session_id, element_id) DO UPDATE SET
                   score = excluded.score",
            )
            .bind(session_id.to_string())
            .bind(element_id.to_string())
            .bind(score as i64)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    fn upsert_element_mentions(
        &self,
        session_id: Uuid,
        element_id: Uuid,
        instructor_mentioned: bool,
        student_mentioned: bool,
    ) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO session_elements (session_id, element_id, performance_status,
                     instructor_comment, instructor_mentioned, student_mentioned,
                     a2_deficiency, needs_review, score)
                 VALUES (?1, ?2, 'not-observed', '', ?3, ?4, 0, 0, NULL)
                 ON CONFLICT(session_id, element_id) DO UPDATE SET
                   instructor_mentioned = excluded.instructor_mentioned,
                   student_mentioned = excluded.student_mentioned",
            )
            .bind(session_id.to_string())
            .bind(element_id.to_string())
            .bind(instructor_mentioned as i64)
            .bind(student_mentioned as i64)
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    fn bulk_insert_session_elements(
        &self,
        rows: &[SessionElementRow],
    ) -> Result<usize, StorageError> {
        self.rt.block_on(async {
            let mut inserted = 0usize;
            for row in rows {
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO session_elements (session_id, element_id,
                         performance_status, instructor_comment, instructor_mentioned,
                         student_mentioned, a2_deficiency, needs_review, score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .bind(row.session_id.to_string())
                .bind(row.element_id.to_string())
                .bind(status_to_str(row.performance_status))
                .bind(&row.instructor_comment)
                .bind(row.instructor_mentioned as i64)
                .bind(row.student_mentioned as i64)
                .bind(row.a2_deficiency as i64)
                .bind(row.needs_review as i64)
                .bind(row.score.map(|s| s as i64))
                .execute(&self.pool)
                .await
                .map_err(|_| StorageError::WriteFailed)?;
                inserted += result.rows_affected() as usize;
            }
            Ok(inserted)
        })
    }

    fn set_a2_deficiencies(
        &self,
        session_id: Uuid,
        element_ids: &[Uuid],
    ) -> Result<(), StorageError> {
        self.rt.block_on(async {
            for element_id in element_ids {
                sqlx::query(
                    "INSERT INTO session_elements (session_id, element_id, performance_status,
                         instructor_comment, instructor_mentioned, student_mentioned,
                         a2_deficiency, needs_review, score)
                     VALUES (?1, ?2, 'not-observed', '', 0, 0, 1, 0, NULL)
                     ON CONFLICT(session_id, element_id) DO UPDATE SET
                       a2_deficiency = 1",
                )
                .bind(session_id.to_string())
                .bind(element_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|_| StorageError::WriteFailed)?;
            }
            Ok(())
        })
    }

    fn save_task_feedback(
        &self,
        session_id: Uuid,
        task_id: Uuid,
        feedback: TaskFeedback,
    ) -> Result<(), StorageError> {
        self.rt.block_on(async {
            sqlx::query(
                "INSERT INTO task_feedback (session_id, task_id, feedback)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, task_id) DO UPDATE SET
                   feedback = excluded.feedback",
            )
            .bind(session_id.to_string())
            .bind(task_id.to_string())
            .bind(feedback_to_str(feedback))
            .execute(&self.pool)
            .await
            .map_err(|_| StorageError::WriteFailed)?;
            Ok(())
        })
    }

    fn get_task_feedback(
        &self,
        session_id: Uuid,
    ) -> Result<HashMap<Uuid, TaskFeedback>, StorageError> {
        self.rt.block_on(async {
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT task_id, feedback FROM task_feedback WHERE session_id = ?1",
            )
            .bind(session_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| StorageError::ReadFailed)?;
            let mut out = HashMap::with_capacity(rows.len());
            for (task_id, feedback) in rows {
                let task_id =
                    Uuid::parse_str(&task_id).map_err(|_| StorageError::ReadFailed)?;
                out.insert(task_id, feedback_from_str(&feedback));
            }
            Ok(out)
        })
    }
}
