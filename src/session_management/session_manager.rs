use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::error_handling::types::SessionError;
use crate::evaluation::cache::TemplateCache;
use crate::evaluation::hierarchy::HierarchyBuilder;
use crate::storage::storage_trait::{SessionStore, TemplateStore};
use crate::storage::types::{NewSession, Session, SessionUpdate};

/// Outcome of starting a session. `warning` is set when the session was
/// created but seeding its ledger (or pre-flagging deficiencies) failed;
/// the session is still usable, every element just starts unscored.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: Uuid,
    pub elements_seeded: usize,
    pub warning: Option<String>,
}

/// Creates and closes evaluation sessions.
///
/// Session creation and ledger prepopulation form an effectively-atomic
/// pair from the caller's point of view: if the second step fails the
/// session still exists and is reported with a warning rather than a
/// hard failure, because the merge path treats missing ledger rows as
/// not-observed.
pub struct SessionManager {
    templates: Arc<dyn TemplateStore>,
    sessions: Arc<dyn SessionStore>,
    hierarchy: HierarchyBuilder,
}

impl SessionManager {
    pub fn new(templates: Arc<dyn TemplateStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self::with_cache(templates, sessions, Arc::new(TemplateCache::new()))
    }

    pub fn with_cache(
        templates: Arc<dyn TemplateStore>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<TemplateCache>,
    ) -> Self {
        let hierarchy = HierarchyBuilder::with_cache(templates.clone(), sessions.clone(), cache);
        Self {
            templates,
            sessions,
            hierarchy,
        }
    }

    /// Creates the session, seeds a ledger row for every element in its
    /// template, and applies any pre-flagged written-test deficiencies.
    pub fn start_session(
        &self,
        payload: NewSession,
        a2_deficiencies: &[Uuid],
    ) -> Result<StartedSession, SessionError> {
        if self.templates.get_template(payload.template_id)?.is_none() {
            return Err(SessionError::TemplateNotFound);
        }
        let session_id = self.sessions.create_session(&payload)?;
        info!(
            "Started session {} for student {} on template {}",
            session_id, payload.student_id, payload.template_id
        );

        let mut warning = None;
        let elements_seeded = match self
            .hierarchy
            .prepopulate_session_elements(session_id, payload.template_id)
        {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    "Ledger seeding failed for session {}: {}; session starts cold",
                    session_id, e
                );
                warning = Some(format!(
                    "Session created, but seeding its elements failed: {}",
                    e
                ));
                0
            }
        };

        if !a2_deficiencies.is_empty() {
            if let Err(e) = self.sessions.set_a2_deficiencies(session_id, a2_deficiencies) {
                warn!(
                    "Deficiency pre-flagging failed for session {}: {}",
                    session_id, e
                );
                warning.get_or_insert_with(|| {
                    format!("Session created, but flagging written-test deficiencies failed: {}", e)
                });
            }
        }

        Ok(StartedSession {
            session_id,
            elements_seeded,
            warning,
        })
    }

    /// Marks the session finished. A second completion is rejected; the
    /// timestamp never moves once set.
    pub fn complete_session(&self, session_id: Uuid) -> Result<Session, SessionError> {
        let mut session = self
            .sessions
            .get_session(session_id)?
            .ok_or(SessionError::NotFound)?;
        if session.date_completed.is_some() {
            return Err(SessionError::AlreadyCompleted);
        }
        let completed = Utc::now();
        self.sessions.update_session(
            session_id,
            &SessionUpdate {
                date_completed: Some(completed),
                ..Default::default()
            },
        )?;
        info!("Completed session {}", session_id);
        session.date_completed = Some(completed);
        Ok(session)
    }
}
