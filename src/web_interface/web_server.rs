use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use warp::Filter;

use crate::error_handling::types::WebError;
use crate::evaluation::hierarchy::HierarchyBuilder;
use crate::evaluation::scoring::Evaluator;
use crate::session_management::session_manager::SessionManager;
use crate::storage::storage_trait::SessionStore;
use crate::web_interface::routes;

/// Web server for the HTTP API and dashboard
pub struct WebServer {
    sessions: Arc<dyn SessionStore>,
    manager: Arc<SessionManager>,
    builder: Arc<HierarchyBuilder>,
    evaluator: Arc<Evaluator>,
}

impl WebServer {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        manager: Arc<SessionManager>,
        builder: Arc<HierarchyBuilder>,
        evaluator: Arc<Evaluator>,
    ) -> Self {
        Self {
            sessions,
            manager,
            builder,
            evaluator,
        }
    }

    /// Start the web server on the given address
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        let routes = routes::dashboard_route()
            .or(routes::list_sessions_route(self.sessions.clone()))
            .or(routes::create_session_route(self.manager.clone()))
            .or(routes::get_session_route(self.sessions.clone()))
            .or(routes::complete_session_route(self.manager.clone()))
            .or(routes::session_hierarchy_route(
                self.sessions.clone(),
                self.builder.clone(),
            ))
            .or(routes::session_progress_route(
                self.sessions.clone(),
                self.builder.clone(),
            ))
            .or(routes::session_readiness_route(self.sessions.clone()))
            .or(routes::save_evaluation_route(self.evaluator.clone()))
            .or(routes::save_score_route(self.evaluator.clone()))
            .or(routes::save_mentions_route(self.evaluator.clone()))
            .or(routes::save_task_feedback_route(self.evaluator.clone()))
            .or(routes::flag_deficiencies_route(self.evaluator.clone()));

        info!("Web server listening on {}", addr);
        // Start server (warp 0.4)
        warp::serve(routes).run(addr).await;

        Ok(())
    }
}
