use std::sync::Arc;

use log::info;

use crate::configuration::config::Config;
use crate::configuration::types::StorageBackend;
use crate::error_handling::types::ControllerError;
use crate::evaluation::cache::TemplateCache;
use crate::evaluation::hierarchy::HierarchyBuilder;
use crate::evaluation::scoring::Evaluator;
use crate::session_management::session_manager::SessionManager;
use crate::storage::database_storage::SqliteStorage;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::storage_trait::{SessionStore, TemplateStore};
use crate::web_interface::web_server::WebServer;

/// Wires the configured storage backend into the evaluation components
/// and runs the web server over them.
pub struct Controller {
    pub config: Config,
    web_server: WebServer,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        let (templates, sessions): (Arc<dyn TemplateStore>, Arc<dyn SessionStore>) =
            match config.storage {
                StorageBackend::Sqlite => {
                    info!(
                        "Opening SQLite storage at {}",
                        config.database_path.display()
                    );
                    let storage = Arc::new(SqliteStorage::new_file(&config.database_path)?);
                    (storage.clone(), storage)
                }
                StorageBackend::Memory => {
                    info!("Using in-memory storage; data is lost on shutdown");
                    let storage = Arc::new(MemoryStorage::new());
                    (storage.clone(), storage)
                }
            };

        // One template cache shared by the lifecycle manager and the
        // hierarchy reads.
        let cache = Arc::new(TemplateCache::new());
        let manager = Arc::new(SessionManager::with_cache(
            templates.clone(),
            sessions.clone(),
            cache.clone(),
        ));
        let builder = Arc::new(HierarchyBuilder::with_cache(
            templates.clone(),
            sessions.clone(),
            cache,
        ));
        let evaluator = Arc::new(Evaluator::new(sessions.clone()));
        let web_server = WebServer::new(sessions, manager, builder, evaluator);

        Ok(Self { config, web_server })
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        let addr = self.config.socket_addr()?;
        self.web_server.start(addr).await?;
        Ok(())
    }
}
