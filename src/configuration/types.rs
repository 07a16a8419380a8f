use serde::Deserialize;

/// Which storage backend the server runs against.
///
/// `sqlite` persists to a database file; `memory` keeps everything in
/// process, for demos and local experimentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Sqlite
    }
}
