use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::storage::types::{Area, Element, Task};

/// Fully-loaded template hierarchy records, the immutable side of a
/// session merge.
#[derive(Debug, Clone)]
pub struct TemplateRecords {
    pub areas: Vec<Area>,
    pub tasks: Vec<Task>,
    pub elements: Vec<Element>,
}

/// Keyed cache of template records with manual invalidation.
///
/// Only complete loads are inserted; a hit always means the full record
/// set. Callers inject their own instance, one per test case or one per
/// process.
pub struct TemplateCache {
    entries: Mutex<HashMap<Uuid, Arc<TemplateRecords>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, template_id: Uuid) -> Option<Arc<TemplateRecords>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&template_id).cloned())
    }

    pub fn put(&self, template_id: Uuid, records: TemplateRecords) -> Arc<TemplateRecords> {
        let records = Arc::new(records);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(template_id, records.clone());
        }
        records
    }

    pub fn invalidate(&self, template_id: Uuid) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&template_id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_records() -> TemplateRecords {
        TemplateRecords {
            areas: vec![],
            tasks: vec![],
            elements: vec![],
        }
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = TemplateCache::new();
        let id = Uuid::new_v4();
        assert!(cache.get(id).is_none());

        cache.put(id, empty_records());
        assert!(cache.get(id).is_some());

        cache.invalidate(id);
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn test_clear_drops_all_entries() {
        let cache = TemplateCache::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        cache.put(first, empty_records());
        cache.put(second, empty_records());

        cache.clear();
        assert!(cache.get(first).is_none());
        assert!(cache.get(second).is_none());
    }
}
