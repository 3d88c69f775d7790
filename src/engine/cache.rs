//! Engine registry: cache id -> pre-warmed engine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::EngineRef;
use crate::error::RegistryError;

/// Maps string ids to engines that outlive any single host.
///
/// Cloning yields another handle to the same mapping. Access is confined to
/// the UI thread, so there is no locking.
#[derive(Clone, Default)]
pub struct EngineCache {
    engines: Rc<RefCell<HashMap<String, EngineRef>>>,
}

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, engine_id: &str) -> Option<EngineRef> {
        self.engines.borrow().get(engine_id).cloned()
    }

    /// Like [`EngineCache::get`], but a missing id is an error.
    pub fn require(&self, engine_id: &str) -> Result<EngineRef, RegistryError> {
        self.get(engine_id).ok_or_else(|| RegistryError::MissingEntry {
            engine_id: engine_id.to_string(),
        })
    }

    /// Register `engine` under `engine_id`, replacing and returning any
    /// previous entry.
    pub fn put(&self, engine_id: impl Into<String>, engine: EngineRef) -> Option<EngineRef> {
        let engine_id = engine_id.into();
        log::debug!("[EngineCache] put '{}' -> {}", engine_id, engine.id());
        self.engines.borrow_mut().insert(engine_id, engine)
    }

    pub fn remove(&self, engine_id: &str) -> Option<EngineRef> {
        let removed = self.engines.borrow_mut().remove(engine_id);
        if removed.is_some() {
            log::debug!("[EngineCache] removed '{}'", engine_id);
        }
        removed
    }

    pub fn contains(&self, engine_id: &str) -> bool {
        self.engines.borrow().contains_key(engine_id)
    }

    pub fn len(&self) -> usize {
        self.engines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.engines.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, HeadlessEngine};

    fn engine() -> EngineRef {
        Rc::new(HeadlessEngine::new())
    }

    #[test]
    fn get_returns_registered_engine() {
        let cache = EngineCache::new();
        let registered = engine();
        cache.put("shared", Rc::clone(&registered));

        let found = cache.get("shared").unwrap();
        assert_eq!(found.id(), registered.id());
        assert!(cache.contains("shared"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let cache = EngineCache::new();
        let first = engine();
        let second = engine();

        assert!(cache.put("shared", Rc::clone(&first)).is_none());
        let replaced = cache.put("shared", Rc::clone(&second)).unwrap();

        assert_eq!(replaced.id(), first.id());
        assert_eq!(cache.get("shared").unwrap().id(), second.id());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn require_reports_missing_entry() {
        let cache = EngineCache::new();
        let err = cache.require("never-registered").err().unwrap();
        assert_eq!(
            err,
            RegistryError::MissingEntry {
                engine_id: "never-registered".to_string()
            }
        );
    }

    #[test]
    fn remove_and_clones_share_the_mapping() {
        let cache = EngineCache::new();
        let handle = cache.clone();
        handle.put("shared", engine());

        assert!(cache.remove("shared").is_some());
        assert!(handle.is_empty());
        assert!(cache.remove("shared").is_none());
    }
}
