//! Process-scoped session storage.

use std::collections::HashMap;

use memberhub_core::SessionStore;
use parking_lot::Mutex;
use zeroize::Zeroize;

/// In-memory [`SessionStore`]. Nothing is written to disk and values are
/// wiped from memory when removed.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        if let Some(mut old) = self.entries.lock().insert(key.to_string(), value) {
            old.zeroize();
        }
    }

    fn take(&self, key: &str) -> Option<String> {
        self.entries.lock().remove(key)
    }

    fn remove(&self, key: &str) {
        if let Some(mut old) = self.entries.lock().remove(key) {
            old.zeroize();
        }
    }
}

impl Drop for MemorySessionStore {
    fn drop(&mut self) {
        for value in self.entries.get_mut().values_mut() {
            value.zeroize();
        }
    }
}
