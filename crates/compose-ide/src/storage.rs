//! Key-value persistence behind the workspace.

use crate::error::PersistenceError;
use std::collections::BTreeMap;
use std::io;

pub trait Storage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn save(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// In-memory storage. Writes can be made to fail to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    pub fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Write {
                key: key.to_string(),
                source: io::Error::other("storage is read-only"),
            });
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let mut storage = MemoryStorage::new().with_entry("project", "old");
        storage.fail_writes = true;
        assert!(matches!(
            storage.save("project", "new"),
            Err(PersistenceError::Write { key, .. }) if key == "project"
        ));
        assert_eq!(storage.load("project").unwrap().as_deref(), Some("old"));
    }
}
