//! File-based persistence for the CLI. One `<key>.json` file per key.

use crate::error::PersistenceError;
use crate::storage::Storage;
use std::fs;
use std::io;
use std::path::PathBuf;

pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let write = || -> io::Result<()> {
            fs::create_dir_all(&self.base_path)?;
            // Replace atomically
            let temporary = self.base_path.join(format!("{}.json.tmp", key));
            fs::write(&temporary, value)?;
            fs::rename(temporary, self.path(key))
        };
        write().map_err(|source| PersistenceError::Write {
            key: key.to_string(),
            source,
        })
    }
}
