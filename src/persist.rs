//! Named JSON dumps under a root directory.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Saves and loads values as `<root>/<name>.json`. Names may contain
/// sub-directories (`Fold1/fold_comparison`).
#[derive(Debug, Clone)]
pub struct DictPersist {
    root: PathBuf,
}

impl DictPersist {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DictPersist { root: root.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    pub fn save<T: Serialize + ?Sized>(&self, value: &T, name: &str) -> Result<PathBuf, String> {
        let path = self.file_path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {:?}: {}", parent, e))?;
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| format!("Cannot serialize {}: {}", name, e))?;
        std::fs::write(&path, json)
            .map_err(|e| format!("Cannot write {:?}: {}", path, e))?;
        log::debug!("Saved {:?}", path);
        Ok(path)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, String> {
        let path = self.file_path(name);
        let json = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read {:?}: {}", path, e))?;
        serde_json::from_str(&json)
            .map_err(|e| format!("Invalid JSON in {:?}: {}", path, e))
    }
}
