//! Working namespace of the native engine: a private temp directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{AudioToolsError, Result};

/// Flat directory of staged job files.
///
/// Names are plain file names; anything that could escape the directory is
/// rejected. The directory and whatever is left in it are removed on drop.
pub struct WorkingNamespace {
    dir: TempDir,
    entries: BTreeSet<String>,
}

impl WorkingNamespace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("audio-engine-").tempdir()?;
        Ok(Self {
            dir,
            entries: BTreeSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path for `name`
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.path().join(name))
    }

    pub fn register(&mut self, name: &str) {
        self.entries.insert(name.to_string());
    }

    pub fn unregister(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// Names known to the namespace, plus anything the engine created on its own
    pub fn entries(&self) -> Result<Vec<String>> {
        let mut names = self.entries.clone();
        for entry in std::fs::read_dir(self.dir.path())? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// Генерирует уникальное имя файла вида `prefix_<uuid>.ext`
pub fn unique_name(prefix: &str, extension: &str) -> String {
    format!("{}_{}.{}", prefix, uuid::Uuid::new_v4(), extension)
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(AudioToolsError::InvalidSettings(format!(
            "invalid working file name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names() {
        let a = unique_name("input", "wav");
        let b = unique_name("input", "wav");
        assert_ne!(a, b);
        assert!(a.starts_with("input_") && a.ends_with(".wav"));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let namespace = WorkingNamespace::new().unwrap();
        assert!(namespace.resolve("../etc/passwd").is_err());
        assert!(namespace.resolve("a/b").is_err());
        assert!(namespace.resolve("..").is_err());
        assert!(namespace.resolve("input_1.wav").is_ok());
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let namespace = WorkingNamespace::new().unwrap();
        let path = namespace.path().to_path_buf();
        std::fs::write(namespace.resolve("leftover.bin").unwrap(), b"x").unwrap();
        assert_eq!(namespace.entries().unwrap(), vec!["leftover.bin".to_string()]);

        drop(namespace);
        assert!(!path.exists());
    }
}
