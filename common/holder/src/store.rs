use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{HolderError, HolderResult};

/// Key-value persistence for the serialized token.
pub trait TokenStore: Send + Sync {
    fn read(&self, key: &str) -> HolderResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> HolderResult<()>;
    fn delete(&self, key: &str) -> HolderResult<()>;
}

/// Process-local store. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(key)
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self, key: &str) -> HolderResult<Option<String>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> HolderResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> HolderResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> HolderResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> HolderResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && key != "."
            && key != "..";
        if !valid {
            return Err(HolderError::Storage(format!(
                "storage key '{key}' is not a valid file name"
            )));
        }
        Ok(self.dir.join(key))
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self, key: &str) -> HolderResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> HolderResult<()> {
        let path = self.path_for(key)?;
        let staging = self.dir.join(format!(".{key}.tmp"));
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> HolderResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.read("k").expect("read"), None);
        store.write("k", "Bearer abc").expect("write");
        assert!(store.contains("k"));
        assert_eq!(store.read("k").expect("read").as_deref(), Some("Bearer abc"));
        store.delete("k").expect("delete");
        store.delete("k").expect("second delete is a no-op");
        assert!(!store.contains("k"));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::new(dir.path()).expect("store");
        store.write("session", "Bearer abc").expect("write");

        let reopened = FileTokenStore::new(dir.path()).expect("store");
        assert_eq!(
            reopened.read("session").expect("read").as_deref(),
            Some("Bearer abc")
        );
        reopened.delete("session").expect("delete");
        assert_eq!(store.read("session").expect("read"), None);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTokenStore::new(dir.path()).expect("store");
        for key in ["", "..", "../escape", "a/b"] {
            assert!(
                matches!(store.write(key, "x"), Err(HolderError::Storage(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
