//! On-disk backend for the durable scope.
//!
//! All items of the scope live in one JSON object file. Every operation
//! re-reads the file so that a second console process sees the latest
//! state; writes replace the file atomically (temp file + rename).

use crate::{ScopeBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// JSON-file backed scope.
pub struct FileBackend {
    path: PathBuf,
    /// Upper bound on the serialized file size, if any.
    quota_bytes: Option<usize>,
    lock: Mutex<()>,
}

impl FileBackend {
    /// Create a backend persisting to `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota_bytes: None,
            lock: Mutex::new(()),
        }
    }

    /// Refuse writes that would grow the file beyond `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StorageError::Encoding(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> StorageResult<()> {
        let content = serde_json::to_string_pretty(items)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        if let Some(quota) = self.quota_bytes {
            if content.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    needed: content.len(),
                    quota,
                });
            }
        }

        atomic_write_text(&self.path, &content)?;
        Ok(())
    }
}

impl ScopeBackend for FileBackend {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        let mut items = self.load()?;
        if items.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&items)?;
        Ok(true)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.into_keys().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock();
        self.persist(&BTreeMap::new())
    }
}

fn atomic_write_text(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "storage path has no file name"))?;

    let tmp_path = dir.join(format!(
        ".{}.console.tmp.{}",
        file_name,
        std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let write_result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, path)?;

        if let Ok(parent_dir) = fs::File::open(&dir) {
            let _ = parent_dir.sync_all();
        }

        Ok(())
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }

    write_result
}
