//! Project storage backends.
//!
//! [`ProjectStore`] is the seam between the engines and the filesystem.
//! [`FileStore`] keeps one JSON file per project and guards it with a lock
//! file; [`MemoryStore`] keeps serialized records in memory.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::workflow::Project;
use crate::{ttlog_debug, ttlog_trace, ttlog_warn};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Persistence for whole project records.
///
/// Implementations must make `save` atomic: a reader sees either the old
/// record or the new one, never a partial write.
pub trait ProjectStore: Send + Sync {
    /// Guard returned by [`ProjectStore::lock`]; releases the lock on drop.
    type Lock;

    fn exists(&self, id: &str) -> Result<bool>;

    /// Load a project.
    ///
    /// # Errors
    ///
    /// `ProjectNotFound` when no record exists, `CorruptRecord` when the
    /// record cannot be decoded.
    fn load(&self, id: &str) -> Result<Project>;

    fn save(&self, project: &Project) -> Result<()>;

    /// Ids of every stored project, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Take the store-level exclusive lock for one project.
    fn lock(&self, id: &str) -> Result<Self::Lock>;
}

fn decode(id: &str, contents: &str) -> Result<Project> {
    let project: Project = serde_json::from_str(contents).map_err(|e| Error::CorruptRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })?;
    if project.id != id {
        return Err(Error::CorruptRecord {
            id: id.to_string(),
            reason: format!("record belongs to project '{}'", project.id),
        });
    }
    Ok(project)
}

// ========== File Store ==========

/// One pretty-printed `<id>.json` file per project in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock_timeout: Duration,
    stale_lock_age: Duration,
}

impl FileStore {
    /// Create a store rooted at `dir` with the default lock settings.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            dir: dir.into(),
            lock_timeout: defaults.lock_timeout(),
            stale_lock_age: defaults.stale_lock_age(),
        }
    }

    /// Create a store from configuration, optionally overriding the directory.
    pub fn from_config(config: &Config, dir_override: Option<&Path>) -> Result<Self> {
        let dir = match dir_override {
            Some(dir) => dir.to_path_buf(),
            None => config.tasks_dir()?,
        };
        Ok(Self::new(dir)
            .with_lock_timeout(config.lock_timeout())
            .with_stale_lock_age(config.stale_lock_age()))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_stale_lock_age(mut self, age: Duration) -> Self {
        self.stale_lock_age = age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn project_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn backup_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json.bak", id))
    }

    pub fn lock_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", id))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", id))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            ttlog_debug!("Creating tasks directory: {}", self.dir.display());
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl ProjectStore for FileStore {
    type Lock = LockFile;

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.project_path(id).exists())
    }

    fn load(&self, id: &str) -> Result<Project> {
        let path = self.project_path(id);
        ttlog_debug!("FileStore::load path={}", path.display());
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(Error::ProjectNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        decode(id, &contents)
    }

    fn save(&self, project: &Project) -> Result<()> {
        self.ensure_dir()?;
        let path = self.project_path(&project.id);
        let contents = serde_json::to_string_pretty(project)?;

        if path.exists() {
            let backup_path = self.backup_path(&project.id);
            ttlog_debug!("Creating project backup: {}", backup_path.display());
            fs::copy(&path, &backup_path)?;
        }

        let temp_path = self.temp_path(&project.id);
        fs::write(&temp_path, format!("{}\n", contents))?;
        fs::rename(&temp_path, &path)?;
        ttlog_debug!("Project saved: {}", path.display());
        ttlog_trace!("project={} record={}", project.id, contents);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn lock(&self, id: &str) -> Result<LockFile> {
        self.ensure_dir()?;
        LockFile::acquire(
            self.lock_path(id),
            id,
            self.lock_timeout,
            self.stale_lock_age,
        )
    }
}

/// An exclusive lock file owned through a random token.
///
/// The file is created with `create_new`, so only one holder can exist at a
/// time across processes. It is removed on drop, but only while it still
/// holds this owner's token.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    token: String,
}

impl LockFile {
    /// Acquire the lock, polling until `timeout`.
    ///
    /// A lock file older than `stale_after` is treated as abandoned and
    /// removed.
    ///
    /// # Errors
    ///
    /// `LockTimeout` when the lock stays held for longer than `timeout`.
    pub fn acquire(
        path: PathBuf,
        project: &str,
        timeout: Duration,
        stale_after: Duration,
    ) -> Result<Self> {
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(token.as_bytes())?;
                    ttlog_debug!("Lock acquired: {} token={}", path.display(), token);
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    if Self::is_stale(&path, stale_after) {
                        Self::break_stale(&path, stale_after);
                        continue;
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(Error::LockTimeout {
                            project: project.to_string(),
                            waited,
                        });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove an abandoned lock file without removing a live one.
    ///
    /// The file is renamed to a private name first, so only one breaker can
    /// take it. The moved file must still hold the owner token read up front
    /// and still be stale; otherwise a fresh lock was displaced and is linked
    /// back into place.
    fn break_stale(path: &Path, stale_after: Duration) {
        let Ok(owner) = fs::read_to_string(path) else {
            return;
        };
        let mut moved = path.as_os_str().to_owned();
        moved.push(format!(".{}.stale", Uuid::new_v4()));
        let moved = PathBuf::from(moved);
        if fs::rename(path, &moved).is_err() {
            // Released or already broken by someone else.
            return;
        }

        let unchanged = fs::read_to_string(&moved).is_ok_and(|contents| contents == owner);
        if unchanged && Self::is_stale(&moved, stale_after) {
            ttlog_warn!("Breaking stale lock: {}", path.display());
        } else if let Err(e) = fs::hard_link(&moved, path) {
            ttlog_warn!(
                "Could not restore displaced lock {}: {}",
                path.display(),
                e
            );
        } else {
            ttlog_debug!("Restored displaced lock: {}", path.display());
        }
        let _ = fs::remove_file(&moved);
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > stale_after)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents == self.token => {
                let _ = fs::remove_file(&self.path);
                ttlog_debug!("Lock released: {}", self.path.display());
            }
            Ok(_) => ttlog_warn!(
                "Lock {} is owned by another holder; leaving it",
                self.path.display()
            ),
            Err(_) => {}
        }
    }
}

// ========== Memory Store ==========

/// In-memory store holding serialized records.
///
/// Records go through the same JSON encoding as the file store, so a saved
/// project can be compared byte for byte.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored JSON for a project, if any.
    pub fn raw(&self, id: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Store raw JSON, bypassing encoding.
    pub fn insert_raw(&self, id: &str, contents: &str) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), contents.to_string());
    }
}

impl ProjectStore for MemoryStore {
    /// The manager's in-process lock already covers a memory store.
    type Lock = ();

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.raw(id).is_some())
    }

    fn load(&self, id: &str) -> Result<Project> {
        let contents = self
            .raw(id)
            .ok_or_else(|| Error::ProjectNotFound(id.to_string()))?;
        decode(id, &contents)
    }

    fn save(&self, project: &Project) -> Result<()> {
        let contents = serde_json::to_string_pretty(project)?;
        self.insert_raw(&project.id, &contents);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }

    fn lock(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}
