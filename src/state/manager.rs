//! ProjectManager - locked load/mutate/save cycles over a project store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::core::ident::validate_id;
use crate::error::{Error, Result};
use crate::state::store::ProjectStore;
use crate::workflow::{Project, StatusSummary};
use crate::{ttlog, ttlog_debug, ttlog_warn};

/// Result of a committed mutation: the operation's value and the saved project.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub project: Project,
}

/// One row of `list`. Unreadable records are reported instead of failing the listing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ListEntry {
    Project(StatusSummary),
    Unreadable { id: String, error: String },
}

/// Runs every project operation under a project-scoped exclusive lock.
///
/// The lock has two layers: an in-process mutex per project id, so threads
/// sharing a manager queue up without polling, and the store's own lock,
/// which serializes separate processes. Different projects never contend.
pub struct ProjectManager<S: ProjectStore> {
    store: S,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: ProjectStore> ProjectManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn project_mutex(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Drop the registry entry once no caller holds or waits on it.
    fn release_mutex(&self, id: &str, mutex: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(mutex);
        if locks.get(id).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(id);
        }
    }

    fn with_lock<T>(&self, id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let mutex = self.project_mutex(id);
        let result = {
            let _local = mutex.lock().unwrap_or_else(|e| e.into_inner());
            self.store.lock(id).and_then(|_store_lock| f())
        };
        self.release_mutex(id, mutex);
        result
    }

    /// Persist a new project.
    ///
    /// # Errors
    ///
    /// `ProjectExists` when a record with the same id exists and `force` is
    /// not set.
    pub fn create(&self, project: Project, force: bool) -> Result<Project> {
        let id = project.id.clone();
        validate_id("project", &id)?;
        self.with_lock(&id, || {
            if !force && self.store.exists(&id)? {
                return Err(Error::ProjectExists(id.clone()));
            }
            self.store.save(&project)?;
            ttlog!(
                "project={} op=init mode={} force={} ok",
                id,
                project.mode(),
                force
            );
            Ok(project)
        })
    }

    /// Run one operation as a locked load, mutate, save cycle.
    ///
    /// The project's derived status and `updated` time are refreshed before
    /// saving. When `f` fails nothing is written.
    ///
    /// # Arguments
    ///
    /// * `id` - Project id
    /// * `operation` - Operation name for the log
    /// * `f` - The mutation
    pub fn mutate<T>(
        &self,
        id: &str,
        operation: &str,
        f: impl FnOnce(&mut Project) -> Result<T>,
    ) -> Result<Committed<T>> {
        validate_id("project", id)?;
        self.with_lock(id, || {
            let mut project = self.store.load(id)?;
            let value = match f(&mut project) {
                Ok(value) => value,
                Err(e) => {
                    ttlog_warn!("project={} op={} rejected: {}", id, operation, e);
                    return Err(e);
                }
            };
            project.touch();
            self.store.save(&project)?;
            ttlog!(
                "project={} op={} ok status={}",
                id,
                operation,
                project.status
            );
            Ok(Committed { value, project })
        })
    }

    /// Load a project without locking. Saves are atomic, so a reader never
    /// sees a partial record.
    pub fn read(&self, id: &str) -> Result<Project> {
        validate_id("project", id)?;
        ttlog_debug!("project={} op=read", id);
        self.store.load(id)
    }

    /// Summaries of every stored project.
    pub fn list(&self) -> Result<Vec<ListEntry>> {
        let entries = self
            .store
            .list()?
            .into_iter()
            .map(|id| match self.store.load(&id) {
                Ok(project) => ListEntry::Project(project.summary()),
                Err(e) => {
                    ttlog_warn!("project={} unreadable: {}", id, e);
                    ListEntry::Unreadable {
                        id,
                        error: e.to_string(),
                    }
                }
            })
            .collect();
        Ok(entries)
    }
}
