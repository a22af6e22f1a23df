//! Project persistence.
//!
//! This module provides the storage seam for project records and the
//! manager that wraps every operation in a locked load/mutate/save cycle.

mod manager;
mod store;

pub use manager::{Committed, ListEntry, ProjectManager};
pub use store::{FileStore, LockFile, MemoryStore, ProjectStore};
