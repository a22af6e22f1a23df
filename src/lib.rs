pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod state;
pub mod workflow;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use state::{FileStore, MemoryStore, ProjectManager, ProjectStore};
pub use workflow::{Mode, ModeState, Project, ProjectStatus};
