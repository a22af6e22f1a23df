use thiserror::Error;

/// Coarse error taxonomy surfaced at the command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input (empty id, unknown status value).
    Validation,
    /// Unknown project, stage, debater or dependency.
    NotFound,
    /// Duplicate id, dependency cycle, roster already locked.
    Conflict,
    /// Operation invalid for the project's mode or current position.
    State,
    /// Filesystem, serialization or locking failure.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::State => "state",
            ErrorKind::Storage => "storage",
        }
    }

    /// Process exit code used by the CLI for this kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Storage => 1,
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Conflict => 4,
            ErrorKind::State => 5,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already exists: {0} (use --force to overwrite)")]
    ProjectExists(String),

    #[error("Corrupt project record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("Stage already exists: {0}")]
    StageExists(String),

    #[error("Unknown dependency '{dependency}' for stage '{stage}' (add it first)")]
    UnknownDependency { stage: String, dependency: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Stage {stage} is failed; reset it before moving it to {to}")]
    StageFailed { stage: String, to: String },

    #[error("Debater not found: {0}")]
    UnknownDebater(String),

    #[error("Debater already exists: {0}")]
    DebaterExists(String),

    #[error("Cannot add debater {0}: rounds have already started")]
    DebatersLocked(String),

    #[error("Round not ready: {0}")]
    RoundNotReady(String),

    #[error("Round in progress: {0}")]
    RoundInProgress(String),

    #[error("'{command}' is not supported for {mode} projects")]
    WrongMode { command: String, mode: String },

    #[error("Timed out after {waited:?} waiting for lock on project {project}")]
    LockTimeout {
        project: String,
        waited: std::time::Duration,
    },
}

impl Error {
    /// Map this error onto the command-boundary taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::ProjectNotFound(_)
            | Error::StageNotFound(_)
            | Error::UnknownDependency { .. }
            | Error::UnknownDebater(_) => ErrorKind::NotFound,
            Error::ProjectExists(_)
            | Error::StageExists(_)
            | Error::CycleDetected { .. }
            | Error::DebaterExists(_)
            | Error::DebatersLocked(_) => ErrorKind::Conflict,
            Error::StageFailed { .. }
            | Error::RoundNotReady(_)
            | Error::RoundInProgress(_)
            | Error::WrongMode { .. } => ErrorKind::State,
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::NoHomeDir
            | Error::CorruptRecord { .. }
            | Error::LockTimeout { .. } => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
