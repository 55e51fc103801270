use std::{io, path::PathBuf};

use crate::models::task::{TaskId, TaskStatus};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised on the controlling side.
///
/// Failures of worker jobs never show up here: they are captured as a
/// [`TaskError`](crate::TaskError) on the task that produced them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("cannot remove unfinished task {label:?} (id {id}, {status})")]
    TaskNotFinished {
        id: TaskId,
        label: String,
        status: TaskStatus,
    },

    #[error("task {label:?} cannot go from {from} to {to}")]
    InvalidTransition {
        label: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("worker thread for {0:?} was already started")]
    WorkerAlreadyStarted(String),

    #[error("could not spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("could not serialize scene: {0}")]
    Export(#[from] serde_json::Error),

    #[error("invalid settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("host error: {0}")]
    Host(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Short name of the variant, recorded as the kind of a captured task error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownTask(_) => "UnknownTask",
            Error::TaskNotFinished { .. } => "TaskNotFinished",
            Error::InvalidTransition { .. } => "InvalidTransition",
            Error::WorkerAlreadyStarted(_) => "WorkerAlreadyStarted",
            Error::Spawn(_) => "Spawn",
            Error::Export(_) => "Export",
            Error::Settings { .. } => "Settings",
            Error::Host(_) => "Host",
            Error::Io(_) => "Io",
        }
    }
}
