use std::{
    any::Any,
    backtrace::Backtrace,
    error::Error as StdError,
    fmt, io,
};

use crate::{client::error::ClientError, models::task::TaskState};

/// Error returned by a worker job.
///
/// `Canceled` is the distinct result of a job that stopped because
/// cancellation was requested; everything else is a failure that ends the
/// task in `Error`.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("canceled")]
    Canceled,

    #[error(transparent)]
    Client(ClientError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Task(#[from] crate::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ClientError> for WorkerError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Canceled => WorkerError::Canceled,
            other => WorkerError::Client(other),
        }
    }
}

/// Failure captured from a task, kept verbatim until the task is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    kind: String,
    message: String,
    causes: Vec<String>,
    backtrace: String,
}

impl TaskError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            causes: Vec::new(),
            backtrace: String::new(),
        }
    }

    pub fn from_error(kind: impl Into<String>, error: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: kind.into(),
            message: error.to_string(),
            causes,
            backtrace: Backtrace::capture().to_string(),
        }
    }

    pub fn from_worker_error(error: &WorkerError) -> Self {
        match error {
            WorkerError::Canceled => Self::new("Canceled", "worker stopped without a cancel request"),
            WorkerError::Client(e) => Self::from_error(format!("ClientError::{}", e.kind()), e),
            WorkerError::Io(e) => Self::from_error(format!("io::Error({:?})", e.kind()), e),
            WorkerError::Json(e) => Self::from_error("serde_json::Error", e),
            WorkerError::Task(e) => Self::from_error(e.kind(), e),
            WorkerError::Other(e) => Self {
                kind: "Error".to_string(),
                message: e.to_string(),
                causes: e.chain().skip(1).map(|c| c.to_string()).collect(),
                backtrace: e.backtrace().to_string(),
            },
        }
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self {
            kind: "panic".to_string(),
            message,
            causes: Vec::new(),
            backtrace: Backtrace::capture().to_string(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }

    /// Short report for the user.
    pub fn report(&self, label: &str) -> String {
        format!(
            "Previz task error\n\
             Task: {label}\n\
             Exception: {}\n\
             Value: {}\n\
             \n\
             See the console for debug information.\n",
            self.kind, self.message
        )
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Debug block for support requests, or `None` when the task did not fail.
pub fn debug_info(task: &TaskState) -> Option<String> {
    let error = task.error()?;
    let local = chrono::Local::now();
    let utc = local.with_timezone(&chrono::Utc);
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let progress = task
        .progress()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "None".to_string());

    let mut lines = vec![
        "---- PREVIZ DEBUG INFO START".to_string(),
        format!("Date:    : {}", local.to_rfc3339()),
        format!("Date UTC : {}", utc.to_rfc3339()),
        format!("User     : {user}"),
        format!("OS       : {} {}", std::env::consts::OS, std::env::consts::ARCH),
        format!("Addon    : {}", env!("CARGO_PKG_NAME")),
        format!("Version  : {}", env!("CARGO_PKG_VERSION")),
        format!("Task     : {}", task.label()),
        format!("Status   : {}", task.status().as_str()),
        format!("Progress : {progress}"),
        format!("Exception: {}", error.kind()),
        format!("Error    : {}", error.message()),
    ];
    lines.extend(error.causes().iter().map(|c| format!("Caused by: {c}")));
    lines.push("Traceback:".to_string());
    lines.push(error.backtrace().to_string());
    lines.push("---- PREVIZ DEBUG INFO END".to_string());

    let mut info = lines.join("\n");
    info.push('\n');
    Some(info)
}
