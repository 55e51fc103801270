//! Background task queue for exporting a scene and publishing it to a Previz
//! project without blocking the host's UI thread.
//!
//! The controlling side ([`TaskRunner`], [`QueuePump`]) is single-threaded and
//! driven by a periodic tick. Every blocking operation runs on a dedicated
//! worker thread owned by its task and talks to the controlling side only
//! through the two queues of a [`WorkerBridge`].

pub mod client;
pub mod error;
pub mod exporter;
pub mod manager;
pub mod models;
pub mod settings;
pub mod tasks;
pub mod worker;

pub use error::{Error, Result};
pub use manager::clock::{Clock, ManualClock, SystemClock};
pub use manager::observer::{Notifier, SubscriptionId, TaskObserver};
pub use manager::pump::{
    ExecutionMode, HostEvents, HostTimer, PumpConfig, PumpEvent, PumpStatus, QueuePump, SleepingEvents,
};
pub use manager::task_runner::{IdGenerator, RunnerConfig, TaskRunner};
pub use models::error::{TaskError, WorkerError};
pub use models::message::{ControlMessage, TaskUpdate, WorkerMessage};
pub use models::task::{Task, TaskId, TaskState, TaskStatus, TickContext};
pub use worker::cancel::{CancelHandle, CancelToken, Reporter};
pub use worker::worker::{WorkerBridge, WorkerContext};
