use std::{fmt, time::Instant};

use log::{debug, info, warn};

use crate::{
    error::{Error, Result},
    manager::observer::Notifier,
    models::{error::TaskError, message::{TaskUpdate, WorkerMessage}},
    worker::cancel::CancelHandle,
};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Idle,
    Running,
    Canceling,
    Done,
    Canceled,
    Error,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Canceled | TaskStatus::Error)
    }

    /// Edges of the lifecycle DAG. Terminal states have no outgoing edge.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Canceling)
                | (Running, Done)
                | (Running, Error)
                | (Canceling, Canceled)
                | (Canceling, Done)
                | (Canceling, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Canceling => "canceling",
            TaskStatus::Done => "done",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Idle => "Idle",
            TaskStatus::Running => "Running",
            TaskStatus::Canceling => "Canceling",
            TaskStatus::Done => "Done",
            TaskStatus::Canceled => "Canceled",
            TaskStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Observable part of a task: label, status, progress, captured error.
///
/// Every change goes through a method of this type, which logs it and
/// notifies the runner's observers once the task is registered.
#[derive(Debug)]
pub struct TaskState {
    id: Option<TaskId>,
    label: String,
    status: TaskStatus,
    progress: Option<f64>,
    error: Option<TaskError>,
    finished_at: Option<Instant>,
    notifier: Option<Notifier>,
}

impl TaskState {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            status: TaskStatus::Idle,
            progress: None,
            error: None,
            finished_at: None,
            notifier: None,
        }
    }

    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// One listing line, e.g. `Publishing scene (Running) 42%`.
    pub fn display_line(&self) -> String {
        let mut line = format!("{} ({})", self.label, self.status);
        if let Some(progress) = self.progress {
            line.push_str(&format!(" {:.0}%", progress * 100.0));
        }
        line
    }

    pub(crate) fn register(&mut self, id: TaskId, notifier: Notifier) {
        self.id = Some(id);
        self.notifier = Some(notifier);
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.notify();
    }

    /// Sets the progress fraction, clamped to `[0, 1]`. `None` unsets it.
    pub fn set_progress(&mut self, progress: Option<f64>) {
        self.progress = progress.map(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) });
        self.notify();
    }

    /// `Idle -> Running`.
    pub fn start(&mut self) -> Result<()> {
        if !self.transition(TaskStatus::Running) {
            return Err(Error::InvalidTransition {
                label: self.label.clone(),
                from: self.status,
                to: TaskStatus::Running,
            });
        }
        Ok(())
    }

    /// `Running -> Canceling`.
    pub fn canceling(&mut self) -> bool {
        self.transition(TaskStatus::Canceling)
    }

    pub fn done(&mut self, now: Instant) -> bool {
        self.finish(TaskStatus::Done, now)
    }

    pub fn canceled(&mut self, now: Instant) -> bool {
        self.finish(TaskStatus::Canceled, now)
    }

    pub fn set_error(&mut self, error: TaskError, now: Instant) -> bool {
        if self.is_finished() {
            debug!("Task {:?} already finished, dropping error: {}", self.label, error);
            return false;
        }
        if !self.can_enter(TaskStatus::Error) {
            return false;
        }
        warn!("Task {:?} failed: {}", self.label, error);
        self.error = Some(error);
        self.finish(TaskStatus::Error, now)
    }

    /// Applies one worker message.
    ///
    /// Terminal messages move the task to its final state; updates are handed
    /// back to the caller. Anything arriving after the task finished is
    /// discarded.
    pub fn apply(&mut self, message: WorkerMessage, now: Instant) -> Option<TaskUpdate> {
        if self.is_finished() {
            debug!("Task {:?} is {}, discarding {:?}", self.label, self.status, message.kind());
            return None;
        }
        match message {
            WorkerMessage::Update(update) => Some(update),
            WorkerMessage::Done => {
                self.done(now);
                None
            }
            WorkerMessage::Canceled => {
                self.canceled(now);
                None
            }
            WorkerMessage::Error(error) => {
                self.set_error(error, now);
                None
            }
        }
    }

    fn finish(&mut self, status: TaskStatus, now: Instant) -> bool {
        if !self.can_enter(status) {
            return false;
        }
        self.finished_at = Some(now);
        self.enter(status);
        true
    }

    fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.can_enter(next) {
            return false;
        }
        self.enter(next);
        true
    }

    fn can_enter(&self, next: TaskStatus) -> bool {
        if self.status.can_transition_to(next) {
            return true;
        }
        if self.is_finished() {
            debug!("Task {:?} is {}, ignoring {}", self.label, self.status, next);
        } else {
            warn!("Task {:?} cannot go from {} to {}", self.label, self.status, next);
        }
        false
    }

    fn enter(&mut self, next: TaskStatus) {
        info!("Task {:?} status updated: {} -> {}", self.label, self.status, next);
        self.status = next;
        self.notify();
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.task_changed(Some(self));
        }
    }
}

/// What a task sees of the controlling side while it runs or ticks.
pub struct TickContext<'a, C> {
    pub host: &'a mut C,
    pub now: Instant,
}

/// A unit of asynchronous work driven by a [`TaskRunner`](crate::TaskRunner).
///
/// `C` is the host context handed to `run` and `tick`; tasks that read
/// live host state or deliver results to it bound it as they need.
pub trait Task<C> {
    fn state(&self) -> &TaskState;

    fn state_mut(&mut self) -> &mut TaskState;

    /// Moves the task to `Running`, performs any synchronous setup on the
    /// controlling thread, then starts the worker.
    fn run(&mut self, cx: &mut TickContext<'_, C>) -> Result<()>;

    /// Drains pending worker messages. Never blocks.
    fn tick(&mut self, cx: &mut TickContext<'_, C>);

    /// Cancellation capability. Tasks returning `None` are not cancelable.
    fn canceller(&self) -> Option<&dyn CancelHandle> {
        None
    }

    fn is_cancelable(&self) -> bool {
        self.canceller().is_some()
    }

    /// Asks the worker to stop and moves the task to `Canceling`.
    ///
    /// The task only becomes `Canceled` once the worker acknowledges it and a
    /// later tick observes the acknowledgment.
    fn cancel(&mut self) -> bool {
        if self.state().status() != TaskStatus::Running {
            return false;
        }
        match self.canceller() {
            Some(handle) => handle.request_cancel(),
            None => return false,
        }
        self.state_mut().canceling()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lifecycle_follows_the_dag() {
        let now = Instant::now();
        let mut state = TaskState::new("upload");
        assert!(!state.done(now));
        assert_eq!(state.status(), TaskStatus::Idle);

        state.start().unwrap();
        assert!(state.start().is_err());
        assert!(!state.canceled(now), "canceled requires canceling first");

        assert!(state.canceling());
        assert!(state.done(now + Duration::from_secs(1)));
        assert_eq!(state.status(), TaskStatus::Done);
        assert_eq!(state.finished_at(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let now = Instant::now();
        let mut state = TaskState::new("refresh");
        state.start().unwrap();
        assert!(state.set_error(TaskError::new("Io", "broken pipe"), now));

        assert!(!state.done(now));
        assert!(!state.canceling());
        assert!(!state.set_error(TaskError::new("Io", "again"), now));
        assert_eq!(state.status(), TaskStatus::Error);
        assert_eq!(state.error().unwrap().message(), "broken pipe");
    }

    #[test]
    fn messages_after_termination_are_discarded() {
        let now = Instant::now();
        let mut state = TaskState::new("publish");
        state.start().unwrap();

        assert!(state.apply(WorkerMessage::Done, now).is_none());
        let late = state.apply(WorkerMessage::Update(TaskUpdate::Progress(0.5)), now);
        assert!(late.is_none());
        state.apply(WorkerMessage::Error(TaskError::new("panic", "late")), now);
        assert_eq!(state.status(), TaskStatus::Done);
        assert!(state.error().is_none());
    }

    #[test]
    fn display_line_shows_progress() {
        let mut state = TaskState::new("Publishing scene");
        state.start().unwrap();
        assert_eq!(state.display_line(), "Publishing scene (Running)");
        state.set_progress(Some(0.42));
        assert_eq!(state.display_line(), "Publishing scene (Running) 42%");
        state.set_progress(Some(3.0));
        assert_eq!(state.progress(), Some(1.0));
    }
}
