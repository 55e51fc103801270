use log::debug;

use crate::{
    error::{Error, Result},
    models::{
        error::WorkerError,
        message::TaskUpdate,
        task::{Task, TaskState, TickContext},
    },
    worker::{
        cancel::CancelHandle,
        worker::{WorkerBridge, WorkerContext},
    },
};

pub type Job = Box<dyn FnOnce(&WorkerContext) -> Result<(), WorkerError> + Send>;

/// Runs an arbitrary closure as a cancelable worker job.
///
/// The closure is expected to poll [`WorkerContext::checkpoint`] (or sleep
/// through [`WorkerContext::sleep`]) to honor cancellation.
pub struct FnTask {
    state: TaskState,
    bridge: WorkerBridge,
    job: Option<Job>,
}

impl FnTask {
    pub fn new<F>(label: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(&WorkerContext) -> Result<(), WorkerError> + Send + 'static,
    {
        let label = label.into();
        Self {
            bridge: WorkerBridge::new(label.clone()),
            state: TaskState::new(label),
            job: Some(Box::new(job)),
        }
    }
}

impl<C> Task<C> for FnTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TaskState {
        &mut self.state
    }

    fn run(&mut self, _cx: &mut TickContext<'_, C>) -> Result<()> {
        let job = self
            .job
            .take()
            .ok_or_else(|| Error::WorkerAlreadyStarted(self.state.label().to_string()))?;
        self.state.start()?;
        self.bridge.start(job)
    }

    fn tick(&mut self, cx: &mut TickContext<'_, C>) {
        for message in self.bridge.drain() {
            match self.state.apply(message, cx.now) {
                Some(TaskUpdate::Progress(p)) => self.state.set_progress(Some(p)),
                Some(TaskUpdate::Note(note)) => self.state.set_label(note),
                Some(other) => debug!("Task {:?} ignoring {} update.", self.state.label(), other.name()),
                None => {}
            }
        }
    }

    fn canceller(&self) -> Option<&dyn CancelHandle> {
        Some(&self.bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        manager::task_runner::{RunnerConfig, TaskRunner},
        models::task::TaskStatus,
        tasks::fake::tick_until,
    };
    use std::time::Duration;

    #[test]
    fn progress_and_notes_reach_the_state() {
        let mut runner: TaskRunner<()> = TaskRunner::new(RunnerConfig::default());
        let id = runner.add_task(
            &mut (),
            FnTask::new("Counting", |w| {
                w.progress(0.5);
                w.update(TaskUpdate::Note("Counted".into()));
                Ok(())
            }),
        );

        tick_until(&mut runner, &mut (), |r| r.get(id).map_or(true, |t| t.is_finished()));
        let state = runner.get(id).unwrap();
        assert_eq!(state.status(), TaskStatus::Done);
        assert_eq!(state.label(), "Counted");
        assert_eq!(state.progress(), Some(0.5));
    }

    #[test]
    fn cancel_stops_a_sleeping_job() {
        let mut runner: TaskRunner<()> = TaskRunner::new(RunnerConfig::default());
        let id = runner.add_task(&mut (), FnTask::new("Sleep", |w| w.sleep(Duration::from_secs(30))));
        assert_eq!(runner.cancel(), 1);

        tick_until(&mut runner, &mut (), |r| r.get(id).map_or(true, |t| t.is_finished()));
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Canceled);
    }
}
