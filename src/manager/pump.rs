use std::{thread, time::Duration};

use log::{debug, info};

use crate::{
    manager::task_runner::TaskRunner,
    models::task::{Task, TaskId},
};

#[derive(Debug, Clone)]
pub struct PumpConfig {
    pub polling_interval: Duration,
    /// Headless hosts have no event loop: `start` ticks once and returns.
    pub background: bool,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(250),
            background: false,
        }
    }
}

/// Result of starting or stepping the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// Queue drained, timer removed.
    Finished,
    /// Still polling; keep delivering events.
    RunningModal,
    /// Aborted (or headless single tick); timer removed.
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEvent {
    Timer,
    Escape,
    /// Anything else the host saw; passed through untouched.
    Other,
}

/// Host repeating-timer primitive.
pub trait HostTimer {
    fn add_timer(&mut self, interval: Duration);
    fn remove_timer(&mut self);
}

/// Host event loop able to block until the next event.
pub trait HostEvents: HostTimer {
    fn wait_event(&mut self) -> PumpEvent;
}

/// Whether a task call returns at once or only once the queue drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Blocking,
    Queued,
}

/// Polling driver for a [`TaskRunner`].
///
/// One pump drives one runner. Starting a pump that is already running is a
/// no-op, so hosts can call `start` every time the queue reports it started.
#[derive(Debug, Default)]
pub struct QueuePump {
    config: PumpConfig,
    running: bool,
}

impl QueuePump {
    pub fn new(config: PumpConfig) -> Self {
        Self {
            config,
            running: false,
        }
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start<C>(
        &mut self,
        runner: &mut TaskRunner<C>,
        timer: &mut dyn HostTimer,
        host: &mut C,
    ) -> PumpStatus {
        if self.running {
            debug!("Queue pump already running.");
            return PumpStatus::RunningModal;
        }
        if runner.is_drained() {
            self.cleanup(runner, timer);
            return PumpStatus::Finished;
        }
        if self.config.background {
            runner.tick(host);
            runner.set_pump_stopped(true);
            return PumpStatus::Canceled;
        }

        info!("Queue pump started, polling every {:?}.", self.config.polling_interval);
        timer.add_timer(self.config.polling_interval);
        self.running = true;
        runner.set_pump_stopped(false);
        PumpStatus::RunningModal
    }

    pub fn handle_event<C>(
        &mut self,
        event: PumpEvent,
        runner: &mut TaskRunner<C>,
        timer: &mut dyn HostTimer,
        host: &mut C,
    ) -> PumpStatus {
        if !self.running {
            return PumpStatus::Finished;
        }
        match event {
            PumpEvent::Escape => self.abort(runner, timer),
            PumpEvent::Timer => {
                if !runner.is_drained() {
                    runner.tick(host);
                }
                if runner.is_drained() {
                    self.cleanup(runner, timer);
                    return PumpStatus::Finished;
                }
                PumpStatus::RunningModal
            }
            PumpEvent::Other => PumpStatus::RunningModal,
        }
    }

    /// Cancels every in-flight cancelable task and stops polling without
    /// waiting for acknowledgments; later ticks observe them.
    pub fn abort<C>(&mut self, runner: &mut TaskRunner<C>, timer: &mut dyn HostTimer) -> PumpStatus {
        let canceled = runner.cancel();
        info!("Queue pump aborted, {} tasks canceling.", canceled);
        self.cleanup(runner, timer);
        PumpStatus::Canceled
    }

    /// Runs the modal loop until the queue drains or the host aborts it.
    pub fn run_modal<C, E: HostEvents>(
        &mut self,
        runner: &mut TaskRunner<C>,
        events: &mut E,
        host: &mut C,
    ) -> PumpStatus {
        let mut status = self.start(runner, events, host);
        while status == PumpStatus::RunningModal {
            let event = events.wait_event();
            status = self.handle_event(event, runner, events, host);
        }
        status
    }

    /// Adds `task` in the given mode. `Blocking` drives the queue with a
    /// sleeping loop until it drains; `Queued` leaves polling to the host.
    pub fn submit<C, T>(
        &mut self,
        mode: ExecutionMode,
        runner: &mut TaskRunner<C>,
        host: &mut C,
        task: T,
    ) -> (TaskId, Option<PumpStatus>)
    where
        T: Task<C> + 'static,
    {
        let id = runner.add_task(host, task);
        match mode {
            ExecutionMode::Queued => (id, None),
            ExecutionMode::Blocking => {
                let mut events = SleepingEvents::default();
                (id, Some(self.run_modal(runner, &mut events, host)))
            }
        }
    }

    /// Stops polling. Tasks still registered are left to the next start.
    fn cleanup<C>(&mut self, runner: &mut TaskRunner<C>, timer: &mut dyn HostTimer) {
        runner.set_pump_stopped(true);
        if self.running {
            timer.remove_timer();
            info!("Queue pump stopped.");
        }
        self.running = false;
    }
}

/// Event source for hosts without an event loop: every wait sleeps one
/// polling interval and reports a timer event.
#[derive(Debug, Default)]
pub struct SleepingEvents {
    interval: Option<Duration>,
}

impl HostTimer for SleepingEvents {
    fn add_timer(&mut self, interval: Duration) {
        self.interval = Some(interval);
    }

    fn remove_timer(&mut self) {
        self.interval = None;
    }
}

impl HostEvents for SleepingEvents {
    fn wait_event(&mut self) -> PumpEvent {
        match self.interval {
            Some(interval) => {
                thread::sleep(interval);
                PumpEvent::Timer
            }
            None => PumpEvent::Other,
        }
    }
}
