use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, error, info};

use crate::{
    error::{Error, Result},
    manager::{
        clock::{Clock, SystemClock},
        observer::{Notifier, SubscriptionId, TaskObserver},
    },
    models::{
        error::TaskError,
        task::{Task, TaskId, TaskState, TaskStatus, TickContext},
    },
};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How long a finished task stays listed before it is removed.
    pub keep_finished_task_timeout: Duration,
    /// Keep failed tasks until removed explicitly, so their error can be
    /// inspected.
    pub retain_failed_tasks: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            keep_finished_task_timeout: Duration::from_secs(2),
            retain_failed_tasks: false,
        }
    }
}

/// Monotonic task id source. Ids are never reused, even after removal;
/// clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Arc<AtomicU64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TaskId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Registry of tasks, driven by periodic ticks on the controlling thread.
///
/// Worker threads never touch the registry; they only talk to their own
/// task through its queues.
pub struct TaskRunner<C> {
    tasks: BTreeMap<TaskId, Box<dyn Task<C>>>,
    ids: IdGenerator,
    notifier: Notifier,
    clock: Rc<dyn Clock>,
    config: RunnerConfig,
    /// Set while no pump polls the registry, so the next task added
    /// restarts polling even if stale tasks are still active.
    pump_stopped: bool,
}

impl<C> TaskRunner<C> {
    pub fn new(config: RunnerConfig) -> Self {
        TaskRunner {
            tasks: BTreeMap::new(),
            ids: IdGenerator::new(),
            notifier: Notifier::default(),
            clock: Rc::new(SystemClock),
            config,
            pump_stopped: false,
        }
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn subscribe(&mut self, observer: impl TaskObserver + 'static) -> SubscriptionId {
        self.notifier.subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn new_task_id(&self) -> TaskId {
        self.ids.next_id()
    }

    /// Registers `task`, runs it, and returns its id.
    ///
    /// A failure of the task's synchronous setup is captured on the task
    /// itself, which then ends in `Error` like any worker failure.
    pub fn add_task<T>(&mut self, host: &mut C, task: T) -> TaskId
    where
        T: Task<C> + 'static,
    {
        self.add_boxed(host, Box::new(task))
    }

    pub fn add_boxed(&mut self, host: &mut C, mut task: Box<dyn Task<C>>) -> TaskId {
        let id = self.new_task_id();
        let was_idle = self.active_count() == 0 || self.pump_stopped;

        task.state_mut().register(id, self.notifier.clone());
        info!("Task '{}' created: {:?}.", id, task.state().label());
        let task = self.tasks.entry(id).or_insert(task);

        let now = self.clock.now();
        let mut cx = TickContext { host, now };
        if let Err(e) = task.run(&mut cx) {
            error!("Task '{}' failed to start: {}", id, e);
            let captured = TaskError::from_error(e.kind(), &e);
            let state = task.state_mut();
            if state.status() == TaskStatus::Idle {
                // Nothing else moves an idle task, so record the failure as
                // having happened right after starting.
                let _ = state.start();
            }
            state.set_error(captured, now);
        }

        if was_idle {
            debug!("Queue started by task '{}'.", id);
            self.pump_stopped = false;
            self.notifier.queue_started();
        }
        id
    }

    /// Ticks every task, then removes those finished for longer than the
    /// grace period.
    pub fn tick(&mut self, host: &mut C) {
        let now = self.clock.now();
        for (id, task) in self.tasks.iter_mut() {
            let mut cx = TickContext { host: &mut *host, now };
            let ticked = panic::catch_unwind(AssertUnwindSafe(|| task.tick(&mut cx)));
            if let Err(payload) = ticked {
                error!("Task '{}' panicked while ticking.", id);
                task.state_mut().set_error(TaskError::from_panic(payload.as_ref()), now);
            }
        }
        self.remove_finished_tasks();
    }

    /// Asks every cancelable running task to stop. Returns how many were asked.
    pub fn cancel(&mut self) -> usize {
        let mut canceled = 0;
        for (id, task) in self.tasks.iter_mut() {
            if task.state().status() == TaskStatus::Running && task.is_cancelable() && task.cancel() {
                info!("Task '{}' canceling.", id);
                canceled += 1;
            }
        }
        canceled
    }

    pub fn cancel_task(&mut self, id: TaskId) -> Result<bool> {
        let task = self.tasks.get_mut(&id).ok_or(Error::UnknownTask(id))?;
        Ok(task.cancel())
    }

    /// Removes a finished task. Removing an unfinished one is refused: its
    /// worker would be left without an owner.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Box<dyn Task<C>>> {
        let task = self.tasks.get(&id).ok_or(Error::UnknownTask(id))?;
        let state = task.state();
        if !state.is_finished() {
            return Err(Error::TaskNotFinished {
                id,
                label: state.label().to_string(),
                status: state.status(),
            });
        }
        let removed = self.tasks.remove(&id).ok_or(Error::UnknownTask(id))?;
        info!("Task '{}' removed.", id);
        self.notifier.task_changed(None);
        Ok(removed)
    }

    pub fn remove_finished_tasks(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, task)| self.is_expired(task.state(), now))
            .map(|(id, _)| *id)
            .collect();

        let mut removed = 0;
        for id in expired {
            match self.remove_task(id) {
                Ok(_) => removed += 1,
                Err(e) => error!("Could not collect task '{}': {}", id, e),
            }
        }
        removed
    }

    pub(crate) fn set_pump_stopped(&mut self, stopped: bool) {
        self.pump_stopped = stopped;
    }

    fn is_retained(&self, state: &TaskState) -> bool {
        state.status() == TaskStatus::Error && self.config.retain_failed_tasks
    }

    fn is_expired(&self, state: &TaskState, now: Instant) -> bool {
        if self.is_retained(state) {
            return false;
        }
        match state.finished_at() {
            Some(finished) if state.is_finished() => {
                now.saturating_duration_since(finished) > self.config.keep_finished_task_timeout
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True when ticking can no longer change anything: every remaining
    /// task is a failure kept for inspection.
    pub fn is_drained(&self) -> bool {
        self.tasks.values().all(|t| self.is_retained(t.state()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| !t.state().is_finished()).count()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskState> {
        self.tasks.get(&id).map(|t| t.state())
    }

    pub fn task(&self, id: TaskId) -> Option<&dyn Task<C>> {
        self.tasks.get(&id).map(|t| t.as_ref())
    }

    /// Registered tasks in id order.
    pub fn states(&self) -> impl Iterator<Item = (TaskId, &TaskState)> + '_ {
        self.tasks.iter().map(|(id, task)| (*id, task.state()))
    }
}

impl<C> Default for TaskRunner<C> {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        manager::clock::ManualClock,
        models::message::WorkerMessage,
        worker::cancel::CancelHandle,
    };
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use std::cell::{Cell, RefCell};

    /// Task fed by hand through a channel instead of a worker thread.
    struct ScriptedTask {
        state: TaskState,
        feed: Receiver<WorkerMessage>,
        cancel_requests: Rc<Cell<u32>>,
        cancelable: bool,
    }

    impl CancelHandle for ScriptedTask {
        fn request_cancel(&self) {
            self.cancel_requests.set(self.cancel_requests.get() + 1);
        }
    }

    impl Task<()> for ScriptedTask {
        fn state(&self) -> &TaskState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut TaskState {
            &mut self.state
        }

        fn run(&mut self, _cx: &mut TickContext<'_, ()>) -> Result<()> {
            self.state.start()
        }

        fn tick(&mut self, cx: &mut TickContext<'_, ()>) {
            for message in self.feed.try_iter() {
                if let Some(crate::TaskUpdate::Progress(p)) = self.state.apply(message, cx.now) {
                    self.state.set_progress(Some(p));
                }
            }
        }

        fn canceller(&self) -> Option<&dyn CancelHandle> {
            if self.cancelable {
                Some(self)
            } else {
                None
            }
        }
    }

    fn scripted(label: &str, cancelable: bool) -> (ScriptedTask, Sender<WorkerMessage>, Rc<Cell<u32>>) {
        let (tx, rx) = unbounded();
        let requests = Rc::new(Cell::new(0));
        let task = ScriptedTask {
            state: TaskState::new(label),
            feed: rx,
            cancel_requests: requests.clone(),
            cancelable,
        };
        (task, tx, requests)
    }

    fn runner() -> (TaskRunner<()>, ManualClock) {
        let clock = ManualClock::new();
        let runner = TaskRunner::new(RunnerConfig::default()).with_clock(Rc::new(clock.clone()));
        (runner, clock)
    }

    #[test]
    fn ids_are_never_reused() {
        let (mut runner, clock) = runner();
        let (task, tx, _) = scripted("first", false);
        let first = runner.add_task(&mut (), task);
        tx.send(WorkerMessage::Done).unwrap();
        runner.tick(&mut ());
        clock.advance(Duration::from_secs(3));
        runner.tick(&mut ());
        assert!(runner.is_empty());

        let (task, _tx, _) = scripted("second", false);
        let second = runner.add_task(&mut (), task);
        assert!(second > first);
    }

    #[test]
    fn shared_id_generator_spans_runners() {
        let ids = IdGenerator::new();
        let mut a: TaskRunner<()> = TaskRunner::default().with_ids(ids.clone());
        let mut b: TaskRunner<()> = TaskRunner::default().with_ids(ids);
        let (t1, _tx1, _) = scripted("a", false);
        let (t2, _tx2, _) = scripted("b", false);
        assert_eq!(a.add_task(&mut (), t1), 0);
        assert_eq!(b.add_task(&mut (), t2), 1);
    }

    #[test]
    fn removing_a_running_task_fails_loudly() {
        let (mut runner, _) = runner();
        let (task, tx, _) = scripted("upload", false);
        let id = runner.add_task(&mut (), task);

        assert!(matches!(runner.remove_task(id), Err(Error::TaskNotFinished { .. })));
        assert!(runner.contains(id));

        tx.send(WorkerMessage::Done).unwrap();
        runner.tick(&mut ());
        assert!(runner.remove_task(id).is_ok());
        assert!(!runner.contains(id));
        assert!(matches!(runner.remove_task(id), Err(Error::UnknownTask(_))));
    }

    #[test]
    fn finished_tasks_stay_for_the_grace_period() {
        let (mut runner, clock) = runner();
        let (task, tx, _) = scripted("refresh", false);
        let id = runner.add_task(&mut (), task);
        tx.send(WorkerMessage::Done).unwrap();
        runner.tick(&mut ());
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Done);

        clock.advance(Duration::from_secs(2));
        runner.tick(&mut ());
        assert!(runner.contains(id), "kept while elapsed <= timeout");

        clock.advance(Duration::from_millis(1));
        runner.tick(&mut ());
        assert!(!runner.contains(id));
    }

    #[test]
    fn failed_tasks_can_be_retained() {
        let clock = ManualClock::new();
        let config = RunnerConfig {
            retain_failed_tasks: true,
            ..RunnerConfig::default()
        };
        let mut runner = TaskRunner::new(config).with_clock(Rc::new(clock.clone()));
        let (task, tx, _) = scripted("broken", false);
        let id = runner.add_task(&mut (), task);
        tx.send(WorkerMessage::Error(TaskError::new("Io", "reset"))).unwrap();
        runner.tick(&mut ());

        clock.advance(Duration::from_secs(60));
        runner.tick(&mut ());
        assert_eq!(runner.get(id).unwrap().error().unwrap().message(), "reset");
        assert!(runner.remove_task(id).is_ok());
    }

    #[test]
    fn empty_ticks_do_not_notify() {
        let (mut runner, _) = runner();
        let calls = Rc::new(Cell::new(0));
        {
            let calls = calls.clone();
            runner.subscribe(move |_: Option<&TaskState>| calls.set(calls.get() + 1));
        }
        let (task, _tx, _) = scripted("idle", false);
        let id = runner.add_task(&mut (), task);
        let after_run = calls.get();
        assert_eq!(after_run, 1, "Idle -> Running");

        for _ in 0..10 {
            runner.tick(&mut ());
        }
        assert_eq!(calls.get(), after_run);
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Running);
    }

    #[test]
    fn observers_see_changes_and_removals() {
        let (mut runner, clock) = runner();
        let seen: Rc<RefCell<Vec<Option<TaskStatus>>>> = Rc::default();
        {
            let seen = seen.clone();
            runner.subscribe(move |task: Option<&TaskState>| {
                seen.borrow_mut().push(task.map(|t| t.status()))
            });
        }
        let (task, tx, _) = scripted("publish", false);
        runner.add_task(&mut (), task);
        tx.send(WorkerMessage::Done).unwrap();
        runner.tick(&mut ());
        clock.advance(Duration::from_secs(5));
        runner.tick(&mut ());

        assert_eq!(
            *seen.borrow(),
            [Some(TaskStatus::Running), Some(TaskStatus::Done), None]
        );
    }

    #[test]
    fn queue_started_fires_for_the_first_active_task_only() {
        struct StartCounter(Rc<Cell<u32>>);
        impl TaskObserver for StartCounter {
            fn task_changed(&mut self, _: Option<&TaskState>) {}
            fn queue_started(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let (mut runner, _) = runner();
        let starts = Rc::new(Cell::new(0));
        runner.subscribe(StartCounter(starts.clone()));

        let (a, tx_a, _) = scripted("a", false);
        let (b, _tx_b, _) = scripted("b", false);
        runner.add_task(&mut (), a);
        runner.add_task(&mut (), b);
        assert_eq!(starts.get(), 1);

        tx_a.send(WorkerMessage::Done).unwrap();
        runner.tick(&mut ());
        let (c, _tx_c, _) = scripted("c", false);
        runner.add_task(&mut (), c);
        assert_eq!(starts.get(), 1, "b is still active");

        runner.set_pump_stopped(true);
        let (d, _tx_d, _) = scripted("d", false);
        runner.add_task(&mut (), d);
        assert_eq!(starts.get(), 2, "nothing polls b any more");
        let (e, _tx_e, _) = scripted("e", false);
        runner.add_task(&mut (), e);
        assert_eq!(starts.get(), 2);
    }

    #[test]
    fn retained_failures_leave_the_registry_drained() {
        let clock = ManualClock::new();
        let mut runner = TaskRunner::new(RunnerConfig {
            keep_finished_task_timeout: Duration::from_secs(1),
            retain_failed_tasks: true,
        })
        .with_clock(Rc::new(clock.clone()));
        assert!(runner.is_drained());

        let (failing, tx_fail, _) = scripted("failing", false);
        let (ok, tx_ok, _) = scripted("ok", false);
        let failing_id = runner.add_task(&mut (), failing);
        runner.add_task(&mut (), ok);
        assert!(!runner.is_drained());

        tx_fail
            .send(WorkerMessage::Error(TaskError::new("Other", "boom")))
            .unwrap();
        tx_ok.send(WorkerMessage::Done).unwrap();
        runner.tick(&mut ());
        assert!(!runner.is_drained(), "done task awaits collection");

        clock.advance(Duration::from_secs(2));
        runner.tick(&mut ());
        assert_eq!(runner.len(), 1);
        assert!(runner.contains(failing_id));
        assert!(runner.is_drained());
    }

    #[test]
    fn cancel_only_reaches_cancelable_running_tasks() {
        let (mut runner, _) = runner();
        let (plain, _tx1, plain_requests) = scripted("plain", false);
        let (cancelable, _tx2, requests) = scripted("cancelable", true);
        let plain_id = runner.add_task(&mut (), plain);
        let id = runner.add_task(&mut (), cancelable);

        assert_eq!(runner.cancel(), 1);
        assert_eq!(requests.get(), 1);
        assert_eq!(plain_requests.get(), 0);
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Canceling);
        assert_eq!(runner.get(plain_id).unwrap().status(), TaskStatus::Running);

        assert_eq!(runner.cancel(), 0, "already canceling");
    }

    #[test]
    fn done_observed_before_cancel_wins() {
        let (mut runner, _) = runner();
        let (task, tx, _) = scripted("race", true);
        let id = runner.add_task(&mut (), task);

        tx.send(WorkerMessage::Done).unwrap();
        assert!(runner.cancel_task(id).unwrap());
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Canceling);

        runner.tick(&mut ());
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Done);
    }

    #[test]
    fn failing_setup_ends_in_error() {
        struct BrokenSetup(TaskState);
        impl Task<()> for BrokenSetup {
            fn state(&self) -> &TaskState {
                &self.0
            }
            fn state_mut(&mut self) -> &mut TaskState {
                &mut self.0
            }
            fn run(&mut self, _: &mut TickContext<'_, ()>) -> Result<()> {
                self.0.start()?;
                Err(Error::Host("no scene".into()))
            }
            fn tick(&mut self, _: &mut TickContext<'_, ()>) {}
        }

        let (mut runner, _) = runner();
        let id = runner.add_task(&mut (), BrokenSetup(TaskState::new("export")));
        let state = runner.get(id).unwrap();
        assert_eq!(state.status(), TaskStatus::Error);
        assert_eq!(state.error().unwrap().kind(), "Host");
    }

    #[test]
    fn a_panicking_tick_only_fails_its_own_task() {
        struct Explodes(TaskState);
        impl Task<()> for Explodes {
            fn state(&self) -> &TaskState {
                &self.0
            }
            fn state_mut(&mut self) -> &mut TaskState {
                &mut self.0
            }
            fn run(&mut self, _: &mut TickContext<'_, ()>) -> Result<()> {
                self.0.start()
            }
            fn tick(&mut self, _: &mut TickContext<'_, ()>) {
                panic!("callback failed");
            }
        }

        let (mut runner, _) = runner();
        let bad = runner.add_task(&mut (), Explodes(TaskState::new("bad")));
        let (good, tx, _) = scripted("good", false);
        let good = runner.add_task(&mut (), good);
        tx.send(WorkerMessage::Done).unwrap();

        runner.tick(&mut ());
        assert_eq!(runner.get(bad).unwrap().status(), TaskStatus::Error);
        assert_eq!(runner.get(good).unwrap().status(), TaskStatus::Done);
    }
}
