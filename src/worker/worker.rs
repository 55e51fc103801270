use std::{
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::{
    error::{Error, Result},
    models::{
        error::{TaskError, WorkerError},
        message::{ControlMessage, TaskUpdate, WorkerMessage},
    },
    worker::cancel::{CancelHandle, CancelToken, Reporter},
};

/// What a job sees from inside its worker thread.
pub struct WorkerContext {
    token: CancelToken,
    reporter: Reporter,
}

impl WorkerContext {
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn update(&self, update: TaskUpdate) {
        self.reporter.update(update);
    }

    pub fn progress(&self, fraction: f64) {
        self.reporter.progress(fraction);
    }

    /// Cancellation point: `Err(WorkerError::Canceled)` once a cancel
    /// request is pending.
    pub fn checkpoint(&self) -> Result<(), WorkerError> {
        self.token.check()
    }

    pub fn sleep(&self, duration: Duration) -> Result<(), WorkerError> {
        self.token.wait(duration)
    }
}

struct WorkerEndpoints {
    inbox: Receiver<ControlMessage>,
    outbox: Sender<WorkerMessage>,
}

/// One dedicated worker thread plus the two queues connecting it to its task.
///
/// Queues are created with the bridge so a task can be canceled (and its
/// queue drained) before or after the thread exists. The thread is started
/// once and never reused.
pub struct WorkerBridge {
    name: String,
    to_worker: Sender<ControlMessage>,
    to_main: Receiver<WorkerMessage>,
    endpoints: Option<WorkerEndpoints>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerBridge {
    pub fn new(name: impl Into<String>) -> Self {
        let (to_worker, inbox) = unbounded();
        let (outbox, to_main) = unbounded();
        Self {
            name: name.into(),
            to_worker,
            to_main,
            endpoints: Some(WorkerEndpoints { inbox, outbox }),
            handle: None,
        }
    }

    /// Spawns the worker thread running `job`.
    ///
    /// Whatever the job does, exactly one terminal message is sent when it
    /// returns: `TASK_DONE` on `Ok`, `RESPOND_CANCELED` on a requested
    /// cancellation, `TASK_ERROR` on any other error or on a panic.
    pub fn start<F>(&mut self, job: F) -> Result<()>
    where
        F: FnOnce(&WorkerContext) -> Result<(), WorkerError> + Send + 'static,
    {
        let WorkerEndpoints { inbox, outbox } = self
            .endpoints
            .take()
            .ok_or_else(|| Error::WorkerAlreadyStarted(self.name.clone()))?;

        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("previz-{}", name))
            .spawn(move || {
                let context = WorkerContext {
                    token: CancelToken::new(inbox),
                    reporter: Reporter::new(outbox.clone()),
                };
                debug!("Worker '{}' started.", name);

                let result = panic::catch_unwind(AssertUnwindSafe(|| job(&context)));
                let message = terminal_message(result, &context.token);
                info!("Worker '{}' finished with {}.", name, message.kind());

                if outbox.send(message).is_err() {
                    error!("Worker '{}' could not deliver its result: task dropped.", name);
                }
            })
            .map_err(Error::Spawn)?;

        self.handle = Some(handle);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// True once the worker thread has exited. No message follows its exit.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| h.is_finished())
    }

    /// Non-blocking drain of the worker -> main queue, in send order.
    pub fn drain(&self) -> impl Iterator<Item = WorkerMessage> + '_ {
        self.to_main.try_iter()
    }
}

impl CancelHandle for WorkerBridge {
    fn request_cancel(&self) {
        info!("Requesting cancellation of worker '{}'.", self.name);
        if self.to_worker.send(ControlMessage::RequestCancel).is_err() {
            debug!("Worker '{}' already gone, cancel request dropped.", self.name);
        }
    }
}

fn terminal_message(
    result: thread::Result<Result<(), WorkerError>>,
    token: &CancelToken,
) -> WorkerMessage {
    match result {
        Ok(Ok(())) => WorkerMessage::Done,
        Ok(Err(WorkerError::Canceled)) if token.is_canceled() => WorkerMessage::Canceled,
        Ok(Err(e)) => WorkerMessage::Error(TaskError::from_worker_error(&e)),
        Err(payload) => WorkerMessage::Error(TaskError::from_panic(payload.as_ref())),
    }
}
