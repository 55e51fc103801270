use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::debug;

use crate::models::{
    error::WorkerError,
    message::{ControlMessage, TaskUpdate, WorkerMessage},
};

/// Controlling-side capability to ask a worker to stop.
pub trait CancelHandle {
    fn request_cancel(&self);
}

/// Worker-side view of the main -> worker queue.
///
/// Cancellation is cooperative: nothing happens until the worker checks the
/// token. Clones share the same queue and the same sticky flag, so the token
/// can be moved into a blocking call that polls it at each chunk.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inbox: Receiver<ControlMessage>,
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    pub(crate) fn new(inbox: Receiver<ControlMessage>) -> Self {
        Self {
            inbox,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drains pending control messages and reports whether cancellation was
    /// ever requested.
    pub fn is_canceled(&self) -> bool {
        for message in self.inbox.try_iter() {
            self.observe(message);
        }
        self.requested.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), WorkerError> {
        if self.is_canceled() {
            return Err(WorkerError::Canceled);
        }
        Ok(())
    }

    /// Maps the token onto a progress callback's return value.
    pub fn control_flow(&self) -> ControlFlow<()> {
        if self.is_canceled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Sleeps up to `timeout`, waking early on a cancel request.
    pub fn wait(&self, timeout: Duration) -> Result<(), WorkerError> {
        self.check()?;
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => {
                self.observe(message);
                self.check()
            }
            Err(RecvTimeoutError::Timeout) => Ok(()),
            // Controlling side is gone; nobody can ask us to stop anymore.
            Err(RecvTimeoutError::Disconnected) => Ok(()),
        }
    }

    fn observe(&self, message: ControlMessage) {
        match message {
            ControlMessage::RequestCancel => {
                debug!("Worker received cancel request");
                self.requested.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Sends `TASK_UPDATE` messages to the controlling side. It cannot send
/// terminal messages; those belong to the bridge.
#[derive(Debug, Clone)]
pub struct Reporter {
    outbox: Sender<WorkerMessage>,
}

impl Reporter {
    pub(crate) fn new(outbox: Sender<WorkerMessage>) -> Self {
        Self { outbox }
    }

    pub fn update(&self, update: TaskUpdate) {
        if self.outbox.send(WorkerMessage::Update(update)).is_err() {
            debug!("Controlling side dropped, update lost");
        }
    }

    pub fn progress(&self, fraction: f64) {
        self.update(TaskUpdate::Progress(fraction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    #[test]
    fn cancel_request_is_sticky() {
        let (tx, rx) = unbounded();
        let token = CancelToken::new(rx);
        assert!(!token.is_canceled());

        tx.send(ControlMessage::RequestCancel).unwrap();
        assert!(token.is_canceled());
        assert!(token.clone().is_canceled());
        assert!(matches!(token.check(), Err(WorkerError::Canceled)));
        assert_eq!(token.control_flow(), ControlFlow::Break(()));
    }

    #[test]
    fn wait_wakes_up_on_cancel() {
        let (tx, rx) = unbounded();
        let token = CancelToken::new(rx);
        tx.send(ControlMessage::RequestCancel).unwrap();

        let started = Instant::now();
        assert!(token.wait(Duration::from_secs(5)).is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_times_out_without_request() {
        let (_tx, rx) = unbounded();
        let token = CancelToken::new(rx);
        assert!(token.wait(Duration::from_millis(5)).is_ok());
    }
}
