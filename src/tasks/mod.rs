//! Concrete tasks: one worker thread each, results delivered to the host
//! on the controlling thread during `tick`.

mod assets;
mod fn_task;
mod project;
mod publish;
mod refresh;

#[cfg(test)]
pub(crate) mod fake;

use std::time::{Duration, Instant};

pub use assets::UploadAssetsTask;
pub use fn_task::{FnTask, Job};
pub use project::{CreateProjectTask, CreateSceneTask};
pub use publish::PublishSceneTask;
pub use refresh::{RefreshAllTask, PLUGIN_NAME};

/// Limits how often streamed progress reaches observers.
#[derive(Debug, Clone)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub(crate) fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// True for the first call and then once more than `interval` passed.
    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        let ready = self
            .last
            .map_or(true, |last| now.saturating_duration_since(last) > self.interval);
        if ready {
            self.last = Some(now);
        }
        ready
    }
}
