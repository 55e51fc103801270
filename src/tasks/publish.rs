use std::{
    fs, io,
    ops::ControlFlow,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    client::{ClientError, ProgressFn, ProjectApi},
    error::Result,
    exporter::{self, SceneSource},
    models::{
        message::{TaskUpdate, WorkerMessage},
        task::{Task, TaskState, TickContext},
    },
    tasks::ProgressThrottle,
    worker::{cancel::CancelHandle, worker::WorkerBridge},
};

/// Exports the host scene and uploads it as the JSON of an existing scene.
///
/// The export runs synchronously on the controlling thread; only the upload
/// runs on the worker, which polls for cancellation at every chunk.
pub struct PublishSceneTask {
    state: TaskState,
    bridge: WorkerBridge,
    api: Arc<dyn ProjectApi>,
    project_id: String,
    scene_id: String,
    export_path: PathBuf,
    cleanup: bool,
    cleaned: bool,
    throttle: ProgressThrottle,
}

impl PublishSceneTask {
    pub fn new(
        api: Arc<dyn ProjectApi>,
        project_id: impl Into<String>,
        scene_id: impl Into<String>,
        export_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state: TaskState::new("Publish scene"),
            bridge: WorkerBridge::new("publish"),
            api,
            project_id: project_id.into(),
            scene_id: scene_id.into(),
            export_path: export_path.into(),
            cleanup: true,
            cleaned: false,
            throttle: ProgressThrottle::new(Duration::from_millis(250)),
        }
    }

    /// Keep the exported file after the task finishes when `false`.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.throttle.set_interval(interval);
        self
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    fn remove_export(&mut self) {
        if !self.cleanup || self.cleaned {
            return;
        }
        self.cleaned = true;
        match fs::remove_file(&self.export_path) {
            Ok(()) => debug!("Removed export {}.", self.export_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove export {}: {}", self.export_path.display(), e),
        }
    }
}

impl<C: SceneSource> Task<C> for PublishSceneTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TaskState {
        &mut self.state
    }

    fn run(&mut self, cx: &mut TickContext<'_, C>) -> Result<()> {
        self.state.start()?;
        self.state.set_progress(Some(0.0));

        self.state.set_label("Exporting scene");
        let scene = cx.host.build_scene()?;
        exporter::export_to_path(&scene, &self.export_path)?;

        self.state.set_label("Publishing scene");
        let api = self.api.clone();
        let project_id = self.project_id.clone();
        let scene_id = self.scene_id.clone();
        let path = self.export_path.clone();
        self.bridge.start(move |worker| {
            let url = api
                .scene(&project_id, &scene_id)?
                .json_url
                .ok_or_else(|| ClientError::MissingSceneUrl(scene_id.clone()))?;
            worker.checkpoint()?;

            let token = worker.cancel_token().clone();
            let reporter = worker.reporter().clone();
            let on_progress: ProgressFn = Box::new(move |read, total| {
                if token.is_canceled() {
                    return ControlFlow::Break(());
                }
                reporter.progress(if total == 0 { 1.0 } else { read as f64 / total as f64 });
                ControlFlow::Continue(())
            });
            api.update_scene(&url, &path, on_progress)?;
            info!("Scene {} published.", scene_id);
            Ok(())
        })
    }

    fn tick(&mut self, cx: &mut TickContext<'_, C>) {
        for message in self.bridge.drain() {
            if matches!(message, WorkerMessage::Done) && !self.state.is_finished() {
                self.state.set_progress(Some(1.0));
            }
            match self.state.apply(message, cx.now) {
                Some(TaskUpdate::Progress(p)) => {
                    if self.throttle.ready(cx.now) {
                        self.state.set_progress(Some(p));
                    }
                }
                Some(other) => debug!("Publish ignoring {} update.", other.name()),
                None => {}
            }
        }
        if self.state.is_finished() {
            self.remove_export();
        }
    }

    fn canceller(&self) -> Option<&dyn CancelHandle> {
        Some(&self.bridge)
    }
}
