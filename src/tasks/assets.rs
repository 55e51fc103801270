use std::{ops::ControlFlow, path::PathBuf, sync::Arc, time::Duration};

use log::{debug, info};

use crate::{
    client::{Asset, ProgressFn, ProjectApi},
    error::Result,
    models::{
        message::{TaskUpdate, WorkerMessage},
        task::{Task, TaskState, TickContext},
    },
    tasks::ProgressThrottle,
    worker::{cancel::CancelHandle, worker::WorkerBridge},
};

type AssetCallback<C> = Box<dyn FnMut(&mut C, Asset)>;

/// Replaces a project's assets with local files of the same name.
///
/// Remote assets whose name matches a local file are deleted first, then
/// every file is uploaded in order. Cancellation is polled between calls
/// and at every uploaded chunk.
pub struct UploadAssetsTask<C> {
    state: TaskState,
    bridge: WorkerBridge,
    api: Arc<dyn ProjectApi>,
    project_id: String,
    paths: Vec<PathBuf>,
    throttle: ProgressThrottle,
    on_asset: Option<AssetCallback<C>>,
}

impl<C> UploadAssetsTask<C> {
    pub fn new(api: Arc<dyn ProjectApi>, project_id: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            state: TaskState::new("Upload assets"),
            bridge: WorkerBridge::new("assets"),
            api,
            project_id: project_id.into(),
            paths,
            throttle: ProgressThrottle::new(Duration::from_millis(250)),
            on_asset: None,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.throttle.set_interval(interval);
        self
    }

    /// Called on the controlling thread for every uploaded asset.
    pub fn on_asset(mut self, callback: impl FnMut(&mut C, Asset) + 'static) -> Self {
        self.on_asset = Some(Box::new(callback));
        self
    }
}

fn file_name(path: &std::path::Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

impl<C> Task<C> for UploadAssetsTask<C> {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TaskState {
        &mut self.state
    }

    fn run(&mut self, _cx: &mut TickContext<'_, C>) -> Result<()> {
        self.state.start()?;
        self.state.set_progress(Some(0.0));

        let api = self.api.clone();
        let project_id = self.project_id.clone();
        let paths = self.paths.clone();
        self.bridge.start(move |worker| {
            let local: Vec<String> = paths.iter().filter_map(|p| file_name(p)).collect();
            for asset in api.assets(&project_id)? {
                if local.contains(&asset.name) {
                    worker.checkpoint()?;
                    info!("Deleting remote asset {} ({}).", asset.name, asset.id);
                    api.delete_asset(&project_id, &asset.id)?;
                }
            }

            let count = paths.len().max(1) as f64;
            for (index, path) in paths.iter().enumerate() {
                worker.checkpoint()?;
                let token = worker.cancel_token().clone();
                let reporter = worker.reporter().clone();
                let on_progress: ProgressFn = Box::new(move |read, total| {
                    if token.is_canceled() {
                        return ControlFlow::Break(());
                    }
                    let fraction = if total == 0 { 1.0 } else { read as f64 / total as f64 };
                    reporter.progress((index as f64 + fraction) / count);
                    ControlFlow::Continue(())
                });
                let asset = api.upload_asset(&project_id, path, on_progress)?;
                worker.update(TaskUpdate::Asset(asset));
            }
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
                Some(TaskUpdate::Asset(asset)) => {
                    if let Some(callback) = self.on_asset.as_mut() {
                        callback(&mut *cx.host, asset);
                    }
                }
                Some(other) => debug!("Asset upload ignoring {} update.", other.name()),
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
        manager::task_runner::TaskRunner,
        models::task::TaskStatus,
        tasks::fake::{tick_until, FakeProject},
    };
    use std::fs;

    fn local_files(dir: &std::path::Path) -> Vec<PathBuf> {
        ["crate.png", "floor.png"]
            .iter()
            .map(|name| {
                let path = dir.join(name);
                fs::write(&path, vec![1u8; 1024]).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn matching_remote_assets_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeProject::new().with_assets(vec![
            Asset { id: "a1".into(), name: "crate.png".into(), url: None },
            Asset { id: "a2".into(), name: "sky.hdr".into(), url: None },
        ]));
        let mut runner: TaskRunner<Vec<String>> = TaskRunner::default();
        let mut uploaded = Vec::new();
        let task = UploadAssetsTask::new(api.clone(), "p1", local_files(dir.path()))
            .on_asset(|names: &mut Vec<String>, asset| names.push(asset.name));
        let id = runner.add_task(&mut uploaded, task);

        tick_until(&mut runner, &mut uploaded, |r| r.get(id).map_or(true, |t| t.is_finished()));
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Done);
        assert_eq!(uploaded, ["crate.png", "floor.png"]);
        assert_eq!(
            api.calls(),
            ["assets p1", "delete_asset a1", "upload_asset crate.png", "upload_asset floor.png"]
        );
    }

    #[test]
    fn cancel_stops_before_the_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeProject::new().with_chunk_delay(Duration::from_millis(40)));
        let mut runner: TaskRunner<()> = TaskRunner::default();
        let id = runner.add_task(&mut (), UploadAssetsTask::new(api.clone(), "p1", local_files(dir.path())));

        runner.cancel();
        tick_until(&mut runner, &mut (), |r| r.get(id).map_or(true, |t| t.is_finished()));
        assert_eq!(runner.get(id).unwrap().status(), TaskStatus::Canceled);
        assert!(api.uploaded().is_empty());
    }
}
