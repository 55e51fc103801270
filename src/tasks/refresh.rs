use std::sync::Arc;

use log::debug;

use crate::{
    client::{PluginRelease, ProjectApi, Team},
    error::Result,
    models::{
        message::TaskUpdate,
        task::{Task, TaskState, TickContext},
    },
    worker::worker::WorkerBridge,
};

/// Plugin name the release check is made for.
pub const PLUGIN_NAME: &str = "blender";

type TeamsCallback<C> = Box<dyn FnMut(&mut C, Vec<Team>)>;
type ReleaseCallback<C> = Box<dyn FnMut(&mut C, Option<PluginRelease>)>;

/// Reloads the team/project/scene listing and checks for a newer plugin.
pub struct RefreshAllTask<C> {
    state: TaskState,
    bridge: WorkerBridge,
    api: Arc<dyn ProjectApi>,
    version: String,
    on_get_all: Option<TeamsCallback<C>>,
    on_updated_plugin: Option<ReleaseCallback<C>>,
}

impl<C> RefreshAllTask<C> {
    pub fn new(api: Arc<dyn ProjectApi>, version: impl Into<String>) -> Self {
        Self {
            state: TaskState::new("Refresh"),
            bridge: WorkerBridge::new("refresh"),
            api,
            version: version.into(),
            on_get_all: None,
            on_updated_plugin: None,
        }
    }

    pub fn on_get_all(mut self, callback: impl FnMut(&mut C, Vec<Team>) + 'static) -> Self {
        self.on_get_all = Some(Box::new(callback));
        self
    }

    pub fn on_updated_plugin(mut self, callback: impl FnMut(&mut C, Option<PluginRelease>) + 'static) -> Self {
        self.on_updated_plugin = Some(Box::new(callback));
        self
    }
}

impl<C> Task<C> for RefreshAllTask<C> {
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
        let version = self.version.clone();
        self.bridge.start(move |worker| {
            worker.update(TaskUpdate::Teams(api.get_all()?));
            worker.update(TaskUpdate::PluginRelease(api.updated_plugin(PLUGIN_NAME, &version)?));
            Ok(())
        })
    }

    fn tick(&mut self, cx: &mut TickContext<'_, C>) {
        for message in self.bridge.drain() {
            let Some(update) = self.state.apply(message, cx.now) else {
                continue;
            };
            let progress = self.state.progress().unwrap_or(0.0) + 0.5;
            self.state.set_progress(Some(progress));
            match update {
                TaskUpdate::Teams(teams) => {
                    if let Some(callback) = self.on_get_all.as_mut() {
                        callback(&mut *cx.host, teams);
                    }
                }
                TaskUpdate::PluginRelease(release) => {
                    if let Some(callback) = self.on_updated_plugin.as_mut() {
                        callback(&mut *cx.host, release);
                    }
                }
                other => debug!("Refresh ignoring {} update.", other.name()),
            }
        }
    }
}
