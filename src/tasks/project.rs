use std::sync::Arc;

use log::{debug, warn};

use crate::{
    client::{Project, ProjectApi, SceneRef, Team},
    error::Result,
    models::{
        message::TaskUpdate,
        task::{Task, TaskState, TickContext},
    },
    worker::worker::WorkerBridge,
};

type ProjectCallback<C> = Box<dyn FnMut(&mut C, Vec<Team>, Project)>;
type SceneCallback<C> = Box<dyn FnMut(&mut C, Vec<Team>, SceneRef)>;

/// Creates a project in a team, then reloads the listing so the host can
/// select it.
pub struct CreateProjectTask<C> {
    state: TaskState,
    bridge: WorkerBridge,
    api: Arc<dyn ProjectApi>,
    name: String,
    team_id: String,
    project: Option<Project>,
    on_done: Option<ProjectCallback<C>>,
}

impl<C> CreateProjectTask<C> {
    pub fn new(api: Arc<dyn ProjectApi>, name: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            state: TaskState::new("New project"),
            bridge: WorkerBridge::new("new-project"),
            api,
            name: name.into(),
            team_id: team_id.into(),
            project: None,
            on_done: None,
        }
    }

    pub fn on_done(mut self, callback: impl FnMut(&mut C, Vec<Team>, Project) + 'static) -> Self {
        self.on_done = Some(Box::new(callback));
        self
    }
}

impl<C> Task<C> for CreateProjectTask<C> {
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
        let name = self.name.clone();
        let team_id = self.team_id.clone();
        self.bridge.start(move |worker| {
            worker.update(TaskUpdate::Project(api.new_project(&name, &team_id)?));
            worker.update(TaskUpdate::Teams(api.get_all()?));
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
                TaskUpdate::Project(project) => self.project = Some(project),
                TaskUpdate::Teams(teams) => match (self.project.take(), self.on_done.as_mut()) {
                    (Some(project), Some(callback)) => callback(&mut *cx.host, teams, project),
                    (None, _) => warn!("Listing arrived before the new project."),
                    _ => {}
                },
                other => debug!("New project ignoring {} update.", other.name()),
            }
        }
    }
}

/// Creates a scene in a project, then reloads the listing.
pub struct CreateSceneTask<C> {
    state: TaskState,
    bridge: WorkerBridge,
    api: Arc<dyn ProjectApi>,
    name: String,
    project_id: String,
    scene: Option<SceneRef>,
    on_done: Option<SceneCallback<C>>,
}

impl<C> CreateSceneTask<C> {
    pub fn new(api: Arc<dyn ProjectApi>, name: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            state: TaskState::new("New scene"),
            bridge: WorkerBridge::new("new-scene"),
            api,
            name: name.into(),
            project_id: project_id.into(),
            scene: None,
            on_done: None,
        }
    }

    pub fn on_done(mut self, callback: impl FnMut(&mut C, Vec<Team>, SceneRef) + 'static) -> Self {
        self.on_done = Some(Box::new(callback));
        self
    }
}

impl<C> Task<C> for CreateSceneTask<C> {
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
        let name = self.name.clone();
        let project_id = self.project_id.clone();
        self.bridge.start(move |worker| {
            worker.update(TaskUpdate::Scene(api.new_scene(&project_id, &name)?));
            worker.update(TaskUpdate::Teams(api.get_all()?));
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
                TaskUpdate::Scene(scene) => self.scene = Some(scene),
                TaskUpdate::Teams(teams) => match (self.scene.take(), self.on_done.as_mut()) {
                    (Some(scene), Some(callback)) => callback(&mut *cx.host, teams, scene),
                    (None, _) => warn!("Listing arrived before the new scene."),
                    _ => {}
                },
                other => debug!("New scene ignoring {} update.", other.name()),
            }
        }
    }
}
