//! In-memory `ProjectApi` for task tests.

use std::{
    fs,
    path::Path,
    sync::Mutex,
    thread,
    time::{Duration, Instant},
};

use crate::{
    client::{Asset, ClientError, PluginRelease, Project, ProgressFn, ProjectApi, SceneRef, Team},
    manager::task_runner::TaskRunner,
};

#[derive(Default)]
struct FakeState {
    teams: Vec<Team>,
    assets: Vec<Asset>,
    calls: Vec<String>,
    uploaded: Vec<(String, usize)>,
    next_id: u32,
}

pub(crate) struct FakeProject {
    state: Mutex<FakeState>,
    release: Option<PluginRelease>,
    fail_on: Option<&'static str>,
    chunks: u64,
    chunk_delay: Duration,
}

impl FakeProject {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            release: None,
            fail_on: None,
            chunks: 4,
            chunk_delay: Duration::ZERO,
        }
    }

    /// One team `t1` holding project `p1` with scene `s1`.
    pub(crate) fn with_sample_listing(self) -> Self {
        self.state.lock().unwrap().teams = vec![Team {
            id: "t1".into(),
            title: "Studio".into(),
            projects: vec![Project {
                id: "p1".into(),
                title: "Pilot".into(),
                scenes: vec![SceneRef {
                    id: "s1".into(),
                    title: "Opening".into(),
                    json_url: Some("https://fake/s1.json".into()),
                }],
            }],
        }];
        self
    }

    pub(crate) fn with_assets(self, assets: Vec<Asset>) -> Self {
        self.state.lock().unwrap().assets = assets;
        self
    }

    pub(crate) fn with_release(mut self, version: &str) -> Self {
        self.release = Some(PluginRelease {
            version: version.into(),
            download_url: format!("https://fake/previz-{}.zip", version),
        });
        self
    }

    /// Makes every call named `method` fail with HTTP 500.
    pub(crate) fn failing_on(mut self, method: &'static str) -> Self {
        self.fail_on = Some(method);
        self
    }

    pub(crate) fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn uploaded(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().uploaded.clone()
    }

    fn record(&self, method: &'static str, detail: &str) -> Result<(), ClientError> {
        self.state.lock().unwrap().calls.push(format!("{} {}", method, detail));
        if self.fail_on == Some(method) {
            return Err(ClientError::Status {
                method: method.into(),
                url: format!("https://fake/{}", detail),
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(())
    }

    fn stream(&self, path: &Path, mut on_progress: ProgressFn) -> Result<usize, ClientError> {
        let bytes = fs::read(path).map_err(|source| ClientError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let total = bytes.len() as u64;
        for chunk in 1..=self.chunks {
            thread::sleep(self.chunk_delay);
            if on_progress(total * chunk / self.chunks, total).is_break() {
                return Err(ClientError::Canceled);
            }
        }
        Ok(bytes.len())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }
}

impl ProjectApi for FakeProject {
    fn get_all(&self) -> Result<Vec<Team>, ClientError> {
        self.record("get_all", "teams")?;
        Ok(self.state.lock().unwrap().teams.clone())
    }

    fn updated_plugin(&self, plugin: &str, version: &str) -> Result<Option<PluginRelease>, ClientError> {
        self.record("updated_plugin", &format!("{}/{}", plugin, version))?;
        Ok(self.release.clone())
    }

    fn new_project(&self, name: &str, team_id: &str) -> Result<Project, ClientError> {
        self.record("new_project", name)?;
        let project = Project {
            id: self.next_id("project"),
            title: name.into(),
            scenes: Vec::new(),
        };
        let mut state = self.state.lock().unwrap();
        if let Some(team) = state.teams.iter_mut().find(|t| t.id == team_id) {
            team.projects.push(project.clone());
        }
        Ok(project)
    }

    fn new_scene(&self, project_id: &str, name: &str) -> Result<SceneRef, ClientError> {
        self.record("new_scene", name)?;
        let id = self.next_id("scene");
        let scene = SceneRef {
            json_url: Some(format!("https://fake/{}.json", id)),
            id,
            title: name.into(),
        };
        let mut state = self.state.lock().unwrap();
        for team in state.teams.iter_mut() {
            if let Some(project) = team.projects.iter_mut().find(|p| p.id == project_id) {
                project.scenes.push(scene.clone());
            }
        }
        Ok(scene)
    }

    fn scene(&self, project_id: &str, scene_id: &str) -> Result<SceneRef, ClientError> {
        self.record("scene", scene_id)?;
        let state = self.state.lock().unwrap();
        state
            .teams
            .iter()
            .find_map(|t| t.project(project_id)?.scene(scene_id).cloned())
            .ok_or_else(|| ClientError::Status {
                method: "GET".into(),
                url: format!("https://fake/projects/{}/scenes/{}", project_id, scene_id),
                status: 404,
                body: "not found".into(),
            })
    }

    fn update_scene(&self, url: &str, path: &Path, on_progress: ProgressFn) -> Result<(), ClientError> {
        self.record("update_scene", url)?;
        let size = self.stream(path, on_progress)?;
        self.state.lock().unwrap().uploaded.push((url.to_string(), size));
        Ok(())
    }

    fn assets(&self, project_id: &str) -> Result<Vec<Asset>, ClientError> {
        self.record("assets", project_id)?;
        Ok(self.state.lock().unwrap().assets.clone())
    }

    fn upload_asset(&self, _project_id: &str, path: &Path, on_progress: ProgressFn) -> Result<Asset, ClientError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record("upload_asset", &name)?;
        let size = self.stream(path, on_progress)?;
        let asset = Asset {
            id: self.next_id("asset"),
            name: name.clone(),
            url: None,
        };
        let mut state = self.state.lock().unwrap();
        state.uploaded.push((name, size));
        state.assets.push(asset.clone());
        Ok(asset)
    }

    fn delete_asset(&self, _project_id: &str, asset_id: &str) -> Result<(), ClientError> {
        self.record("delete_asset", asset_id)?;
        self.state.lock().unwrap().assets.retain(|a| a.id != asset_id);
        Ok(())
    }

    fn set_state(&self, project_id: &str, state: &str) -> Result<(), ClientError> {
        self.record("set_state", &format!("{}={}", project_id, state))
    }
}

/// Ticks `runner` until `done` holds, failing the test after five seconds.
pub(crate) fn tick_until<C>(runner: &mut TaskRunner<C>, host: &mut C, mut done: impl FnMut(&TaskRunner<C>) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        runner.tick(host);
        if done(runner) {
            return;
        }
        assert!(Instant::now() < deadline, "runner did not settle in time");
        thread::sleep(Duration::from_millis(2));
    }
}
