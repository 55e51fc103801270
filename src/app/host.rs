use std::{
    fs,
    path::{Path, PathBuf},
};

use previz_queue::{
    client::{PluginRelease, Project, SceneRef, Team},
    exporter::{SceneSnapshot, SceneSource},
    Error, Result,
};

/// Host state of the command-line front end: the scene snapshot to export
/// and the active team/project/scene selection.
#[derive(Debug, Default)]
pub struct PrevizHost {
    snapshot: Option<PathBuf>,
    teams: Vec<Team>,
    team_id: Option<String>,
    project_id: Option<String>,
    scene_id: Option<String>,
    release: Option<PluginRelease>,
}

impl PrevizHost {
    pub fn new(snapshot: Option<PathBuf>) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    pub fn set_snapshot(&mut self, path: impl Into<PathBuf>) {
        self.snapshot = Some(path.into());
    }

    pub fn is_refreshed(&self) -> bool {
        !self.teams.is_empty()
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Replaces the listing and keeps the selection when it still exists,
    /// falling back to the first team/project/scene otherwise.
    pub fn set_teams(&mut self, teams: Vec<Team>) {
        self.teams = teams;
        let team = self
            .team_id
            .as_deref()
            .and_then(|id| self.teams.iter().find(|t| t.id == id))
            .or_else(|| self.teams.first());
        self.team_id = team.map(|t| t.id.clone());

        let project_id = self.project_id.clone();
        self.select_project(project_id.as_deref());
    }

    pub fn team(&self) -> Option<&Team> {
        let id = self.team_id.as_deref()?;
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn project(&self) -> Option<&Project> {
        self.team()?.project(self.project_id.as_deref()?)
    }

    pub fn scene(&self) -> Option<&SceneRef> {
        self.project()?.scene(self.scene_id.as_deref()?)
    }

    pub fn select_project(&mut self, id: Option<&str>) {
        let project = self.team().and_then(|team| {
            id.and_then(|id| team.project(id))
                .or_else(|| team.projects.first())
        });
        self.project_id = project.map(|p| p.id.clone());

        let scene_id = self.scene_id.clone();
        self.select_scene(scene_id.as_deref());
    }

    pub fn select_scene(&mut self, id: Option<&str>) {
        let scene = self.project().and_then(|project| {
            id.and_then(|id| project.scene(id))
                .or_else(|| project.scenes.first())
        });
        self.scene_id = scene.map(|s| s.id.clone());
    }

    pub fn set_release(&mut self, release: Option<PluginRelease>) {
        self.release = release;
    }

    pub fn release(&self) -> Option<&PluginRelease> {
        self.release.as_ref()
    }
}

pub fn read_snapshot(path: &Path) -> Result<SceneSnapshot> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| Error::Host(format!("invalid snapshot {}: {}", path.display(), e)))
}

impl SceneSource for PrevizHost {
    fn build_scene(&self) -> Result<SceneSnapshot> {
        let path = self
            .snapshot
            .as_deref()
            .ok_or_else(|| Error::Host("no scene snapshot loaded".to_string()))?;
        read_snapshot(path)
    }
}
