use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use log::info;
use previz_queue::{
    client::{PrevizProject, ProjectApi},
    settings::Settings,
    tasks::{CreateProjectTask, CreateSceneTask, FnTask, PublishSceneTask, RefreshAllTask, UploadAssetsTask},
    QueuePump, TaskRunner,
};

use crate::app::host::PrevizHost;

/// Everything a front end needs to queue Previz work: the client, the
/// runner and its pump, and the host state tasks report into.
pub struct Session {
    pub settings: Settings,
    pub api: Arc<dyn ProjectApi>,
    pub runner: TaskRunner<PrevizHost>,
    pub pump: QueuePump,
    pub host: PrevizHost,
}

impl Session {
    pub fn new(settings: Settings, snapshot: Option<PathBuf>) -> anyhow::Result<Self> {
        let api = PrevizProject::new(settings.api_root.clone(), settings.api_token.clone())
            .context("failed to create the Previz client")?;
        if settings.api_token.is_empty() {
            info!("No API token configured; remote calls will be rejected.");
        }
        Ok(Self {
            api: Arc::new(api),
            runner: TaskRunner::new(settings.runner_config()),
            pump: QueuePump::new(settings.pump_config()),
            host: PrevizHost::new(snapshot),
            settings,
        })
    }

    pub fn refresh_task(&self) -> RefreshAllTask<PrevizHost> {
        RefreshAllTask::new(self.api.clone(), env!("CARGO_PKG_VERSION"))
            .on_get_all(|host: &mut PrevizHost, teams| host.set_teams(teams))
            .on_updated_plugin(|host: &mut PrevizHost, release| {
                if let Some(release) = &release {
                    println!("\rPlugin {} is available: {}", release.version, release.download_url);
                }
                host.set_release(release);
            })
    }

    pub fn new_project_task(&self, name: &str, team_id: &str) -> CreateProjectTask<PrevizHost> {
        CreateProjectTask::new(self.api.clone(), name, team_id).on_done(|host: &mut PrevizHost, teams, project| {
            println!("\rCreated project {} ({})", project.title, project.id);
            host.set_teams(teams);
            host.select_project(Some(project.id.as_str()));
        })
    }

    pub fn new_scene_task(&self, name: &str, project_id: &str) -> CreateSceneTask<PrevizHost> {
        CreateSceneTask::new(self.api.clone(), name, project_id).on_done(|host: &mut PrevizHost, teams, scene| {
            println!("\rCreated scene {} ({})", scene.title, scene.id);
            host.set_teams(teams);
            host.select_scene(Some(scene.id.as_str()));
        })
    }

    pub fn publish_task(&self, project_id: &str, scene_id: &str) -> PublishSceneTask {
        PublishSceneTask::new(
            self.api.clone(),
            project_id,
            scene_id,
            self.settings.export_path(scene_id),
        )
        .with_cleanup(self.settings.cleanup_export)
        .with_progress_interval(self.settings.progress_notify_interval())
    }

    pub fn upload_task(&self, project_id: &str, files: Vec<PathBuf>) -> UploadAssetsTask<PrevizHost> {
        UploadAssetsTask::new(self.api.clone(), project_id, files)
            .with_progress_interval(self.settings.progress_notify_interval())
            .on_asset(|_: &mut PrevizHost, asset| println!("\rUploaded asset {} ({})", asset.name, asset.id))
    }

    pub fn set_state_task(&self, project_id: &str, state: &str) -> FnTask {
        let api = self.api.clone();
        let project_id = project_id.to_string();
        let state = state.to_string();
        FnTask::new("Set project state", move |_| {
            api.set_state(&project_id, &state)?;
            Ok(())
        })
    }

    /// Placeholder work that only sleeps, for trying out cancellation.
    pub fn sleep_task(&self, duration: Duration) -> FnTask {
        FnTask::new(format!("Sleep {:?}", duration), move |worker| {
            let steps = 20u32;
            for step in 1..=steps {
                worker.sleep(duration / steps)?;
                worker.progress(f64::from(step) / f64::from(steps));
            }
            Ok(())
        })
    }
}
