use std::{cell::RefCell, path::PathBuf, rc::Rc, time::Duration};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use previz_queue::{
    exporter, models::error::debug_info, settings::Settings, ExecutionMode, Task, TaskState, TaskStatus,
};

use crate::app::{host, host::PrevizHost, session::Session, shell};

#[derive(Parser)]
#[command(name = "previz", version, about = "Export scenes and publish them to Previz")]
pub struct Cli {
    /// Settings file (defaults to <config dir>/previz/settings.toml)
    #[arg(long, global = true, env = "PREVIZ_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reload teams, projects and scenes and check for a plugin update
    Refresh,
    /// Create a project in a team
    NewProject {
        name: String,
        #[arg(long)]
        team: String,
    },
    /// Create a scene in a project
    NewScene {
        name: String,
        #[arg(long)]
        project: String,
    },
    /// Export a scene snapshot and publish it to an existing scene
    Publish {
        #[arg(long)]
        project: String,
        #[arg(long)]
        scene: String,
        /// Scene snapshot (JSON) to export
        #[arg(long)]
        snapshot: PathBuf,
        /// Keep the exported file after publishing
        #[arg(long)]
        keep_export: bool,
    },
    /// Replace project assets with local files
    UploadAssets {
        #[arg(long)]
        project: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Set a project's state
    SetState {
        #[arg(long)]
        project: String,
        state: String,
    },
    /// Export a scene snapshot to a three.js JSON file without publishing
    Export {
        #[arg(long)]
        snapshot: PathBuf,
        out: PathBuf,
    },
    /// Interactive task queue
    Shell {
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Command::Export { snapshot, out } => {
            let scene = host::read_snapshot(&snapshot)?;
            exporter::export_to_path(&scene, &out)?;
            println!("Exported {} objects to {}", scene.objects.len(), out.display());
            Ok(())
        }
        Command::Shell { snapshot } => shell::run_shell(Session::new(settings, snapshot)?),
        Command::Refresh => {
            let mut session = Session::new(settings, None)?;
            let task = session.refresh_task();
            run_blocking(&mut session, task)?;
            print_listing(&session.host);
            Ok(())
        }
        Command::NewProject { name, team } => {
            let mut session = Session::new(settings, None)?;
            let task = session.new_project_task(&name, &team);
            run_blocking(&mut session, task)
        }
        Command::NewScene { name, project } => {
            let mut session = Session::new(settings, None)?;
            let task = session.new_scene_task(&name, &project);
            run_blocking(&mut session, task)
        }
        Command::Publish {
            project,
            scene,
            snapshot,
            keep_export,
        } => {
            if keep_export {
                settings.cleanup_export = false;
            }
            let mut session = Session::new(settings, Some(snapshot))?;
            let task = session.publish_task(&project, &scene);
            run_blocking(&mut session, task)
        }
        Command::UploadAssets { project, files } => {
            let mut session = Session::new(settings, None)?;
            let task = session.upload_task(&project, files);
            run_blocking(&mut session, task)
        }
        Command::SetState { project, state } => {
            let mut session = Session::new(settings, None)?;
            let task = session.set_state_task(&project, &state);
            run_blocking(&mut session, task)
        }
    }
}

/// Final state of a task, captured before garbage collection drops it.
struct Outcome {
    status: TaskStatus,
    line: String,
    report: Option<String>,
    debug: Option<String>,
}

impl Outcome {
    fn capture(task: &TaskState) -> Self {
        Self {
            status: task.status(),
            line: task.display_line(),
            report: task.error().map(|e| e.report(task.label())),
            debug: debug_info(task),
        }
    }
}

/// Runs `task` to completion with a blocking pump and reports how it ended.
fn run_blocking<T>(session: &mut Session, task: T) -> anyhow::Result<()>
where
    T: Task<PrevizHost> + 'static,
{
    let outcome: Rc<RefCell<Option<Outcome>>> = Rc::default();
    let subscription = {
        let outcome = outcome.clone();
        session.runner.subscribe(move |task: Option<&TaskState>| {
            if let Some(task) = task.filter(|t| t.is_finished()) {
                *outcome.borrow_mut() = Some(Outcome::capture(task));
            }
        })
    };

    let (_, status) = session
        .pump
        .submit(ExecutionMode::Blocking, &mut session.runner, &mut session.host, task);
    session.runner.unsubscribe(subscription);

    let Some(outcome) = outcome.borrow_mut().take() else {
        bail!("queue stopped ({:?}) before the task finished", status);
    };
    println!("{}", outcome.line);
    match outcome.status {
        TaskStatus::Done => Ok(()),
        TaskStatus::Error => {
            if let Some(report) = &outcome.report {
                eprintln!("{}", report);
            }
            if let Some(debug) = &outcome.debug {
                eprintln!("{}", debug);
            }
            bail!("task failed")
        }
        other => bail!("task ended {}", other),
    }
}

pub fn print_listing(host: &PrevizHost) {
    if !host.is_refreshed() {
        println!("\rNo teams. Run `refresh` first.");
        return;
    }
    let active_scene = host.scene().map(|s| s.id.as_str());
    for team in host.teams() {
        println!("\r{} ({})", team.title, team.id);
        for project in &team.projects {
            println!("\r  {} ({})", project.title, project.id);
            for scene in &project.scenes {
                let marker = if Some(scene.id.as_str()) == active_scene { "*" } else { " " };
                println!("\r   {} {} ({})", marker, scene.title, scene.id);
            }
        }
    }
}

pub fn parse_seconds(arg: Option<&str>) -> Option<Duration> {
    arg?.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0).map(Duration::from_secs_f64)
}
