use crate::{
    client::model::{Asset, PluginRelease, Project, SceneRef, Team},
    models::error::TaskError,
};

/// Worker -> main envelope. A worker sends any number of `Update`s and at
/// most one of the three terminal kinds, which is always its last message.
#[derive(Debug)]
pub enum WorkerMessage {
    Update(TaskUpdate),
    Done,
    Error(TaskError),
    Canceled,
}

impl WorkerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::Update(_) => "TASK_UPDATE",
            WorkerMessage::Done => "TASK_DONE",
            WorkerMessage::Error(_) => "TASK_ERROR",
            WorkerMessage::Canceled => "RESPOND_CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Update(_))
    }
}

/// Main -> worker envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    RequestCancel,
}

/// Named payload of a `TASK_UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Progress(f64),
    Teams(Vec<Team>),
    PluginRelease(Option<PluginRelease>),
    Project(Project),
    Scene(SceneRef),
    Asset(Asset),
    Note(String),
}

impl TaskUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            TaskUpdate::Progress(_) => "progress",
            TaskUpdate::Teams(_) => "get_all",
            TaskUpdate::PluginRelease(_) => "updated_plugin",
            TaskUpdate::Project(_) => "new_project",
            TaskUpdate::Scene(_) => "new_scene",
            TaskUpdate::Asset(_) => "upload_asset",
            TaskUpdate::Note(_) => "note",
        }
    }
}
