//! Remote Project Client: blocking calls against the Previz REST API.
//!
//! Every method may block on the network and is meant to be called from a
//! worker thread. Uploads take a progress callback invoked at each chunk;
//! returning `ControlFlow::Break` from it aborts the upload with
//! [`ClientError::Canceled`].

pub mod error;
pub mod model;
pub mod previz;
pub mod progress;

use std::{ops::ControlFlow, path::Path};

pub use error::ClientError;
pub use model::{Asset, PluginRelease, Project, SceneRef, Team};
pub use previz::PrevizProject;
pub use progress::ProgressReader;

/// Upload progress callback: `(bytes_read, total_bytes)`.
pub type ProgressFn = Box<dyn FnMut(u64, u64) -> ControlFlow<()> + Send>;

pub trait ProjectApi: Send + Sync {
    /// Teams with their projects and scenes.
    fn get_all(&self) -> Result<Vec<Team>, ClientError>;

    /// Newer plugin release than `version`, if any.
    fn updated_plugin(&self, plugin: &str, version: &str) -> Result<Option<PluginRelease>, ClientError>;

    fn new_project(&self, name: &str, team_id: &str) -> Result<Project, ClientError>;

    fn new_scene(&self, project_id: &str, name: &str) -> Result<SceneRef, ClientError>;

    fn scene(&self, project_id: &str, scene_id: &str) -> Result<SceneRef, ClientError>;

    /// Uploads the exported scene file to the scene's JSON url.
    fn update_scene(&self, url: &str, path: &Path, on_progress: ProgressFn) -> Result<(), ClientError>;

    fn assets(&self, project_id: &str) -> Result<Vec<Asset>, ClientError>;

    fn upload_asset(&self, project_id: &str, path: &Path, on_progress: ProgressFn) -> Result<Asset, ClientError>;

    fn delete_asset(&self, project_id: &str, asset_id: &str) -> Result<(), ClientError>;

    fn set_state(&self, project_id: &str, state: &str) -> Result<(), ClientError>;
}
