use std::{
    fs::File,
    path::Path,
    sync::atomic::Ordering,
    time::Duration,
};

use log::{debug, info};
use reqwest::{
    blocking::{multipart, Body, Client, RequestBuilder, Response},
    header::CONTENT_TYPE,
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::client::{
    error::ClientError,
    model::{Asset, PluginRelease, Project, SceneRef, Team},
    progress::ProgressReader,
    ProgressFn, ProjectApi,
};

pub const DEFAULT_API_ROOT: &str = "https://app.previz.co/api";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resource paths under the API root.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Endpoint<'a> {
    Teams,
    Projects,
    Scenes { project: &'a str },
    Scene { project: &'a str, scene: &'a str },
    Assets { project: &'a str },
    Asset { project: &'a str, asset: &'a str },
    State { project: &'a str },
    PluginUpdate { plugin: &'a str, version: &'a str },
}

/// Blocking client for one Previz account.
pub struct PrevizProject {
    root: String,
    token: String,
    http: Client,
}

impl PrevizProject {
    pub fn new(root: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("previz_queue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Setup)?;
        Ok(Self {
            root: root.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn url(&self, endpoint: Endpoint<'_>) -> String {
        let root = &self.root;
        match endpoint {
            Endpoint::Teams => format!("{root}/teams"),
            Endpoint::Projects => format!("{root}/projects"),
            Endpoint::Scenes { project } => format!("{root}/projects/{project}/scenes"),
            Endpoint::Scene { project, scene } => format!("{root}/projects/{project}/scenes/{scene}"),
            Endpoint::Assets { project } => format!("{root}/projects/{project}/assets"),
            Endpoint::Asset { project, asset } => format!("{root}/projects/{project}/assets/{asset}"),
            Endpoint::State { project } => format!("{root}/projects/{project}/state"),
            Endpoint::PluginUpdate { plugin, version } => {
                format!("{root}/plugins/{plugin}/{version}/updated")
            }
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
    }

    /// Sends the request and turns any non-success status into an error.
    fn send(&self, method: Method, url: &str, request: RequestBuilder) -> Result<Response, ClientError> {
        debug!("{} {}", method, url);
        let response = request.send().map_err(|source| ClientError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;
        check_status(method, url, response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let response = self.send(Method::GET, url, self.request(Method::GET, url))?;
        decode(url, response)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, ClientError> {
        let request = self.request(method.clone(), url).json(body);
        let response = self.send(method, url, request)?;
        decode(url, response)
    }

    /// Sends a streaming upload. A send failure after the progress callback
    /// asked to stop is reported as a cancellation.
    fn upload(
        &self,
        method: Method,
        url: &str,
        request: RequestBuilder,
        canceled: &std::sync::atomic::AtomicBool,
    ) -> Result<Response, ClientError> {
        match self.send(method, url, request) {
            Err(_) if canceled.load(Ordering::SeqCst) => {
                info!("Upload to {} canceled.", url);
                Err(ClientError::Canceled)
            }
            other => other,
        }
    }
}

fn check_status(method: Method, url: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ClientError::Status {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ClientError> {
    response.json().map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

fn open_upload(path: &Path, on_progress: ProgressFn) -> Result<(ProgressReader<File>, u64), ClientError> {
    let file_error = |source| ClientError::File {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(file_error)?;
    let len = file.metadata().map_err(file_error)?.len();
    Ok((ProgressReader::new(file, len, on_progress), len))
}

impl ProjectApi for PrevizProject {
    fn get_all(&self) -> Result<Vec<Team>, ClientError> {
        let url = format!("{}?include=projects.scenes", self.url(Endpoint::Teams));
        self.get_json(&url)
    }

    fn updated_plugin(&self, plugin: &str, version: &str) -> Result<Option<PluginRelease>, ClientError> {
        let url = self.url(Endpoint::PluginUpdate { plugin, version });
        let response = self.send(Method::GET, &url, self.request(Method::GET, &url))?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        decode(&url, response).map(Some)
    }

    fn new_project(&self, name: &str, team_id: &str) -> Result<Project, ClientError> {
        let url = self.url(Endpoint::Projects);
        self.send_json(Method::POST, &url, &json!({ "title": name, "team": team_id }))
    }

    fn new_scene(&self, project_id: &str, name: &str) -> Result<SceneRef, ClientError> {
        let url = self.url(Endpoint::Scenes { project: project_id });
        self.send_json(Method::POST, &url, &json!({ "title": name }))
    }

    fn scene(&self, project_id: &str, scene_id: &str) -> Result<SceneRef, ClientError> {
        self.get_json(&self.url(Endpoint::Scene {
            project: project_id,
            scene: scene_id,
        }))
    }

    fn update_scene(&self, url: &str, path: &Path, on_progress: ProgressFn) -> Result<(), ClientError> {
        let (reader, len) = open_upload(path, on_progress)?;
        let canceled = reader.cancel_flag();
        info!("Uploading {} ({} bytes) to {}.", path.display(), len, url);

        let request = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::sized(reader, len));
        self.upload(Method::PUT, url, request, &canceled)?;
        Ok(())
    }

    fn assets(&self, project_id: &str) -> Result<Vec<Asset>, ClientError> {
        self.get_json(&self.url(Endpoint::Assets { project: project_id }))
    }

    fn upload_asset(&self, project_id: &str, path: &Path, on_progress: ProgressFn) -> Result<Asset, ClientError> {
        let url = self.url(Endpoint::Assets { project: project_id });
        let (reader, len) = open_upload(path, on_progress)?;
        let canceled = reader.cancel_flag();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "asset".to_string());
        info!("Uploading asset {} ({} bytes).", file_name, len);

        let part = multipart::Part::reader_with_length(reader, len).file_name(file_name);
        let form = multipart::Form::new().part("file", part);
        let request = self.request(Method::POST, &url).multipart(form);
        let response = self.upload(Method::POST, &url, request, &canceled)?;
        decode(&url, response)
    }

    fn delete_asset(&self, project_id: &str, asset_id: &str) -> Result<(), ClientError> {
        let url = self.url(Endpoint::Asset {
            project: project_id,
            asset: asset_id,
        });
        self.send(Method::DELETE, &url, self.request(Method::DELETE, &url))?;
        Ok(())
    }

    fn set_state(&self, project_id: &str, state: &str) -> Result<(), ClientError> {
        let url = self.url(Endpoint::State { project: project_id });
        let request = self.request(Method::PUT, &url).json(&json!({ "state": state }));
        self.send(Method::PUT, &url, request)?;
        Ok(())
    }
}
