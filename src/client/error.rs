use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not build HTTP client: {0}")]
    Setup(#[source] reqwest::Error),

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response of {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scene {0} has no upload url")]
    MissingSceneUrl(String),

    #[error("upload canceled")]
    Canceled,
}

impl ClientError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Setup(_) => "Setup",
            ClientError::Transport { .. } => "Transport",
            ClientError::Status { .. } => "Status",
            ClientError::Decode { .. } => "Decode",
            ClientError::File { .. } => "File",
            ClientError::MissingSceneUrl(_) => "MissingSceneUrl",
            ClientError::Canceled => "Canceled",
        }
    }
}
