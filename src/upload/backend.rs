//! HTTP client for the conversational backend
//!
//! `POST {api_base}/chat/audio` with the recording as multipart field `file`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use super::{Reply, UploadCollaborator};
use crate::audio::AudioArtifact;

/// Global HTTP client for reuse across requests
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn get_http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            })
    })
}

/// Errors that can occur while uploading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Network/HTTP error
    Network(String),
    /// Backend returned a non-success status
    Backend { status: u16, message: String },
    /// Failed to parse backend response
    Parse(String),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Network(e) => write!(f, "Network error: {}", e),
            UploadError::Backend { status, message } => {
                write!(f, "Backend error ({}): {}", status, message)
            }
            UploadError::Parse(e) => write!(f, "Failed to parse backend response: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

#[derive(Debug, Deserialize)]
struct ChatAudioResponse {
    text: String,
    #[serde(default)]
    audio_url: String,
}

/// Map the backend's `audio_url` onto the public audio route.
pub fn resolve_audio_reference(api_base: &str, audio_url: &str) -> String {
    let name = audio_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    format!("{}/audio/{}", api_base.trim_end_matches('/'), name)
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    api_base: String,
}

impl BackendClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/audio", self.api_base)
    }
}

#[async_trait]
impl UploadCollaborator for BackendClient {
    async fn upload(&self, artifact: &AudioArtifact) -> Result<Reply, UploadError> {
        let filename = format!("voice.{}", artifact.file_extension());

        log::info!(
            "Uploading recording: {} ({} bytes, {})",
            filename,
            artifact.len(),
            artifact.mime_type()
        );

        let file_part = Part::bytes(artifact.data().to_vec())
            .file_name(filename)
            .mime_str(artifact.mime_type())
            .map_err(|e| UploadError::Parse(e.to_string()))?;
        let form = Form::new().part("file", file_part);

        let response = get_http_client()
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            log::error!("Backend error ({}): {}", status.as_u16(), message);
            return Err(UploadError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatAudioResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(e.to_string()))?;

        log::info!("Backend replied: {} chars", body.text.len());

        Ok(Reply {
            audio_reference: resolve_audio_reference(&self.api_base, &body.audio_url),
            text: body.text,
        })
    }
}
