//! Client for the melody generation service.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// A generator offered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// A melody ready to be loaded into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MelodyRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    file_name: String,
}

#[derive(Debug, Clone)]
pub struct MelodyApi {
    base_url: String,
    client: reqwest::Client,
}

impl MelodyApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn download_url(&self, file_name: &str) -> String {
        format!("{}/melody/download/{}", self.base_url, file_name)
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/melody/models", self.base_url);
        debug!(url, "listing models");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Api(format!("network error: {}", e)))?;
        let body = checked_body(response).await?;

        serde_json::from_slice(&body)
            .map_err(|e| Error::Api(format!("failed to parse model list: {}", e)))
    }

    pub async fn generate(&self, model_id: &str) -> Result<MelodyRef> {
        let url = format!("{}/melody/generate", self.base_url);
        info!(model_id, "requesting melody");

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest { model_id })
            .send()
            .await
            .map_err(|e| Error::Api(format!("network error: {}", e)))?;
        let body = checked_body(response).await?;

        self.melody_from_response(&body)
    }

    fn melody_from_response(&self, body: &[u8]) -> Result<MelodyRef> {
        let generated: GenerateResponse = serde_json::from_slice(body)
            .map_err(|e| Error::Api(format!("failed to parse generate response: {}", e)))?;

        Ok(MelodyRef {
            url: self.download_url(&generated.file_name),
            name: generated.file_name,
        })
    }
}

async fn checked_body(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Api(format!("HTTP {}", status)));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Api(format!("failed to read response: {}", e)))?;
    Ok(bytes.to_vec())
}
