//! Fetching and decoding melody documents.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::midi::{self, Document};
use crate::{Error, Result};

/// Source of raw document bytes.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Fetches `http(s)://` URLs with reqwest and `file://` URLs or bare paths from disk.
#[derive(Debug, Clone)]
pub struct UrlFetcher {
    client: reqwest::Client,
}

impl UrlFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

impl Fetcher for UrlFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| Error::Fetch {
            url: url.to_string(),
            reason,
        };

        if let Some(path) = local_path(url) {
            return tokio::fs::read(&path)
                .await
                .map_err(|e| fetch_error(e.to_string()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Turns a URL into a [`Document`].
///
/// The loader keeps no state between calls. Concurrent loads are arbitrated
/// by the session that issued them (see `LoadTicket`).
#[derive(Debug, Clone)]
pub struct DocumentLoader<F> {
    fetcher: F,
}

impl<F: Fetcher> DocumentLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub async fn load(&self, url: &str) -> Result<Document> {
        debug!(url, "fetching melody");
        let bytes = self.fetcher.fetch(url).await?;
        let document = midi::parse(&bytes)?;
        info!(
            url,
            notes = document.note_count(),
            seconds = document.duration(),
            "melody loaded"
        );
        Ok(document)
    }
}
