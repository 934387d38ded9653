//! Manifest Sources
//!
//! Implementations of [`ManifestSource`] for the two places a lesson's audio
//! manifest can live: next to the content on disk, or on a static file host.

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use classroom_core::audio::ManifestSource;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Reads `{root}/week{N}/manifest.json`.
pub struct FileManifestSource {
    root: PathBuf,
}

impl FileManifestSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn manifest_path(&self, lesson_id: u32) -> PathBuf {
        self.root
            .join(format!("week{lesson_id}"))
            .join("manifest.json")
    }
}

#[async_trait]
impl ManifestSource for FileManifestSource {
    async fn fetch_manifest(&self, lesson_id: u32) -> Result<HashMap<String, String>> {
        let path = self.manifest_path(lesson_id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid manifest {}", path.display()))
    }
}

/// Fetches `{base_url}/week{N}/manifest.json` over HTTP.
pub struct HttpManifestSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpManifestSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn manifest_url(&self, lesson_id: u32) -> String {
        format!(
            "{}/week{lesson_id}/manifest.json",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch_manifest(&self, lesson_id: u32) -> Result<HashMap<String, String>> {
        let url = self.manifest_url(lesson_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch manifest {url}"))?
            .error_for_status()
            .with_context(|| format!("Manifest request failed: {url}"))?;
        response
            .json::<HashMap<String, String>>()
            .await
            .with_context(|| format!("Invalid manifest body from {url}"))
    }
}

/// Picks the manifest source configured for this run.
pub fn from_config(config: &Config) -> Arc<dyn ManifestSource> {
    match &config.manifest_base_url {
        Some(url) => Arc::new(HttpManifestSource::new(url.clone())),
        None => Arc::new(FileManifestSource::new(config.audio_dir())),
    }
}
