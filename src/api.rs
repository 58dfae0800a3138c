//! Reference data: the channel catalog and its bootstrap download.
//!
//! The catalog maps canonical channel ids to metadata (name, logo). It is
//! downloaded ahead of time by the `load` subcommand into
//! `<BASE_DIR>/tmp/data/` and read once per grab run.
//!
//! # Failure model
//!
//! Catalog enrichment is best-effort. A missing or malformed `channels.json`
//! is logged and yields an empty catalog; the grab proceeds without logos.
//! The bootstrap performs bare single-shot downloads: a failed file is
//! reported, never retried.

use crate::error::{EpgError, Result};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub const API_BASE_URL: &str = "https://iptv-org.github.io/api";

/// Lookup tables fetched by [`load_reference_data`].
pub const REFERENCE_FILES: [&str; 4] = [
    "channels.json",
    "countries.json",
    "regions.json",
    "subdivisions.json",
];

const DOWNLOAD_CONCURRENCY: usize = 2;

/// A catalog record. Only the fields used for enrichment are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// Read-only channel catalog keyed by canonical id.
#[derive(Debug, Default)]
pub struct ChannelCatalog {
    channels: HashMap<String, CatalogChannel>,
}

impl ChannelCatalog {
    pub fn from_channels(channels: impl IntoIterator<Item = CatalogChannel>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Load `channels.json`, falling back to an empty catalog on any failure.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Channel catalog unavailable; continuing without it");
                return Self::default();
            }
        };
        match serde_json::from_str::<Vec<CatalogChannel>>(&raw) {
            Ok(channels) => {
                let catalog = Self::from_channels(channels);
                info!(count = catalog.len(), "Loaded channel catalog");
                catalog
            }
            Err(e) => {
                error!(error = %e, "Channel catalog is malformed; continuing without it");
                Self::default()
            }
        }
    }

    pub fn find(&self, id: &str) -> Option<&CatalogChannel> {
        self.channels.get(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Outcome of a reference-data download.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub downloaded: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

/// Download every file in [`REFERENCE_FILES`] from `base_url` into `data_dir`.
///
/// Downloads run two at a time. Individual failures are collected in the
/// report; only failing to create `data_dir` is an error.
#[instrument(level = "info", skip(client))]
pub async fn load_reference_data(
    client: &reqwest::Client,
    base_url: &str,
    data_dir: &Path,
) -> Result<LoadReport> {
    let t0 = Instant::now();
    if tokio::fs::try_exists(data_dir).await.unwrap_or(false) {
        info!("Data folder already exists");
    } else {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| EpgError::file(data_dir, e))?;
        info!("Created data folder");
    }

    let results: Vec<(String, Result<PathBuf>)> = stream::iter(REFERENCE_FILES)
        .map(|name| async move {
            let url = format!("{}/{}", base_url.trim_end_matches('/'), name);
            let target = data_dir.join(name);
            (name.to_string(), download(client, &url, &target).await)
        })
        .buffer_unordered(DOWNLOAD_CONCURRENCY)
        .collect()
        .await;

    let mut report = LoadReport::default();
    for (name, result) in results {
        match result {
            Ok(path) => {
                info!(file = %name, path = %path.display(), "Loaded reference data");
                report.downloaded.push(path);
            }
            Err(e) => {
                error!(file = %name, error = %e, "Failed to load reference data");
                report.failed.push((name, e.to_string()));
            }
        }
    }

    info!(
        downloaded = report.downloaded.len(),
        failed = report.failed.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Reference data load complete"
    );
    Ok(report)
}

async fn download(client: &reqwest::Client, url: &str, target: &Path) -> Result<PathBuf> {
    let body = client.get(url).send().await?.error_for_status()?.bytes().await?;
    tokio::fs::write(target, &body)
        .await
        .map_err(|e| EpgError::file(target, e))?;
    Ok(target.to_path_buf())
}
