//! Selector-keyed artifact cache shared by every pipeline of a session.
//!
//! Remote artifacts are fetched with conditional requests and placed with
//! temp-file-then-rename so concurrent readers never see a torn file.
mod download;
mod selector;

pub use selector::{ArtifactKind, CacheSelector, DownloadDescriptor};

use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::config::Settings;
use crate::error::Error;
use crate::reporter::{ProgressReporter, SilentProgressReporter};
use crate::utils::fs::copy_atomically;
use crate::utils::hash::sha1_matches;
use download::{modified_time, same_second, transfer, Transfer};

pub struct ArtifactCache {
    root: PathBuf,
    launcher_dir: Option<PathBuf>,
    offline: bool,
    client: Client,
    reporter: Arc<dyn ProgressReporter>,
    in_flight: Mutex<HashMap<CacheSelector, Arc<OnceCell<PathBuf>>>>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            root: root.into(),
            launcher_dir: None,
            offline: false,
            client,
            reporter: Arc::new(SilentProgressReporter),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.cache_dir.clone(), settings.http_client()?)
            .with_launcher_dir(settings.launcher_dir.clone())
            .with_offline(settings.offline))
    }

    pub fn with_launcher_dir(mut self, launcher_dir: Option<PathBuf>) -> Self {
        self.launcher_dir = launcher_dir;
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn path_of(&self, selector: &CacheSelector) -> PathBuf {
        selector.path_in(&self.root)
    }

    /// Copy the cached file behind `selector` to `destination`.
    pub async fn fetch(&self, selector: &CacheSelector, destination: &Path) -> Result<()> {
        let source = self.path_of(selector);
        if !source.is_file() {
            return Err(Error::CacheMiss {
                selector: selector.to_string(),
                path: source,
            }
            .into());
        }
        copy_atomically(&source, destination)
            .with_context(|| format!("Failed to copy cached {} to {:?}", selector, destination))
    }

    /// Bring `destination` up to date with `descriptor`.
    ///
    /// Returns `true` only when bytes were transferred over the network.
    pub async fn download(&self, descriptor: &DownloadDescriptor, destination: &Path) -> Result<bool> {
        let url = descriptor.url.as_str();
        let expected = descriptor.sha1.as_deref();
        let exists = destination.is_file();

        if exists {
            if let Some(expected) = expected {
                if sha1_matches(destination, expected) {
                    log::debug!("File exists and hash matches, skipping: {:?}", destination);
                    return Ok(false);
                }
                log::info!("File exists but hash mismatches, refreshing: {:?}", destination);
            }
        }

        if self.copy_from_launcher(descriptor, destination)? {
            return Ok(false);
        }

        if self.offline {
            if exists {
                log::debug!("Offline, keeping existing {:?}", destination);
                return Ok(false);
            }
            return Err(Error::OfflineAndMissing {
                url: url.to_string(),
                destination: destination.to_path_buf(),
            }
            .into());
        }

        // A known hash that did not match means the local copy is wrong no
        // matter what the server thinks of its timestamp.
        let local_mtime = match (exists, expected) {
            (true, None) => modified_time(destination),
            _ => None,
        };

        log::debug!("Downloading: {} -> {:?}", url, destination);
        let reporter = self.reporter.as_ref();
        match transfer(&self.client, url, destination, expected, local_mtime, reporter).await? {
            Transfer::Downloaded { .. } => Ok(true),
            Transfer::NotModified { last_modified } => {
                let stale = match (last_modified, local_mtime) {
                    (Some(remote), Some(local)) => !same_second(remote, local),
                    _ => false,
                };
                if !stale {
                    log::debug!("Not modified: {}", url);
                    return Ok(false);
                }
                log::info!(
                    "Server reports a different Last-Modified for {}, re-downloading",
                    url
                );
                match transfer(&self.client, url, destination, expected, None, reporter).await? {
                    Transfer::Downloaded { .. } => Ok(true),
                    Transfer::NotModified { .. } => Err(Error::NetworkError {
                        url: url.to_string(),
                        reason: "304 Not Modified for an unconditional request".to_string(),
                    }
                    .into()),
                }
            }
        }
    }

    /// Download `descriptor` into the slot for `selector`, at most once per
    /// session. Concurrent callers for the same selector share the transfer.
    pub async fn cached(&self, selector: &CacheSelector, descriptor: &DownloadDescriptor) -> Result<PathBuf> {
        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight
                .entry(selector.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let path = cell
            .get_or_try_init(|| async {
                let path = self.path_of(selector);
                self.download(descriptor, &path)
                    .await
                    .with_context(|| format!("Failed to cache {}", selector))?;
                Ok::<_, anyhow::Error>(path)
            })
            .await?;
        Ok(path.clone())
    }

    /// Whether `selector` was already produced earlier in this session.
    pub fn is_memoized(&self, selector: &CacheSelector) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight
            .get(selector)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    fn copy_from_launcher(&self, descriptor: &DownloadDescriptor, destination: &Path) -> Result<bool> {
        let (Some(launcher_dir), Some(expected)) = (&self.launcher_dir, descriptor.sha1.as_deref()) else {
            return Ok(false);
        };
        let Some(candidate) = descriptor.launcher_path(launcher_dir) else {
            return Ok(false);
        };
        if !candidate.is_file() || !sha1_matches(&candidate, expected) {
            return Ok(false);
        }

        log::info!("Using launcher copy {:?} for {}", candidate, descriptor.url);
        copy_atomically(&candidate, destination)?;
        Ok(true)
    }
}
