use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::BrowseError;

pub const DEFAULT_ENDPOINT_URL: &str = "https://s3.eidf.ac.uk";
pub const DEFAULT_BUCKET: &str = "eidf190-sv2a-diversity-project";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// ListObjectsV2 never returns more than this many keys per call
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub endpoint_url: String,
    pub bucket_name: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            bucket_name: DEFAULT_BUCKET.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Partial update accepted by `POST /api/config`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub endpoint_url: Option<String>,
    pub bucket_name: Option<String>,
    pub page_size: Option<u32>,
}

impl AppConfig {
    pub fn merged(&self, update: ConfigUpdate) -> Self {
        Self {
            endpoint_url: update
                .endpoint_url
                .unwrap_or_else(|| self.endpoint_url.clone()),
            bucket_name: update
                .bucket_name
                .unwrap_or_else(|| self.bucket_name.clone()),
            page_size: update.page_size.unwrap_or(self.page_size),
        }
        .normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.endpoint_url = self.endpoint_url.trim().to_string();
        self.bucket_name = self.bucket_name.trim().trim_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<(), BrowseError> {
        if self.bucket_name.is_empty() {
            return Err(BrowseError::Config("bucket name must not be empty".into()));
        }
        url::Url::parse(&self.endpoint_url).map_err(|e| {
            BrowseError::Config(format!("invalid endpoint URL {}: {}", self.endpoint_url, e))
        })?;
        Ok(())
    }
}

/// JSON file holding the active configuration.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the file, creating it with defaults when missing.
    /// An unreadable file falls back to defaults without being overwritten.
    pub fn load_or_create(&self) -> AppConfig {
        if !self.path.exists() {
            let config = AppConfig::default();
            match self.save(&config) {
                Ok(()) => tracing::info!("Wrote default configuration to {:?}", self.path),
                Err(e) => tracing::warn!("Could not write default configuration: {}", e),
            }
            return config;
        }

        match self.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Error loading config from {:?}: {}", self.path, e);
                AppConfig::default()
            }
        }
    }

    pub fn load(&self) -> Result<AppConfig, BrowseError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| BrowseError::Config(format!("cannot read {:?}: {}", self.path, e)))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| BrowseError::Config(format!("cannot parse {:?}: {}", self.path, e)))?;
        Ok(config.normalized())
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), BrowseError> {
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| BrowseError::Config(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| BrowseError::Config(format!("cannot write {:?}: {}", self.path, e)))
    }
}
