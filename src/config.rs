use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::album::DEFAULT_IMAGE_CONCURRENCY;
use crate::flickr::{DEFAULT_BASE_URL, DEFAULT_PER_PAGE, DEFAULT_SAFE_SEARCH, SearchSettings};
use crate::geo::{DEFAULT_HALF_HEIGHT, DEFAULT_HALF_WIDTH, SearchWindow};
use crate::sampler::ALBUM_CAPACITY;

/// Environment variable that overrides the configured API key
pub const API_KEY_ENV: &str = "FLICKR_API_KEY";

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_store_file")]
    pub store_file: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_safe_search")]
    pub safe_search: u8,
    #[serde(default = "default_album_capacity")]
    pub album_capacity: usize,
    #[serde(default = "default_half_width")]
    pub bbox_half_width: f64,
    #[serde(default = "default_half_height")]
    pub bbox_half_height: f64,
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_store_file() -> String {
    "data/virtualtourist.yaml".to_string()
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_safe_search() -> u8 {
    DEFAULT_SAFE_SEARCH
}

fn default_album_capacity() -> usize {
    ALBUM_CAPACITY
}

fn default_half_width() -> f64 {
    DEFAULT_HALF_WIDTH
}

fn default_half_height() -> f64 {
    DEFAULT_HALF_HEIGHT
}

fn default_image_concurrency() -> usize {
    DEFAULT_IMAGE_CONCURRENCY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: "YOUR_FLICKR_API_KEY".to_string(),
            api_base_url: default_base_url(),
            store_file: default_store_file(),
            per_page: default_per_page(),
            safe_search: default_safe_search(),
            album_capacity: default_album_capacity(),
            bbox_half_width: default_half_width(),
            bbox_half_height: default_half_height(),
            image_concurrency: default_image_concurrency(),
        }
    }
}

impl Config {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    pub fn get_config_path(config_arg: &Option<PathBuf>) -> PathBuf {
        config_arg
            .clone()
            .unwrap_or_else(|| PathBuf::from("virtualtourist.yaml"))
    }

    /// The API key, preferring the environment over the file
    pub fn api_key(&self) -> String {
        env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| self.api_key.clone())
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store_file)
    }

    /// Search client settings derived from this config
    pub fn search_settings(&self) -> Result<SearchSettings> {
        let base_url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url: {}", self.api_base_url))?;

        let mut settings = SearchSettings::new(base_url, self.api_key());
        settings.per_page = self.per_page;
        settings.safe_search = self.safe_search;
        settings.window = SearchWindow {
            half_width: self.bbox_half_width,
            half_height: self.bbox_half_height,
            ..SearchWindow::default()
        };
        Ok(settings)
    }
}
