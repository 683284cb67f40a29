//! TOML configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use serde::Deserialize;

use crate::server::MediaSource;
use crate::stream::DEFAULT_CHUNK_SIZE;

const DEFAULT_PATHS: [&str; 2] = ["./media-range.toml", "./config.toml"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of accept workers; the CPU count when unset.
    pub workers: Option<usize>,
    /// Seconds open connections may drain on shutdown before being cut.
    pub shutdown_grace: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: None,
            shutdown_grace: 10,
        }
    }
}

impl ServerConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub path: PathBuf,
    pub route: String,
    /// Guessed from `path` when unset.
    pub content_type: Option<String>,
    pub chunk_size: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            path: PathBuf::from("video.mp4"),
            route: "/video.mp4".to_string(),
            content_type: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MediaConfig {
    pub fn source(&self) -> MediaSource {
        let source = MediaSource::new(&self.path, &self.route).with_chunk_size(self.chunk_size);
        match &self.content_type {
            Some(content_type) => source.with_content_type(content_type),
            None => source,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    Ok(config)
}

/// Load config from the given path, the default locations, or defaults
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path in DEFAULT_PATHS.iter().map(Path::new) {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.workers == Some(0) {
        anyhow::bail!("Worker count must be at least 1");
    }

    let route = &config.media.route;
    if !route.starts_with('/') {
        anyhow::bail!("Media route must start with '/': {:?}", route);
    }
    if route.contains([':', '*', '{', '}']) {
        anyhow::bail!("Media route must be a literal path: {:?}", route);
    }

    if config.media.chunk_size == 0 {
        anyhow::bail!("Chunk size must be greater than 0");
    }

    if let Some(content_type) = &config.media.content_type {
        HeaderValue::from_str(content_type)
            .with_context(|| format!("Invalid content type: {:?}", content_type))?;
    }

    if !config.media.path.is_file() {
        tracing::warn!("Media asset does not exist yet: {:?}", config.media.path);
    }

    Ok(())
}
