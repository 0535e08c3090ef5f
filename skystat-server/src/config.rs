use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// SQLite file holding the snapshot log
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable CORS for cross-origin status queries
    #[serde(default)]
    pub enable_cors: bool,

    #[serde(default)]
    pub renderer: RendererConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// External sky renderer binary
    #[serde(default = "default_renderer_command")]
    pub command: String,

    /// Directory for per-call scratch output files
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Rendered image edge length in pixels
    #[serde(default = "default_image_size")]
    pub image_size: u32,

    /// Draw cardinal direction markers
    #[serde(default = "default_cardinal_markers")]
    pub cardinal_markers: bool,

    /// Pass the renderer's debug flag
    #[serde(default)]
    pub debug: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> String {
    "data/snapshots.db".to_string()
}

fn default_renderer_command() -> String {
    "astrosky".to_string()
}

fn default_scratch_dir() -> String {
    std::env::temp_dir().to_string_lossy().into_owned()
}

fn default_image_size() -> u32 {
    1024
}

fn default_cardinal_markers() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            database_path: default_database_path(),
            enable_cors: false,
            renderer: RendererConfig::default(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_renderer_command(),
            scratch_dir: default_scratch_dir(),
            image_size: default_image_size(),
            cardinal_markers: default_cardinal_markers(),
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
