use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ConfigError;
use crate::session::SessionOptions;
use crate::tree::{DepthPolicy, MAX_REPLY_DEPTH};

static DATA_DIR_NAME: &str = "carenet";
static CARENET_DB_NAME: &str = "carenet_db.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";
static ATTACHMENT_DIR_NAME: &str = "attachments";

// data_dir_path
// |- carenet
//    |- carenet_db.sqlite
//    |- config.json
//    |- attachments/

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 25 * 1024 * 1024;

fn default_max_reply_depth() -> u32 {
    MAX_REPLY_DEPTH
}

fn default_max_attachment_bytes() -> u64 {
    DEFAULT_MAX_ATTACHMENT_BYTES
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CarenetConfig {
    pub database_path: PathBuf,

    /// Directory that uploaded attachment bytes are written under.
    pub attachment_dir: PathBuf,

    /// Nesting depth at which replies stop and indentation flattens.
    #[serde(default = "default_max_reply_depth")]
    pub max_reply_depth: u32,

    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

impl CarenetConfig {
    /// Default layout rooted at `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        CarenetConfig {
            database_path: data_dir.join(CARENET_DB_NAME),
            attachment_dir: data_dir.join(ATTACHMENT_DIR_NAME),
            max_reply_depth: default_max_reply_depth(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }

    pub fn policy(&self) -> DepthPolicy {
        DepthPolicy::new(self.max_reply_depth)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            policy: self.policy(),
            max_attachment_bytes: self.max_attachment_bytes,
        }
    }
}

/// Gets the existing config from the platform data directory, or initializes one.
pub async fn get_or_init() -> Result<CarenetConfig, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    load_from(&data_dir.join(DATA_DIR_NAME)).await
}

/// Reads `config.json` from `dir`, writing a default one first if it is missing.
pub async fn load_from(dir: &Path) -> Result<CarenetConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(dir).await?;

    if fs::try_exists(&config_path).await? {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: CarenetConfig = serde_json::from_str(&contents)?;
        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        let config = CarenetConfig::new(dir);

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        tracing::info!(path = %config_path.display(), "wrote default config");
        Ok(config)
    }
}
