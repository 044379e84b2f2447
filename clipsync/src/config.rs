//! Environment-driven configuration.
//!
//! Every knob has a default so a bare `clipsync` invocation works from the
//! current directory; deployments override paths via environment variables
//! (loaded from `.env` by the binary before this runs).

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Inventory file name under the data directory.
const INVENTORY_FILE: &str = "inventory.ctb";

/// Lock file name under the data directory.
const LOCK_FILE: &str = "inventory.lock";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the inventory and lock files.
    pub data_dir: PathBuf,
    /// Directory for freshly downloaded videos.
    pub raw_dir: PathBuf,
    /// Directory for transformed videos.
    pub processed_dir: PathBuf,
    /// Directory for the log file sink.
    pub log_dir: PathBuf,
    /// Upper bound on waiting for the inventory lock.
    pub lock_timeout: Duration,
    /// yt-dlp binary path.
    pub ytdlp_path: String,
    /// ffmpeg binary path.
    pub ffmpeg_path: String,
    /// Download retry attempts before giving up.
    pub download_retries: u32,
    /// Ranges the randomized transform plan is sampled from.
    pub transform: TransformRanges,
}

/// Bounds for each randomized transform parameter.
#[derive(Debug, Clone)]
pub struct TransformRanges {
    pub zoom: (f64, f64),
    pub hue_shift_deg: (f64, f64),
    pub saturation: (f64, f64),
    pub speed: (f64, f64),
}

impl Default for TransformRanges {
    fn default() -> Self {
        Self {
            zoom: (1.0, 1.15),
            hue_shift_deg: (-12.0, 12.0),
            saturation: (0.9, 1.1),
            speed: (0.95, 1.05),
        }
    }
}

impl Config {
    /// Build configuration from the environment with defaults.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(env_or("CLIPSYNC_DATA_DIR", "./data"));
        let videos_dir = PathBuf::from(env_or("CLIPSYNC_VIDEOS_DIR", "./videos"));
        let log_dir = PathBuf::from(env_or("CLIPSYNC_LOG_DIR", "./logs"));

        let lock_timeout_secs: u64 = parse_env("CLIPSYNC_LOCK_TIMEOUT_SECS", 30)?;
        let download_retries: u32 = parse_env("CLIPSYNC_DOWNLOAD_RETRIES", 3)?;

        Ok(Self {
            raw_dir: videos_dir.join("raw"),
            processed_dir: videos_dir.join("processed"),
            data_dir,
            log_dir,
            lock_timeout: Duration::from_secs(lock_timeout_secs),
            ytdlp_path: env_or("CLIPSYNC_YTDLP_PATH", "yt-dlp"),
            ffmpeg_path: env_or("CLIPSYNC_FFMPEG_PATH", "ffmpeg"),
            download_retries,
            transform: TransformRanges::default(),
        })
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.data_dir.join(INVENTORY_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{key} has invalid value {raw:?}"))),
        Err(_) => Ok(default),
    }
}
