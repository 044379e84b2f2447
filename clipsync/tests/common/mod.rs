//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use clipsync::config::{Config, TransformRanges};
use clipsync::inventory::{InventoryStore, NewVideo};

/// Configuration sandboxed inside a temporary directory.
pub fn test_config(root: &Path) -> Config {
    Config {
        data_dir: root.join("data"),
        raw_dir: root.join("videos/raw"),
        processed_dir: root.join("videos/processed"),
        log_dir: root.join("logs"),
        lock_timeout: Duration::from_secs(10),
        ytdlp_path: "yt-dlp".to_string(),
        ffmpeg_path: "ffmpeg".to_string(),
        download_retries: 1,
        transform: TransformRanges::default(),
    }
}

pub fn test_store(config: &Config) -> InventoryStore {
    InventoryStore::from_config(config)
}

/// A `NewVideo` whose raw file actually exists under the config's raw dir.
pub fn seeded_video(config: &Config, id: &str) -> NewVideo {
    std::fs::create_dir_all(&config.raw_dir).unwrap();
    let raw_path = config.raw_dir.join(format!("{id}.mp4"));
    std::fs::write(&raw_path, b"raw-bytes").unwrap();
    NewVideo {
        video_id: id.to_string(),
        source_url: format!("https://example.test/watch?v={id}"),
        title: format!("video {id}"),
        duration_secs: 42,
        local_path_raw: raw_path.display().to_string(),
    }
}
