//! Download collaborator: listing and fetching source videos.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::{Error, Result};

/// One candidate video found when expanding a source locator.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub duration_secs: i64,
}

/// A fetched video plus the metadata the inventory records.
#[derive(Debug, Clone)]
pub struct DownloadedVideo {
    pub video_id: String,
    pub source_url: String,
    pub title: String,
    pub duration_secs: i64,
    pub local_path: PathBuf,
}

/// Download collaborator interface.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Expand a source locator into candidate videos. A single-video URL
    /// yields one entry.
    async fn list(&self, source_url: &str) -> Result<Vec<RemoteEntry>>;

    /// Fetch one entry into `dest_dir`.
    async fn download(&self, entry: &RemoteEntry, dest_dir: &Path) -> Result<DownloadedVideo>;
}

/// Metadata line emitted by yt-dlp's JSON output.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    #[serde(rename = "_filename")]
    filename: Option<String>,
}

impl YtDlpEntry {
    fn best_url(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }

    fn duration_secs(&self) -> i64 {
        self.duration.map_or(0, |d| d.round() as i64)
    }
}

/// `yt-dlp`-backed downloader.
pub struct YtDlpDownloader {
    binary: String,
}

impl YtDlpDownloader {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], context_url: &str) -> Result<String> {
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::download(context_url, format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(Error::download(
                context_url,
                format!(
                    "{} exited with {}: {}",
                    self.binary,
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| Error::download(context_url, "tool produced non-UTF-8 output"))
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn list(&self, source_url: &str) -> Result<Vec<RemoteEntry>> {
        let stdout = self
            .run(
                &[
                    "--flat-playlist",
                    "--dump-json",
                    "--skip-download",
                    "--no-warnings",
                    source_url,
                ],
                source_url,
            )
            .await?;

        let mut entries = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let parsed: YtDlpEntry = match serde_json::from_str(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("skipping unparseable listing line: {e}");
                    continue;
                }
            };
            let (Some(id), Some(url)) = (parsed.id.clone(), parsed.best_url()) else {
                debug!("listing entry missing id or url, skipping");
                continue;
            };
            entries.push(RemoteEntry {
                video_id: id,
                url: url.to_string(),
                title: parsed.title.clone().unwrap_or_default(),
                duration_secs: parsed.duration_secs(),
            });
        }
        Ok(entries)
    }

    async fn download(&self, entry: &RemoteEntry, dest_dir: &Path) -> Result<DownloadedVideo> {
        let template = dest_dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();
        let stdout = self
            .run(
                &[
                    "--no-playlist",
                    "-f",
                    "bestvideo+bestaudio/best",
                    "-o",
                    &template,
                    "--print-json",
                    "--no-warnings",
                    &entry.url,
                ],
                &entry.url,
            )
            .await?;

        let info_line = stdout
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| Error::download(&entry.url, "no metadata JSON in tool output"))?;
        let info: YtDlpEntry = serde_json::from_str(info_line)
            .map_err(|e| Error::download(&entry.url, format!("bad metadata JSON: {e}")))?;

        let video_id = info.id.clone().unwrap_or_else(|| entry.video_id.clone());
        let local_path = match &info.filename {
            Some(name) => PathBuf::from(name),
            None => find_by_id(dest_dir, &video_id)
                .ok_or_else(|| Error::download(&entry.url, "downloaded file not found"))?,
        };
        if !local_path.exists() {
            return Err(Error::download(&entry.url, "downloaded file not found"));
        }

        Ok(DownloadedVideo {
            video_id,
            source_url: info
                .best_url()
                .map(str::to_string)
                .unwrap_or_else(|| entry.url.clone()),
            title: info.title.clone().unwrap_or_else(|| entry.title.clone()),
            duration_secs: info.duration_secs().max(entry.duration_secs),
            local_path,
        })
    }
}

/// Locate `dest_dir/<id>.<ext>` when the tool does not report a filename.
fn find_by_id(dest_dir: &Path, video_id: &str) -> Option<PathBuf> {
    let prefix = format!("{video_id}.");
    std::fs::read_dir(dest_dir).ok()?.find_map(|entry| {
        let entry = entry.ok()?;
        entry
            .file_name()
            .to_str()
            .filter(|name| name.starts_with(&prefix))
            .map(|_| entry.path())
    })
}

/// Last few stderr lines, for error messages.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail_start = lines.len().saturating_sub(4);
    lines[tail_start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_prefers_webpage_url() {
        let entry: YtDlpEntry = serde_json::from_str(
            r#"{"id":"abc","url":"https://cdn.test/abc","webpage_url":"https://example.test/watch?v=abc","duration":12.6}"#,
        )
        .unwrap();
        assert_eq!(entry.best_url(), Some("https://example.test/watch?v=abc"));
        assert_eq!(entry.duration_secs(), 13);
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let tail = stderr_tail(b"one\ntwo\n\nthree\nfour\nfive\n");
        assert_eq!(tail, "two | three | four | five");
    }
}
