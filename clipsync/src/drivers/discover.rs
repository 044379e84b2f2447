//! Discover driver: ingest at most one new video per invocation.

use std::path::Path;

use tracing::{info, warn};

use crate::collaborators::Downloader;
use crate::config::Config;
use crate::inventory::{InventoryStore, NewVideo, VideoRecord};
use crate::utils::fs::ensure_dir_all;
use crate::utils::retry::{RetryPolicy, retry_with_backoff};
use crate::{Error, Result};

/// Result of one discover invocation.
#[derive(Debug)]
pub enum DiscoverOutcome {
    /// A new record was appended as `pending`.
    Ingested(VideoRecord),
    /// The source (or every listed entry) is already in the inventory.
    AlreadyKnown { video_id: String },
    /// The listing produced no usable entries.
    NothingNew,
}

/// Run the discover stage for one source locator.
///
/// Listing and downloading happen outside the inventory lock; only the
/// duplicate checks and the final append acquire it.
pub async fn run(
    store: &InventoryStore,
    downloader: &dyn Downloader,
    config: &Config,
    source_url: &str,
) -> Result<DiscoverOutcome> {
    if source_url.is_empty() {
        return Err(Error::config("no source URL provided to discover"));
    }
    ensure_dir_all(&config.raw_dir).await?;
    store.ensure_exists().await?;

    // Re-discovery of a known source is a normal outcome, not an error.
    if let Some(hit) = store.find_duplicate(source_url).await? {
        info!(video_id = %hit.video_id, source_url, "source already in inventory");
        return Ok(DiscoverOutcome::AlreadyKnown {
            video_id: hit.video_id,
        });
    }

    let entries = downloader.list(source_url).await?;
    if entries.is_empty() {
        info!(source_url, "listing returned no entries");
        return Ok(DiscoverOutcome::NothingNew);
    }

    let known = store.known_ids().await?;
    let Some(target) = entries.iter().find(|e| !known.contains(&e.video_id)) else {
        info!(source_url, "no new videos found");
        return Ok(DiscoverOutcome::AlreadyKnown {
            video_id: entries[0].video_id.clone(),
        });
    };

    let policy = RetryPolicy::with_attempts(config.download_retries);
    let downloaded = retry_with_backoff("download", &policy, || {
        downloader.download(target, &config.raw_dir)
    })
    .await?;

    let local_path = downloaded.local_path.display().to_string();
    let new = NewVideo {
        video_id: downloaded.video_id.clone(),
        source_url: downloaded.source_url.clone(),
        title: downloaded.title.clone(),
        duration_secs: downloaded.duration_secs,
        local_path_raw: local_path.clone(),
    };

    match store.append(new).await {
        Ok(record) => {
            info!(video_id = %record.video_id, "ingested new video");
            Ok(DiscoverOutcome::Ingested(record))
        }
        // Lost a race with a concurrent discover. Both racers fetch through
        // the same output template, so the winner's record usually points at
        // the very file we just wrote; only remove it when the paths differ.
        Err(Error::DuplicateEntry { video_id, .. }) => {
            warn!(video_id, "video appended concurrently");
            let winner_has_our_file = store
                .load_all()
                .await?
                .iter()
                .find(|r| r.video_id == video_id)
                .is_some_and(|r| r.local_path_raw.as_deref() == Some(local_path.as_str()));
            if !winner_has_our_file {
                remove_quietly(&downloaded.local_path).await;
            }
            Ok(DiscoverOutcome::AlreadyKnown { video_id })
        }
        Err(e) => Err(e),
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), "failed to remove redundant download: {e}");
    }
}
