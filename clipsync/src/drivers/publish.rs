//! Publish-status driver: the three operations an external orchestrator
//! calls around its out-of-band publish action.

use tracing::info;

use crate::inventory::{InventoryStore, RecordPatch, VideoRecord, VideoStatus};
use crate::Result;

/// Default reason recorded when the publisher reports a failure without one.
const DEFAULT_FAILURE_REASON: &str = "reported failed by publisher";

/// Next `processed` record ready for publishing, if any. Does not claim.
pub async fn get_next(store: &InventoryStore) -> Result<Option<VideoRecord>> {
    store.peek_next_processed().await
}

/// Record that the external platform confirmed the publish.
///
/// Re-marking an already `posted` record is an idempotent no-op; marking a
/// `failed` record posted is rejected.
pub async fn mark_posted(store: &InventoryStore, video_id: &str) -> Result<VideoRecord> {
    let record = store
        .update(video_id, RecordPatch::status(VideoStatus::Posted))
        .await?;
    info!(video_id, "marked as posted");
    Ok(record)
}

/// Record that the external platform failed to publish.
pub async fn mark_failed(
    store: &InventoryStore,
    video_id: &str,
    reason: Option<&str>,
) -> Result<VideoRecord> {
    let reason = reason.unwrap_or(DEFAULT_FAILURE_REASON);
    let record = store
        .update(
            video_id,
            RecordPatch::status(VideoStatus::Failed).with_failure_reason(reason),
        )
        .await?;
    info!(video_id, reason, "marked as failed");
    Ok(record)
}
