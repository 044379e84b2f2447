//! Transform driver: claim one pending record and re-encode it.

use std::path::Path;

use tracing::{error, info};

use crate::collaborators::{TransformEngine, TransformPlan};
use crate::config::Config;
use crate::inventory::{InventoryStore, RecordPatch, VideoRecord, VideoStatus};
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

/// Result of one transform invocation.
#[derive(Debug)]
pub enum TransformOutcome {
    /// A record was transformed and advanced to `processed`.
    Transformed(VideoRecord),
    /// No eligible `pending` record was found.
    NothingPending,
}

/// Run the transform stage once.
///
/// The claim persists `processing` before the slow transform starts, so a
/// crash mid-transform leaves a visibly claimed record instead of a
/// silently reprocessable `pending` one. The transform itself runs outside
/// the lock; the outcome is persisted under a fresh acquisition.
pub async fn run(
    store: &InventoryStore,
    engine: &dyn TransformEngine,
    config: &Config,
) -> Result<TransformOutcome> {
    ensure_dir_all(&config.processed_dir).await?;

    let Some(claimed) = store.claim_next_pending().await? else {
        info!("no pending videos to transform");
        return Ok(TransformOutcome::NothingPending);
    };

    // Claim guarantees the raw path is present and was on disk.
    let Some(raw_path) = claimed.local_path_raw.clone() else {
        return Err(Error::Other(format!(
            "claimed record {} has no raw path",
            claimed.video_id
        )));
    };
    let plan = TransformPlan::sample(&config.transform, &mut rand::rng());
    info!(video_id = %claimed.video_id, ?plan, "transforming claimed video");

    match engine
        .transform(Path::new(&raw_path), &config.processed_dir, &plan)
        .await
    {
        Ok(output) => {
            let record = store
                .update(
                    &claimed.video_id,
                    RecordPatch::status(VideoStatus::Processed)
                        .with_processed_path(output.display().to_string()),
                )
                .await?;
            info!(video_id = %record.video_id, output = %output.display(), "transform complete");
            Ok(TransformOutcome::Transformed(record))
        }
        Err(e) => {
            error!(video_id = %claimed.video_id, "transform failed: {e}");
            store
                .update(
                    &claimed.video_id,
                    RecordPatch::status(VideoStatus::Failed).with_failure_reason(e.to_string()),
                )
                .await?;
            // The inventory has recorded the failure; the caller still
            // sees a non-zero exit.
            Err(e)
        }
    }
}
