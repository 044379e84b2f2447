//! Record selection helpers.
//!
//! The store materializes records under lock and defers "which record is
//! next" decisions to these pure functions, so ordering and tie-break rules
//! live in one place and are trivially testable.

use super::model::{VideoRecord, VideoStatus};

/// Indices of records with `status`, ordered earliest `created_at` first
/// with a deterministic `video_id` tie-break.
pub(crate) fn sorted_indices(records: &[VideoRecord], status: VideoStatus) -> Vec<usize> {
    let mut indices: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.status == status)
        .map(|(i, _)| i)
        .collect();
    indices.sort_by(|&a, &b| {
        records[a]
            .created_at
            .cmp(&records[b].created_at)
            .then_with(|| records[a].video_id.cmp(&records[b].video_id))
    });
    indices
}
