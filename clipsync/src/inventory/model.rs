//! Video record model and status state machine.

use chrono::{DateTime, TimeZone, Utc};

use crate::{Error, Result};

/// Current UTC time truncated to microseconds, the precision the store
/// round-trips through its RFC 3339 columns.
pub(crate) fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_micros(now.timestamp_micros())
        .single()
        .unwrap_or(now)
}

/// Lifecycle status of a tracked video.
///
/// The wire form is lowercase (`pending`, `processing`, ...), matching the
/// `status` column of the inventory file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VideoStatus {
    /// Discovered and downloaded, waiting for the transform stage.
    Pending,
    /// Claimed by a transform driver; the transform may still be running.
    Processing,
    /// Transform finished, waiting for the external publisher.
    Processed,
    /// The external publisher confirmed the upload.
    Posted,
    /// A stage failed; `failure_reason` holds the cause.
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "posted" => Some(Self::Posted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Failed)
    }
}

/// Outcome of validating a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record moves forward to the new status.
    Advance,
    /// Re-marking a terminal record with the same status; tolerated, no
    /// mutation happens.
    NoOp,
}

/// Validate a status change against the transition table.
///
/// Forward edges only, plus a recovery edge to `Failed` from any
/// non-terminal status. Re-marking the same terminal status is a no-op;
/// every other combination is rejected.
pub fn check_transition(from: VideoStatus, to: VideoStatus) -> Result<Transition> {
    use VideoStatus::*;

    if from == to && from.is_terminal() {
        return Ok(Transition::NoOp);
    }
    let allowed = matches!(
        (from, to),
        (Pending, Processing) | (Processing, Processed) | (Processed, Posted)
    ) || (to == Failed && !from.is_terminal());

    if allowed {
        Ok(Transition::Advance)
    } else {
        Err(Error::invalid_transition(from.as_str(), to.as_str()))
    }
}

/// One tracked video and its lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub video_id: String,
    pub source_url: String,
    pub title: String,
    pub duration_secs: i64,
    pub local_path_raw: Option<String>,
    pub local_path_processed: Option<String>,
    pub status: VideoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

/// Data required to create a new `Pending` record.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub video_id: String,
    pub source_url: String,
    pub title: String,
    pub duration_secs: i64,
    pub local_path_raw: String,
}

impl NewVideo {
    pub(crate) fn into_record(self, now: DateTime<Utc>) -> VideoRecord {
        VideoRecord {
            video_id: self.video_id,
            source_url: self.source_url,
            title: self.title,
            duration_secs: self.duration_secs,
            local_path_raw: Some(self.local_path_raw),
            local_path_processed: None,
            status: VideoStatus::Pending,
            created_at: now,
            updated_at: now,
            failure_reason: None,
        }
    }
}

/// Field-level mutation applied by `InventoryStore::update`.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub status: Option<VideoStatus>,
    pub local_path_processed: Option<String>,
    pub failure_reason: Option<String>,
}

impl RecordPatch {
    pub fn status(status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_processed_path(mut self, path: impl Into<String>) -> Self {
        self.local_path_processed = Some(path.into());
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in [
            VideoStatus::Pending,
            VideoStatus::Processing,
            VideoStatus::Processed,
            VideoStatus::Posted,
            VideoStatus::Failed,
        ] {
            assert_eq!(VideoStatus::parse(status.as_str()), Some(status));
            assert_eq!(status.to_string(), status.as_str());
        }
        assert_eq!(VideoStatus::parse("POSTED"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(VideoStatus::Posted.is_terminal());
        assert!(VideoStatus::Failed.is_terminal());
        assert!(!VideoStatus::Pending.is_terminal());
        assert!(!VideoStatus::Processing.is_terminal());
        assert!(!VideoStatus::Processed.is_terminal());
    }

    #[test]
    fn forward_edges_advance() {
        use VideoStatus::*;
        for (from, to) in [
            (Pending, Processing),
            (Processing, Processed),
            (Processed, Posted),
        ] {
            assert_eq!(check_transition(from, to).unwrap(), Transition::Advance);
        }
    }

    #[test]
    fn any_non_terminal_can_fail() {
        use VideoStatus::*;
        for from in [Pending, Processing, Processed] {
            assert_eq!(
                check_transition(from, Failed).unwrap(),
                Transition::Advance
            );
        }
    }

    #[test]
    fn terminal_remark_is_noop_same_status_only() {
        use VideoStatus::*;
        assert_eq!(check_transition(Posted, Posted).unwrap(), Transition::NoOp);
        assert_eq!(check_transition(Failed, Failed).unwrap(), Transition::NoOp);
        assert!(check_transition(Posted, Failed).is_err());
        assert!(check_transition(Failed, Posted).is_err());
    }

    #[test]
    fn backwards_edges_rejected() {
        use VideoStatus::*;
        assert!(check_transition(Processing, Pending).is_err());
        assert!(check_transition(Processed, Pending).is_err());
        assert!(check_transition(Posted, Processing).is_err());
        assert!(check_transition(Pending, Posted).is_err());
        assert!(check_transition(Pending, Processed).is_err());
    }
}
