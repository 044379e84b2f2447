//! The inventory store: single source of truth for every video's state.
//!
//! All durable state lives in one columnar file. Every operation here is a
//! complete lock-scoped critical section: acquire the inventory lock, read
//! the full current file, mutate in memory, atomically replace the file,
//! release. Nothing is cached across invocations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use coltab::{Column, ColumnType, Field, Schema, Table, Value};
use tracing::{debug, info, warn};

use super::lock::InventoryLock;
use super::model::{
    NewVideo, RecordPatch, Transition, VideoRecord, VideoStatus, check_transition, now_utc,
};
use super::query::sorted_indices;
use crate::config::Config;
use crate::utils::fs::ensure_dir_all_sync;
use crate::{Error, Result};

const COL_VIDEO_ID: &str = "video_id";
const COL_SOURCE_URL: &str = "source_url";
const COL_TITLE: &str = "title";
const COL_DURATION: &str = "duration_secs";
const COL_PATH_RAW: &str = "local_path_raw";
const COL_PATH_PROCESSED: &str = "local_path_processed";
const COL_STATUS: &str = "status";
const COL_CREATED_AT: &str = "created_at";
const COL_UPDATED_AT: &str = "updated_at";
const COL_FAILURE_REASON: &str = "failure_reason";

/// A duplicate-check hit: the already-known record's identity.
#[derive(Debug, Clone)]
pub struct DuplicateHit {
    pub video_id: String,
    pub source_url: String,
}

/// File-backed inventory of video records.
#[derive(Debug, Clone)]
pub struct InventoryStore {
    path: PathBuf,
    lock: InventoryLock,
}

impl InventoryStore {
    pub fn new(path: PathBuf, lock_path: PathBuf, lock_timeout: Duration) -> Self {
        Self {
            path,
            lock: InventoryLock::new(lock_path, lock_timeout),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.inventory_path(),
            config.lock_path(),
            config.lock_timeout,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty inventory file with the expected schema if missing.
    pub async fn ensure_exists(&self) -> Result<()> {
        let _guard = self.lock.acquire().await?;
        if self.path.exists() {
            return Ok(());
        }
        self.persist(&[])?;
        info!(path = %self.path.display(), "created new inventory");
        Ok(())
    }

    /// Every record, fully decoded.
    pub async fn load_all(&self) -> Result<Vec<VideoRecord>> {
        let _guard = self.lock.acquire().await?;
        self.decode_all()
    }

    /// Insert a new `Pending` record.
    ///
    /// Fails with `DuplicateEntry` if a record with the same `source_url`
    /// or `video_id` already exists; the store is left untouched.
    pub async fn append(&self, new: NewVideo) -> Result<VideoRecord> {
        let _guard = self.lock.acquire().await?;
        let mut records = self.decode_all()?;

        if let Some(existing) = records
            .iter()
            .find(|r| r.video_id == new.video_id || r.source_url == new.source_url)
        {
            return Err(Error::duplicate(&existing.video_id, &existing.source_url));
        }

        let record = new.into_record(now_utc());
        records.push(record.clone());
        self.persist(&records)?;
        info!(video_id = %record.video_id, "appended record to inventory");
        Ok(record)
    }

    /// Apply a field-level mutation to exactly one record.
    ///
    /// Status changes are validated against the transition table; an
    /// idempotent terminal re-mark returns the record unchanged without
    /// rewriting the store.
    pub async fn update(&self, video_id: &str, patch: RecordPatch) -> Result<VideoRecord> {
        let _guard = self.lock.acquire().await?;
        let mut records = self.decode_all()?;
        let idx = records
            .iter()
            .position(|r| r.video_id == video_id)
            .ok_or_else(|| Error::not_found(video_id))?;

        if let Some(to) = patch.status {
            if check_transition(records[idx].status, to)? == Transition::NoOp {
                debug!(video_id, status = to.as_str(), "terminal re-mark, no-op");
                return Ok(records[idx].clone());
            }
        } else if records[idx].status.is_terminal() {
            // Terminal records never mutate, with or without a status change.
            let status = records[idx].status.as_str();
            return Err(Error::invalid_transition(status, status));
        }

        apply_patch(&mut records[idx], &patch, now_utc());
        let updated = records[idx].clone();
        self.persist(&records)?;
        info!(
            video_id,
            status = updated.status.as_str(),
            "updated inventory record"
        );
        Ok(updated)
    }

    /// Look up an already-known record by source URL without decoding the
    /// full row set: only the identity columns are read.
    pub async fn find_duplicate(&self, source_url: &str) -> Result<Option<DuplicateHit>> {
        let _guard = self.lock.acquire().await?;
        if !self.path.exists() {
            return Ok(None);
        }
        let table = Table::read_columns(&self.path, &[COL_VIDEO_ID, COL_SOURCE_URL])
            .map_err(|e| self.map_coltab(e))?;
        let ids = str_column(&table, COL_VIDEO_ID, &self.path)?;
        let urls = str_column(&table, COL_SOURCE_URL, &self.path)?;

        Ok(urls.iter().position(|u| u == source_url).map(|i| DuplicateHit {
            video_id: ids[i].clone(),
            source_url: urls[i].clone(),
        }))
    }

    /// All known video ids, from a projection read of the id column only.
    pub async fn known_ids(&self) -> Result<HashSet<String>> {
        let _guard = self.lock.acquire().await?;
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let table =
            Table::read_columns(&self.path, &[COL_VIDEO_ID]).map_err(|e| self.map_coltab(e))?;
        Ok(str_column(&table, COL_VIDEO_ID, &self.path)?
            .iter()
            .cloned()
            .collect())
    }

    /// Claim the next eligible `Pending` record: mark it `Processing` and
    /// persist before returning, all under one lock acquisition, so no
    /// concurrent driver can claim the same record.
    pub async fn claim_next_pending(&self) -> Result<Option<VideoRecord>> {
        let _guard = self.lock.acquire().await?;
        let mut records = self.decode_all()?;

        let mut claimed = None;
        for idx in sorted_indices(&records, VideoStatus::Pending) {
            let record = &records[idx];
            match record.local_path_raw.as_deref() {
                Some(raw) if Path::new(raw).exists() => {
                    claimed = Some(idx);
                    break;
                }
                Some(raw) => {
                    warn!(
                        video_id = %record.video_id,
                        path = raw,
                        "raw file missing, skipping pending record"
                    );
                }
                None => {
                    warn!(
                        video_id = %record.video_id,
                        "pending record has no raw path, skipping"
                    );
                }
            }
        }

        let Some(idx) = claimed else {
            return Ok(None);
        };
        apply_patch(
            &mut records[idx],
            &RecordPatch::status(VideoStatus::Processing),
            now_utc(),
        );
        let record = records[idx].clone();
        self.persist(&records)?;
        info!(video_id = %record.video_id, "claimed pending record for transform");
        Ok(Some(record))
    }

    /// The next `Processed` record, without claiming it.
    ///
    /// Records whose processed file has vanished are marked `Failed` while
    /// scanning so they stop blocking the publish queue; this is the only
    /// mutation this query may perform.
    pub async fn peek_next_processed(&self) -> Result<Option<VideoRecord>> {
        let _guard = self.lock.acquire().await?;
        let mut records = self.decode_all()?;

        let mut found = None;
        let mut swept = false;
        for idx in sorted_indices(&records, VideoStatus::Processed) {
            let missing = records[idx]
                .local_path_processed
                .as_deref()
                .is_none_or(|p| !Path::new(p).exists());
            if !missing {
                found = Some(records[idx].clone());
                break;
            }
            warn!(
                video_id = %records[idx].video_id,
                "processed file missing, marking record failed"
            );
            apply_patch(
                &mut records[idx],
                &RecordPatch::status(VideoStatus::Failed)
                    .with_failure_reason("processed file missing on disk"),
                now_utc(),
            );
            swept = true;
        }

        if swept {
            self.persist(&records)?;
        }
        Ok(found)
    }

    // --- codec -----------------------------------------------------------

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(COL_VIDEO_ID, ColumnType::Str),
            Field::new(COL_SOURCE_URL, ColumnType::Str),
            Field::new(COL_TITLE, ColumnType::Str),
            Field::new(COL_DURATION, ColumnType::I64),
            Field::new(COL_PATH_RAW, ColumnType::OptStr),
            Field::new(COL_PATH_PROCESSED, ColumnType::OptStr),
            Field::new(COL_STATUS, ColumnType::Str),
            Field::new(COL_CREATED_AT, ColumnType::Str),
            Field::new(COL_UPDATED_AT, ColumnType::Str),
            Field::new(COL_FAILURE_REASON, ColumnType::OptStr),
        ])
    }

    fn map_coltab(&self, e: coltab::Error) -> Error {
        match e {
            coltab::Error::Io(e) => Error::Io(e),
            other => Error::CorruptInventory {
                path: self.path.clone(),
                reason: other.to_string(),
            },
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::CorruptInventory {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Decode the whole file. A missing file reads as an empty inventory.
    fn decode_all(&self) -> Result<Vec<VideoRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let table = Table::read(&self.path).map_err(|e| self.map_coltab(e))?;

        let ids = str_column(&table, COL_VIDEO_ID, &self.path)?;
        let urls = str_column(&table, COL_SOURCE_URL, &self.path)?;
        let titles = str_column(&table, COL_TITLE, &self.path)?;
        let durations = i64_column(&table, COL_DURATION, &self.path)?;
        let raw_paths = opt_str_column(&table, COL_PATH_RAW, &self.path)?;
        let processed_paths = opt_str_column(&table, COL_PATH_PROCESSED, &self.path)?;
        let statuses = str_column(&table, COL_STATUS, &self.path)?;
        let created = str_column(&table, COL_CREATED_AT, &self.path)?;
        let updated = str_column(&table, COL_UPDATED_AT, &self.path)?;
        let reasons = opt_str_column(&table, COL_FAILURE_REASON, &self.path)?;

        let mut records = Vec::with_capacity(table.rows());
        for i in 0..table.rows() {
            let status = VideoStatus::parse(&statuses[i])
                .ok_or_else(|| self.corrupt(format!("unknown status {:?}", statuses[i])))?;
            records.push(VideoRecord {
                video_id: ids[i].clone(),
                source_url: urls[i].clone(),
                title: titles[i].clone(),
                duration_secs: durations[i],
                local_path_raw: raw_paths[i].clone(),
                local_path_processed: processed_paths[i].clone(),
                status,
                created_at: self.parse_ts(&created[i])?,
                updated_at: self.parse_ts(&updated[i])?,
                failure_reason: reasons[i].clone(),
            });
        }
        Ok(records)
    }

    /// Encode all records and atomically replace the inventory file.
    fn persist(&self, records: &[VideoRecord]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            ensure_dir_all_sync(dir)?;
        }
        let mut table = Table::empty(Self::schema());
        for r in records {
            table
                .push_row(vec![
                    Value::Str(r.video_id.clone()),
                    Value::Str(r.source_url.clone()),
                    Value::Str(r.title.clone()),
                    Value::I64(r.duration_secs),
                    Value::OptStr(r.local_path_raw.clone()),
                    Value::OptStr(r.local_path_processed.clone()),
                    Value::Str(r.status.as_str().to_string()),
                    Value::Str(fmt_ts(r.created_at)),
                    Value::Str(fmt_ts(r.updated_at)),
                    Value::OptStr(r.failure_reason.clone()),
                ])
                .map_err(|e| self.map_coltab(e))?;
        }
        table.write_atomic(&self.path).map_err(|e| self.map_coltab(e))
    }

    fn parse_ts(&self, raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| self.corrupt(format!("invalid timestamp {raw:?}")))
    }
}

fn apply_patch(record: &mut VideoRecord, patch: &RecordPatch, now: DateTime<Utc>) {
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(path) = &patch.local_path_processed {
        record.local_path_processed = Some(path.clone());
    }
    if let Some(reason) = &patch.failure_reason {
        record.failure_reason = Some(reason.clone());
    }
    record.updated_at = now;
}

/// UTC timestamps persist as RFC 3339 with an explicit `+00:00` offset.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn str_column<'t>(table: &'t Table, name: &str, path: &Path) -> Result<&'t [String]> {
    typed_column(table, name, path, Column::as_str)
}

fn opt_str_column<'t>(table: &'t Table, name: &str, path: &Path) -> Result<&'t [Option<String>]> {
    typed_column(table, name, path, Column::as_opt_str)
}

fn i64_column<'t>(table: &'t Table, name: &str, path: &Path) -> Result<&'t [i64]> {
    typed_column(table, name, path, Column::as_i64)
}

fn typed_column<'t, T: ?Sized>(
    table: &'t Table,
    name: &str,
    path: &Path,
    cast: impl Fn(&'t Column) -> Option<&'t T>,
) -> Result<&'t T> {
    let corrupt = |reason: String| Error::CorruptInventory {
        path: path.to_path_buf(),
        reason,
    };
    let column = table
        .column(name)
        .map_err(|_| corrupt(format!("missing column {name}")))?;
    cast(column).ok_or_else(|| corrupt(format!("column {name} has unexpected type")))
}
