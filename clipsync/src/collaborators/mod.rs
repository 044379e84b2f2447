//! External collaborators invoked by the stage drivers.
//!
//! Downloading and transforming are delegated to external tools behind
//! trait seams, so drivers (and tests) never care which binary does the
//! work.

pub mod download;
pub mod transform;

pub use download::{DownloadedVideo, Downloader, RemoteEntry, YtDlpDownloader};
pub use transform::{FfmpegTransformer, TransformEngine, TransformPlan};
