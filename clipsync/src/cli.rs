//! Command-line interface definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clipsync")]
#[command(version, about = "File-backed coordinator for a discover/transform/publish video pipeline")]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download at most one new video for a source locator and record it
    Discover {
        /// Source URL (single video, playlist, or channel page)
        source_url: String,
    },

    /// Claim the next pending video and apply a randomized transform
    Transform,

    /// Publish-status operations driven by an external orchestrator
    #[command(subcommand)]
    Publish(PublishCommand),
}

#[derive(Subcommand)]
pub enum PublishCommand {
    /// Print the path of the next processed video (prints nothing when empty)
    GetNext,

    /// Mark a video as posted after a successful upload
    MarkPosted {
        /// Inventory video id
        video_id: String,
    },

    /// Mark a video as failed so it stops blocking the queue
    MarkFailed {
        /// Inventory video id
        video_id: String,
        /// Reason recorded in the inventory
        reason: Option<String>,
    },
}
