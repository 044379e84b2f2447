//! Transform collaborator: randomized visual/audio re-encoding.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use rand::{Rng, RngExt};
use tracing::debug;

use crate::config::{Config, TransformRanges};
use crate::{Error, Result};

/// One sampled set of transform parameters.
///
/// Each run draws a fresh plan from the configured ranges, so repeated
/// transforms of similar inputs do not produce byte-identical outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    /// Center zoom factor, `>= 1.0`.
    pub zoom: f64,
    /// Horizontal mirror.
    pub mirror: bool,
    /// Hue rotation in degrees.
    pub hue_shift_deg: f64,
    /// Saturation multiplier.
    pub saturation: f64,
    /// Playback speed multiplier.
    pub speed: f64,
}

impl TransformPlan {
    /// Sample a plan from the configured ranges.
    pub fn sample<R: Rng + ?Sized>(ranges: &TransformRanges, rng: &mut R) -> Self {
        Self {
            zoom: rng.random_range(ranges.zoom.0..=ranges.zoom.1),
            mirror: rng.random::<bool>(),
            hue_shift_deg: rng.random_range(ranges.hue_shift_deg.0..=ranges.hue_shift_deg.1),
            saturation: rng.random_range(ranges.saturation.0..=ranges.saturation.1),
            speed: rng.random_range(ranges.speed.0..=ranges.speed.1),
        }
    }

    /// ffmpeg `-vf` filter chain for this plan.
    pub fn video_filter(&self) -> String {
        let mut parts = Vec::new();
        if self.zoom > 1.0 {
            // Crop a centered window and keep dimensions even for encoders.
            parts.push(format!(
                "crop=trunc(iw/{z}/2)*2:trunc(ih/{z}/2)*2",
                z = self.zoom
            ));
        }
        if self.mirror {
            parts.push("hflip".to_string());
        }
        parts.push(format!(
            "hue=h={h:.2}:s={s:.3}",
            h = self.hue_shift_deg,
            s = self.saturation
        ));
        parts.push(format!("setpts=PTS/{:.4}", self.speed));
        parts.join(",")
    }

    /// ffmpeg `-af` filter chain for this plan.
    pub fn audio_filter(&self) -> String {
        format!("atempo={:.4}", self.speed)
    }
}

/// Transform collaborator interface.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Apply `plan` to `input`, writing the result into `output_dir`.
    /// Returns the path of the new file.
    async fn transform(&self, input: &Path, output_dir: &Path, plan: &TransformPlan)
    -> Result<PathBuf>;
}

/// `ffmpeg`-backed transform engine.
pub struct FfmpegTransformer {
    binary: String,
}

impl FfmpegTransformer {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.ffmpeg_path.clone(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl TransformEngine for FfmpegTransformer {
    async fn transform(
        &self,
        input: &Path,
        output_dir: &Path,
        plan: &TransformPlan,
    ) -> Result<PathBuf> {
        let input_str = input.display().to_string();
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::transform(&input_str, "input has no usable file name"))?;
        let output = output_dir.join(format!("{stem}.mp4"));

        debug!(input = %input.display(), ?plan, "running ffmpeg transform");
        let result = tokio::process::Command::new(&self.binary)
            .arg("-y")
            .args(["-hide_banner", "-loglevel", "error"])
            .arg("-i")
            .arg(input)
            .args(["-vf", &plan.video_filter()])
            .args(["-af", &plan.audio_filter()])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::transform(&input_str, format!("failed to spawn {}: {e}", self.binary))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let reason = stderr.lines().last().unwrap_or("unknown ffmpeg error");
            return Err(Error::transform(
                &input_str,
                format!("{} exited with {}: {reason}", self.binary, result.status),
            ));
        }
        if !output.exists() {
            return Err(Error::transform(&input_str, "ffmpeg produced no output file"));
        }
        Ok(output)
    }
}
