use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};
use log::{debug, warn};
use rayon::prelude::*;
use std::path::PathBuf;
use std::process::Command as ProcCommand;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::compose::Frame;

/// Supplies one decoded frame per timestamp. Calls may run concurrently.
///
/// `stream_index` counts every video stream of the file, attached pictures
/// included (see [`VideoStream::map_index`](crate::probe::VideoStream::map_index)).
pub trait FrameSource: Send + Sync {
    fn extract(&self, timestamp: f64, stream_index: usize) -> Result<RgbImage>;
}

/// Pipes a single PNG frame out of `ffmpeg` per request.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg: String,
    input: PathBuf,
}

impl FfmpegFrameSource {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            input: input.into(),
        }
    }

    /// Use a different `ffmpeg` executable.
    pub fn with_command(mut self, ffmpeg: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }
}

impl FrameSource for FfmpegFrameSource {
    fn extract(&self, timestamp: f64, stream_index: usize) -> Result<RgbImage> {
        let seek = format!("{:.3}", timestamp);
        let map = format!("0:v:{}", stream_index);
        debug!("{} -ss {} -i {} -map {}", self.ffmpeg, seek, self.input.display(), map);

        // Input seeking: ffmpeg jumps to the preceding keyframe, then decodes up to the exact timestamp
        let output = ProcCommand::new(&self.ffmpeg)
            .args(["-loglevel", "error", "-ss", &seek, "-i"])
            .arg(&self.input)
            .args(["-map", &map, "-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .context("running ffmpeg")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffmpeg failed at {}s: {}",
                seek,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        if output.stdout.is_empty() {
            return Err(anyhow!("ffmpeg produced no frame at {}s", seek));
        }

        let frame = image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .with_context(|| format!("decoding frame at {}s", seek))?;
        Ok(frame.to_rgb8())
    }
}

/// Extract one frame per timestamp in parallel. Results keep timestamp
/// order; a failed extraction becomes [`Frame::Missing`].
pub fn extract_frames<F>(source: &dyn FrameSource, timestamps: &[f64], stream_index: usize, on_frame: F) -> Vec<Frame>
where
    F: Fn(usize, usize) + Send + Sync,
{
    let total = timestamps.len();
    let completed = AtomicUsize::new(0);

    timestamps
        .par_iter()
        .enumerate()
        .map(|(i, &timestamp)| {
            let frame = match source.extract(timestamp, stream_index) {
                Ok(img) => Frame::Decoded(img),
                Err(e) => {
                    warn!("snapshot {} at {:.3}s failed, using placeholder: {:#}", i + 1, timestamp, e);
                    Frame::Missing
                }
            };
            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
            on_frame(current, total);
            frame
        })
        .collect()
}
