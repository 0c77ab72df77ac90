//! # vidscan - Video Contact Sheet Library
//!
//! `vidscan` builds a single "scan" image for a video: frames sampled at evenly
//! spaced timestamps, arranged in a grid under a header of formatted metadata.
//!
//! ## Features
//!
//! - Timeline scheduling with optional avoidance of the video's start and end
//! - Grid composition with letterboxed or center-cropped frames
//! - Template-driven header text with wrapping, truncation and drop shadows
//! - Parallel frame extraction through `ffmpeg`
//! - JSON or TOML configuration with shipped defaults
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use vidscan::{probe, ConfigStore, FfmpegFrameSource, ScanCreator};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ConfigStore::locate(None).load("default")?;
//! let creator = ScanCreator::new(config)?;
//!
//! let video = Path::new("movie.mkv");
//! let info = probe(video, "ffprobe")?;
//! let source = FfmpegFrameSource::new(video);
//! let path = creator.create_scan(&source, &info, 0, Path::new("scans"))?;
//! println!("saved {}", path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! ```no_run
//! use vidscan::{probe, ConfigStore, FfmpegFrameSource, ProgressPhase, ScanCreator};
//! use std::path::Path;
//! use std::time::SystemTime;
//!
//! # fn main() -> anyhow::Result<()> {
//! let creator = ScanCreator::new(ConfigStore::locate(None).load("default")?)?;
//! let info = probe(Path::new("movie.mkv"), "ffprobe")?;
//!
//! creator.create_scan_with_progress(
//!     &FfmpegFrameSource::new("movie.mkv"),
//!     &info,
//!     0,
//!     Path::new("scans"),
//!     SystemTime::now(),
//!     |progress| match progress.phase {
//!         ProgressPhase::ExtractingFrames => {
//!             println!("Extracting: {}/{}", progress.completed, progress.total)
//!         }
//!         ProgressPhase::Composing => println!("Composing..."),
//!         ProgressPhase::Saving => println!("Saving..."),
//!         ProgressPhase::Complete => println!("Done!"),
//!     },
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod compose;
pub mod config;
pub mod error;
pub mod font;
pub mod frames;
pub mod geometry;
pub mod metadata;
pub mod output;
pub mod probe;
pub mod schedule;
pub mod store;
pub mod text;

use anyhow::{Context, Result};
use image::{RgbImage, RgbaImage};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use compose::{Composer, Frame};
pub use config::{FontSpec, GlobalConfig, LayoutConfig, ScaleMethod, ScanConfig, TextPositioning};
pub use error::{ScanError, ScanResult};
pub use font::GlyphFont;
pub use frames::{extract_frames, FfmpegFrameSource, FrameSource};
pub use geometry::{GridShape, Margins, Point, Size};
pub use metadata::{FieldRegistry, Fragment, Metadata, PLACEHOLDER};
pub use probe::{probe, VideoInfo, VideoStream};
pub use schedule::{schedule, TimelinePlan};
pub use store::ConfigStore;
pub use text::{FaceSet, TextEngine, TextLayout, Typeface};

/// Represents the current phase of a scan run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Pulling snapshot frames out of the video
    ExtractingFrames,
    /// Laying out the header and the frame grid
    Composing,
    /// Downscaling and writing the PNG
    Saving,
    /// Scan written successfully
    Complete,
}

/// Progress information for scan runs
///
/// This struct provides detailed progress information that can be used
/// to display progress in UI applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the run
    pub phase: ProgressPhase,
    /// Number of items completed in the current phase
    pub completed: usize,
    /// Total number of items in the current phase (0 if unknown/indeterminate)
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// Progress update for frame extraction
    pub fn extracting_frames(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::ExtractingFrames,
            completed,
            total,
            percentage,
            message: format!("Extracting frame {} of {}", completed, total),
        }
    }

    pub fn composing() -> Self {
        Self {
            phase: ProgressPhase::Composing,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Composing scan...".to_string(),
        }
    }

    pub fn saving() -> Self {
        Self {
            phase: ProgressPhase::Saving,
            completed: 0,
            total: 0,
            percentage: 0.0,
            message: "Saving scan...".to_string(),
        }
    }

    /// Create a completion progress update
    pub fn complete(total_frames: usize) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            message: format!("Scan complete: {} frames", total_frames),
        }
    }
}

/// Runs the whole scan pipeline for one validated configuration.
pub struct ScanCreator {
    composer: Composer,
}

impl ScanCreator {
    /// Load the configured fonts and logo from disk.
    pub fn new(config: ScanConfig) -> Result<Self> {
        let faces = font::load_faces(&config.global().fonts)?;
        let logo = match &config.global().logo_file {
            Some(path) => Some(compose::load_logo(path, config.layout().logo_size)?),
            None => None,
        };
        Ok(Self::with_faces(config, faces, logo)?)
    }

    /// Build with caller-supplied typefaces, indexed like the config's fonts.
    /// A logo, if any, should already fit the layout's `logo_size`.
    pub fn with_faces(config: ScanConfig, faces: FaceSet, logo: Option<RgbaImage>) -> ScanResult<Self> {
        Ok(Self {
            composer: Composer::new(config, faces, logo)?,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        self.composer.config()
    }

    /// Compose a scan canvas from already extracted frames.
    pub fn compose(&self, frames: &[Frame], timestamps: &[f64], metadata: &Metadata) -> ScanResult<RgbImage> {
        self.composer.compose(frames, timestamps, metadata)
    }

    /// Create a scan for `info` and write it into `out_dir`
    ///
    /// # Arguments
    ///
    /// * `source` - Frame source for the probed video
    /// * `info` - Probe result for the video
    /// * `stream` - Index into `info.video_streams` of the stream to sample
    /// * `out_dir` - Directory the PNG is written to
    pub fn create_scan(&self, source: &dyn FrameSource, info: &VideoInfo, stream: usize, out_dir: &Path) -> Result<PathBuf> {
        self.create_scan_with_progress(source, info, stream, out_dir, SystemTime::now(), |_| {})
    }

    /// Create a scan with detailed progress reporting. `now` feeds the
    /// `{timestamp}` placeholder of the output file name.
    pub fn create_scan_with_progress<F>(
        &self,
        source: &dyn FrameSource,
        info: &VideoInfo,
        stream: usize,
        out_dir: &Path,
        now: SystemTime,
        progress_callback: F,
    ) -> Result<PathBuf>
    where
        F: Fn(Progress) + Send + Sync,
    {
        let global = self.config().global();
        let metadata = info.to_metadata(stream)?;
        let map_index = info.stream(stream)?.map_index;
        let plan = schedule::schedule(info.duration, global.grid_shape, global.avoid_leading, global.avoid_ending)
            .with_context(|| format!("scheduling snapshots for {}", info.file_name))?;
        let total = plan.len();

        // Phase 1: Extract frames
        progress_callback(Progress::extracting_frames(0, total));
        let frames = extract_frames(source, plan.timestamps(), map_index, |done, total| {
            progress_callback(Progress::extracting_frames(done, total));
        });
        let missing = frames.iter().filter(|f| f.is_missing()).count();
        if missing > 0 {
            warn!("{} of {} snapshots could not be extracted", missing, total);
        }

        // Phase 2: Compose
        progress_callback(Progress::composing());
        let canvas = self.composer.compose(&frames, plan.timestamps(), &metadata)?;

        // Phase 3: Downscale and save
        progress_callback(Progress::saving());
        let canvas = output::downscale(canvas, global.resize_scale);
        let name = output::resolve_file_name(&global.output_filename_format, &info.file_name, now)?;
        let path = output::save_scan(&canvas, out_dir, &name)?;
        info!("{}x{} scan of {} written", canvas.width(), canvas.height(), info.file_name);

        progress_callback(Progress::complete(total));
        Ok(path)
    }
}
