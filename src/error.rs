use thiserror::Error;

/// Errors raised by the scan assembly core.
///
/// Adapters that talk to external processes or the filesystem return
/// `anyhow::Result` and wrap these where they bubble up.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("checksum mismatch for {name}: expected {expected}, found {actual} (the file may have been modified)")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("video duration must be positive, got {0}")]
    InvalidDuration(f64),

    #[error("cannot place {count} distinct snapshots in a {duration}s video")]
    DegenerateTimeline { duration: f64, count: usize },

    #[error("no video streams available")]
    NoVideoStream,

    #[error("video stream {index} is not available (0..{available})")]
    StreamOutOfRange { index: usize, available: usize },

    #[error("image count ({actual}) does not match the grid count ({expected})")]
    FrameCountMismatch { expected: usize, actual: usize },

    #[error("invalid output file name template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
