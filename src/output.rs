//! Output stage: optional downscale, file name templating and PNG write.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ScanError, ScanResult};

pub const DEFAULT_FILENAME_FORMAT: &str = "{timestamp:%H%M%S}.scan.{file_name}.png";
const DEFAULT_TIMESTAMP_FORMAT: &str = "%H%M%S";

/// Integer downscale by `scale`; `1` returns the canvas untouched.
pub fn downscale(canvas: RgbImage, scale: u32) -> RgbImage {
    if scale <= 1 {
        return canvas;
    }
    let width = (canvas.width() / scale).max(1);
    let height = (canvas.height() / scale).max(1);
    debug!(
        "downscaling {}x{} by {} to {}x{}",
        canvas.width(),
        canvas.height(),
        scale,
        width,
        height
    );
    imageops::resize(&canvas, width, height, FilterType::Lanczos3)
}

enum Piece<'a> {
    Text(&'a str),
    FileName,
    Timestamp(&'a str),
}

fn template_error(template: &str, reason: impl Into<String>) -> ScanError {
    ScanError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.into(),
    }
}

fn parse_template(template: &str) -> ScanResult<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            pieces.push(Piece::Text(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| template_error(template, "unclosed '{'"))?;
        let piece = match &after[..close] {
            "file_name" => Piece::FileName,
            "timestamp" => Piece::Timestamp(DEFAULT_TIMESTAMP_FORMAT),
            other => match other.split_once(':') {
                Some(("timestamp", format)) => {
                    check_time_format(template, format)?;
                    Piece::Timestamp(format)
                }
                _ => return Err(template_error(template, format!("unknown placeholder '{{{}}}'", other))),
            },
        };
        pieces.push(piece);
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    Ok(pieces)
}

fn check_time_format(template: &str, format: &str) -> ScanResult<()> {
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('Y' | 'm' | 'd' | 'H' | 'M' | 'S' | '%') => {}
                Some(other) => {
                    return Err(template_error(template, format!("unsupported time directive '%{}'", other)))
                }
                None => return Err(template_error(template, "dangling '%' in time format")),
            }
        }
    }
    Ok(())
}

/// Check a file name template without resolving it.
pub fn validate_template(template: &str) -> ScanResult<()> {
    if !template.ends_with(".png") {
        return Err(template_error(template, "must end with .png"));
    }
    if template.contains('/') || template.contains('\\') {
        return Err(template_error(template, "must be a file name, not a path"));
    }
    parse_template(template).map(|_| ())
}

/// Broken-down UTC time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UtcTime {
    year: i64,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl UtcTime {
    fn from_system_time(time: SystemTime) -> Self {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let days = secs.div_euclid(86_400);
        let of_day = secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        Self {
            year,
            month,
            day,
            hour: (of_day / 3600) as u32,
            minute: (of_day % 3600 / 60) as u32,
            second: (of_day % 60) as u32,
        }
    }

    fn format(&self, format: &str) -> String {
        let mut out = String::with_capacity(format.len() + 8);
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('Y') => out.push_str(&format!("{:04}", self.year)),
                Some('m') => out.push_str(&format!("{:02}", self.month)),
                Some('d') => out.push_str(&format!("{:02}", self.day)),
                Some('H') => out.push_str(&format!("{:02}", self.hour)),
                Some('M') => out.push_str(&format!("{:02}", self.minute)),
                Some('S') => out.push_str(&format!("{:02}", self.second)),
                Some(other) => out.push(other),
                None => {}
            }
        }
        out
    }
}

/// Days since 1970-01-01 to a proleptic Gregorian `(year, month, day)`.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Fill the template with the video's file name and `now` (UTC).
pub fn resolve_file_name(template: &str, file_name: &str, now: SystemTime) -> ScanResult<String> {
    validate_template(template)?;
    let time = UtcTime::from_system_time(now);
    let safe_name: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    let mut name = String::new();
    for piece in parse_template(template)? {
        match piece {
            Piece::Text(text) => name.push_str(text),
            Piece::FileName => name.push_str(&safe_name),
            Piece::Timestamp(format) => name.push_str(&time.format(format)),
        }
    }
    Ok(name)
}

/// Write the canvas as PNG into `out_dir`, replacing any existing file.
pub fn save_scan(canvas: &RgbImage, out_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let path = out_dir.join(name);
    canvas
        .save_with_format(&path, ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("scan saved to {}", path.display());
    Ok(path)
}
