//! `ffprobe` adapter: stream discovery and the metadata dictionary.

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command as ProcCommand;

use crate::error::{ScanError, ScanResult};
use crate::metadata::{Metadata, PLACEHOLDER};

/// Codecs ffprobe reports as video streams that are really cover art.
const ATTACHED_PICTURE_CODECS: [&str; 3] = ["png", "jpeg", "mjpeg"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    profile: Option<String>,
    pix_fmt: Option<String>,
    color_range: Option<String>,
    color_space: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_aspect_ratio: Option<String>,
    display_aspect_ratio: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// One decodable video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStream {
    /// Position among all of the file's video streams, cover art included;
    /// the `N` of ffmpeg's `-map 0:v:N`.
    pub map_index: usize,
    pub codec_name: String,
    pub profile: String,
    pub pix_fmt: String,
    pub color_range: String,
    pub color_space: String,
    pub width: u32,
    pub height: u32,
    pub sar: String,
    pub dar: String,
    pub frame_rate: f64,
}

impl VideoStream {
    /// `h264 (High, 3x8bit)`; the bit layout is omitted for unknown pixel formats.
    pub fn codec_label(&self) -> String {
        match pixel_format_info(&self.pix_fmt) {
            Some((channels, depth)) => format!("{} ({}, {}x{}bit)", self.codec_name, self.profile, channels, depth),
            None => format!("{} ({})", self.codec_name, self.profile),
        }
    }

    /// `yuv420p (tv, bt709)`
    pub fn color_label(&self) -> String {
        format!("{} ({}, {})", self.pix_fmt, self.color_range, self.color_space)
    }

    /// `1920x1080 (1:1/16:9)`
    pub fn frame_size_label(&self) -> String {
        format!(
            "{}x{} ({}/{})",
            self.width,
            self.height,
            shorten_aspect_ratio(&self.sar),
            shorten_aspect_ratio(&self.dar)
        )
    }
}

/// Audio properties aggregated over every audio track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSummary {
    pub codec: String,
    pub lang: String,
    pub title: String,
    pub sample_rate: String,
    pub channels: String,
    pub channel_layout: String,
}

impl AudioSummary {
    /// `stereo(2@48 kHz)`
    pub fn channel_label(&self) -> String {
        if self.channels.is_empty() && self.channel_layout.is_empty() {
            return String::new();
        }
        let khz: Vec<String> = self
            .sample_rate
            .split('/')
            .filter_map(|hz| hz.trim().parse::<f64>().ok())
            .map(|hz| format!("{} kHz", (hz / 1000.0).floor() as u64))
            .collect();
        if khz.is_empty() {
            return format!("{}({})", self.channel_layout, self.channels);
        }
        format!("{}({}@{})", self.channel_layout, self.channels, khz.join("/"))
    }
}

/// Subtitle properties aggregated over every subtitle track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleSummary {
    pub codec: String,
    pub lang: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub duration: f64,
    pub bitrate: u64,
    pub video_streams: Vec<VideoStream>,
    pub audio: AudioSummary,
    pub subtitle: SubtitleSummary,
}

impl VideoInfo {
    pub fn stream(&self, index: usize) -> ScanResult<&VideoStream> {
        if self.video_streams.is_empty() {
            return Err(ScanError::NoVideoStream);
        }
        self.video_streams.get(index).ok_or(ScanError::StreamOutOfRange {
            index,
            available: self.video_streams.len(),
        })
    }

    /// Metadata dictionary for the header template, describing `stream_index`.
    pub fn to_metadata(&self, stream_index: usize) -> ScanResult<Metadata> {
        let stream = self.stream(stream_index)?;
        let mut meta = Metadata::new();
        meta.insert("file_name", self.file_name.as_str());
        meta.insert("file_path", self.file_path.as_str());
        meta.insert("file_size", self.file_size.to_string());
        meta.insert("duration", self.duration.to_string());
        if self.bitrate > 0 {
            meta.insert("bitrate", self.bitrate.to_string());
        }

        meta.insert("video_codec", stream.codec_label());
        meta.insert("video_color", stream.color_label());
        meta.insert("frame_size", stream.frame_size_label());
        meta.insert("frame_rate", stream.frame_rate.to_string());

        meta.insert("audio_codec", self.audio.codec.as_str());
        meta.insert("audio_lang", self.audio.lang.as_str());
        meta.insert("audio_title", self.audio.title.as_str());
        meta.insert("audio_sample_rate", self.audio.sample_rate.as_str());
        meta.insert("audio_channel", self.audio.channel_label());

        meta.insert("subtitle_codec", self.subtitle.codec.as_str());
        meta.insert("subtitle_lang", self.subtitle.lang.as_str());
        meta.insert("subtitle_title", self.subtitle.title.as_str());
        Ok(meta)
    }
}

/// `(channels, typical bit depth)` for common pixel formats.
fn pixel_format_info(pix_fmt: &str) -> Option<(u32, u32)> {
    let info = match pix_fmt {
        "gray" => (1, 8),
        "gray10le" | "gray10be" => (1, 10),
        "gray12le" | "gray12be" => (1, 12),
        "gray16le" | "gray16be" => (1, 16),
        "yuv410p" | "yuv411p" | "yuv420p" | "yuv422p" | "yuv440p" | "yuv444p" => (3, 8),
        "yuvj411p" | "yuvj420p" | "yuvj422p" | "yuvj440p" | "yuvj444p" => (3, 8),
        "nv12" | "nv16" | "nv21" | "nv24" | "yuyv422" | "uyvy422" => (3, 8),
        "yuv420p9le" | "yuv422p9le" | "yuv444p9le" => (3, 9),
        "yuv420p10le" | "yuv420p10be" | "yuv422p10le" | "yuv422p10be" | "yuv444p10le" | "yuv444p10be" => (3, 10),
        "p010le" | "p010be" | "p210le" | "p410le" => (3, 10),
        "yuv420p12le" | "yuv420p12be" | "yuv422p12le" | "yuv422p12be" | "yuv444p12le" | "yuv444p12be" => (3, 12),
        "yuv420p16le" | "yuv422p16le" | "yuv444p16le" | "p016le" => (3, 16),
        "rgb24" | "bgr24" | "gbrp" => (3, 8),
        "gbrp10le" | "gbrp10be" | "x2rgb10le" => (3, 10),
        "gbrp12le" | "gbrp12be" => (3, 12),
        "rgb48le" | "rgb48be" | "gbrp16le" => (3, 16),
        "rgba" | "bgra" | "argb" | "abgr" | "yuva420p" | "yuva422p" | "yuva444p" | "gbrap" => (4, 8),
        "yuva420p10le" | "yuva444p10le" | "gbrap10le" => (4, 10),
        "rgba64le" | "rgba64be" | "gbrap16le" => (4, 16),
        _ => return None,
    };
    Some(info)
}

/// `ddd:ddd` ratios become a two-decimal quotient; `d:d` and `dd:dd` stay.
fn shorten_aspect_ratio(ratio: &str) -> String {
    if ratio.is_empty() {
        return PLACEHOLDER.to_string();
    }
    let Some((num, den)) = ratio.split_once(':') else {
        return ratio.to_string();
    };
    if num.len() <= 2 && den.len() <= 2 {
        return ratio.to_string();
    }
    match (num.parse::<f64>(), den.parse::<f64>()) {
        (Ok(n), Ok(d)) if d != 0.0 => format!("{:.2}", n / d),
        _ => ratio.to_string(),
    }
}

/// `30000/1001` → 29.97…; `0/0` and unparsable rates → 0.
pub fn parse_frame_rate(rate: &str) -> f64 {
    let value = match rate.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 0.0,
        },
        None => rate.trim().parse().unwrap_or(0.0),
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Distinct values in first-seen order, placeholder and empty dropped, `/`-joined.
fn join_unique<I: IntoIterator<Item = String>>(values: I) -> String {
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        if value.is_empty() || value == PLACEHOLDER || seen.contains(&value) {
            continue;
        }
        seen.push(value);
    }
    seen.join("/")
}

fn or_placeholder(value: Option<String>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Build [`VideoInfo`] from `ffprobe -print_format json` output.
pub fn parse_probe_output(json: &str, path: &Path, file_size: u64) -> Result<VideoInfo> {
    let output: ProbeOutput = serde_json::from_str(json).context("parsing ffprobe output")?;

    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    if !(duration.is_finite() && duration > 0.0) {
        return Err(ScanError::InvalidDuration(duration).into());
    }
    let bitrate = output
        .format
        .bit_rate
        .as_deref()
        .and_then(|b| b.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let mut video_streams = Vec::new();
    let mut video_position = 0;
    let mut audio_tracks = Vec::new();
    let mut subtitle_tracks = Vec::new();
    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") => {
                let map_index = video_position;
                video_position += 1;
                let codec = stream.codec_name.clone().unwrap_or_default();
                if ATTACHED_PICTURE_CODECS.contains(&codec.as_str()) {
                    debug!("skipping attached picture stream 0:v:{} ({})", map_index, codec);
                    continue;
                }
                video_streams.push(VideoStream {
                    map_index,
                    codec_name: codec,
                    profile: or_placeholder(stream.profile),
                    pix_fmt: or_placeholder(stream.pix_fmt),
                    color_range: or_placeholder(stream.color_range),
                    color_space: or_placeholder(stream.color_space),
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    sar: stream.sample_aspect_ratio.unwrap_or_default(),
                    dar: stream.display_aspect_ratio.unwrap_or_default(),
                    frame_rate: stream.avg_frame_rate.as_deref().map(parse_frame_rate).unwrap_or(0.0),
                });
            }
            Some("audio") => audio_tracks.push(stream),
            Some("subtitle") => subtitle_tracks.push(stream),
            _ => {}
        }
    }
    if video_streams.is_empty() {
        return Err(ScanError::NoVideoStream.into());
    }

    let audio = AudioSummary {
        codec: join_unique(audio_tracks.iter().filter_map(|s| s.codec_name.clone())),
        lang: join_unique(audio_tracks.iter().filter_map(|s| s.tags.get("language").cloned())),
        title: join_unique(audio_tracks.iter().filter_map(|s| s.tags.get("title").cloned())),
        sample_rate: join_unique(audio_tracks.iter().filter_map(|s| s.sample_rate.clone())),
        channels: join_unique(audio_tracks.iter().filter_map(|s| s.channels.map(|c| c.to_string()))),
        channel_layout: join_unique(audio_tracks.iter().filter_map(|s| s.channel_layout.clone())),
    };
    let subtitle = SubtitleSummary {
        codec: join_unique(subtitle_tracks.iter().filter_map(|s| s.codec_name.clone())),
        lang: join_unique(subtitle_tracks.iter().filter_map(|s| s.tags.get("language").cloned())),
        title: join_unique(subtitle_tracks.iter().filter_map(|s| s.tags.get("title").cloned())),
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(VideoInfo {
        file_name,
        file_path: path.display().to_string(),
        file_size,
        duration,
        bitrate,
        video_streams,
        audio,
        subtitle,
    })
}

/// Run `ffprobe` on `path` and parse its report.
pub fn probe(path: &Path, ffprobe: &str) -> Result<VideoInfo> {
    if !path.is_file() {
        return Err(anyhow!("File not found: {}", path.display()));
    }
    let file_size = fs::metadata(path)
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();

    debug!("probing {} with {}", path.display(), ffprobe);
    let output = ProcCommand::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams", "-i"])
        .arg(path)
        .output()
        .context("running ffprobe")?;
    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json, path, file_size).with_context(|| format!("probing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "profile": "High", "pix_fmt": "yuv420p",
             "color_range": "tv", "color_space": "bt709", "width": 1920, "height": 1080,
             "sample_aspect_ratio": "1:1", "display_aspect_ratio": "16:9", "avg_frame_rate": "24000/1001"},
            {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2,
             "channel_layout": "stereo", "tags": {"language": "jpn", "title": "Main"}},
            {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2,
             "channel_layout": "stereo", "tags": {"language": "eng"}},
            {"codec_type": "subtitle", "codec_name": "ass", "tags": {"language": "chi", "title": "CHS"}},
            {"codec_type": "subtitle", "codec_name": "ass", "tags": {"language": "chi", "title": "CHT"}},
            {"codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600}
        ],
        "format": {"duration": "1425.058000", "bit_rate": "4512000", "format_name": "matroska,webm"}
    }"#;

    fn sample() -> VideoInfo {
        parse_probe_output(SAMPLE, Path::new("/videos/Episode 01.mkv"), 803_729_408).unwrap()
    }

    #[test]
    fn test_attached_pictures_are_excluded() {
        let info = sample();
        assert_eq!(info.video_streams.len(), 1);
        assert_eq!(info.video_streams[0].codec_name, "h264");
    }

    #[test]
    fn test_leading_cover_art_keeps_ffmpeg_stream_numbering() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"codec_type": "video", "codec_name": "hevc", "width": 3840, "height": 2160}
            ],
            "format": {"duration": "60"}
        }"#;
        let info = parse_probe_output(json, Path::new("a.mp4"), 1).unwrap();
        let picked: Vec<(&str, usize)> = info
            .video_streams
            .iter()
            .map(|s| (s.codec_name.as_str(), s.map_index))
            .collect();
        assert_eq!(picked, vec![("h264", 1), ("hevc", 2)]);
        assert_eq!(sample().video_streams[0].map_index, 0);
    }

    #[test]
    fn test_unknown_bitrate_and_sample_rate_are_left_out() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264"},
                {"codec_type": "audio", "codec_name": "opus", "channels": 2, "channel_layout": "stereo"}
            ],
            "format": {"duration": "60"}
        }"#;
        let info = parse_probe_output(json, Path::new("a.webm"), 1).unwrap();
        assert_eq!(info.audio.channel_label(), "stereo(2)");

        let meta = info.to_metadata(0).unwrap();
        assert_eq!(meta.get("bitrate"), None);
        assert_eq!(meta.get("audio_channel"), Some("stereo(2)"));
    }

    #[test]
    fn test_stream_labels() {
        let stream = &sample().video_streams[0];
        assert_eq!(stream.codec_label(), "h264 (High, 3x8bit)");
        assert_eq!(stream.color_label(), "yuv420p (tv, bt709)");
        assert_eq!(stream.frame_size_label(), "1920x1080 (1:1/16:9)");
        assert!((stream.frame_rate - 23.976).abs() < 1e-3);
    }

    #[test]
    fn test_tracks_are_aggregated() {
        let info = sample();
        assert_eq!(info.audio.codec, "aac");
        assert_eq!(info.audio.lang, "jpn/eng");
        assert_eq!(info.audio.title, "Main");
        assert_eq!(info.audio.channel_label(), "stereo(2@48 kHz)");
        assert_eq!(info.subtitle.lang, "chi");
        assert_eq!(info.subtitle.title, "CHS/CHT");
    }

    #[test]
    fn test_metadata_dictionary() {
        let meta = sample().to_metadata(0).unwrap();
        assert_eq!(meta.get("file_name"), Some("Episode 01.mkv"));
        assert_eq!(meta.get("duration"), Some("1425.058"));
        assert_eq!(meta.get("bitrate"), Some("4512000"));
        assert_eq!(meta.get("audio_sample_rate"), Some("48000"));
        assert_eq!(meta.get("subtitle_codec"), Some("ass"));
    }

    #[test]
    fn test_stream_selection_errors() {
        let info = sample();
        assert!(matches!(
            info.to_metadata(3),
            Err(ScanError::StreamOutOfRange { index: 3, available: 1 })
        ));
    }

    #[test]
    fn test_no_video_stream_is_fatal() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "flac"}], "format": {"duration": "10"}}"#;
        let err = parse_probe_output(json, Path::new("a.flac"), 1).unwrap_err();
        assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::NoVideoStream)));
    }

    #[test]
    fn test_missing_duration_is_fatal() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "h264"}], "format": {}}"#;
        let err = parse_probe_output(json, Path::new("a.mp4"), 1).unwrap_err();
        assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::InvalidDuration(_))));
    }

    #[test]
    fn test_shorten_aspect_ratio() {
        assert_eq!(shorten_aspect_ratio("16:9"), "16:9");
        assert_eq!(shorten_aspect_ratio("64:45"), "64:45");
        assert_eq!(shorten_aspect_ratio("853:480"), "1.78");
        assert_eq!(shorten_aspect_ratio(""), "N/A");
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), 25.0);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("garbage"), 0.0);
    }

    #[test]
    fn test_unknown_pixel_format_label() {
        let mut stream = sample().video_streams[0].clone();
        stream.pix_fmt = "weird".into();
        assert_eq!(stream.codec_label(), "h264 (High)");
    }
}
