#![allow(dead_code)]

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use vidscan::probe::{AudioSummary, SubtitleSummary};
use vidscan::{
    FaceSet, FontSpec, FrameSource, GlobalConfig, GridShape, LayoutConfig, ScanConfig, Typeface, VideoInfo, VideoStream,
};

/// Fixed-advance face painting every visible char as a solid block.
pub struct BlockFace {
    pub advance: f32,
    pub height: f32,
}

impl Typeface for BlockFace {
    fn text_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.advance
    }

    fn line_height(&self) -> f32 {
        self.height
    }

    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let left = x + (i as f32 * self.advance) as i32;
            for py in y.max(0)..(y + self.height as i32 - 1).max(0) {
                for px in left.max(0)..(left + self.advance as i32 - 1).max(0) {
                    if (px as u32) < canvas.width() && (py as u32) < canvas.height() {
                        canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

pub fn faces() -> FaceSet {
    vec![
        Arc::new(BlockFace { advance: 24.0, height: 40.0 }),
        Arc::new(BlockFace { advance: 14.0, height: 24.0 }),
        Arc::new(BlockFace { advance: 12.0, height: 20.0 }),
    ]
}

/// Solid 160x90 frames whose color depends on the timestamp; fails at
/// the listed timestamps.
pub struct ScriptedSource {
    pub fail_at: Vec<f64>,
}

pub fn frame_color(timestamp: f64) -> Rgb<u8> {
    Rgb([(timestamp as u32 % 256) as u8, 100, 200])
}

impl FrameSource for ScriptedSource {
    fn extract(&self, timestamp: f64, stream_index: usize) -> Result<RgbImage> {
        if stream_index != 0 {
            return Err(anyhow!("no stream {}", stream_index));
        }
        if self.fail_at.contains(&timestamp) {
            return Err(anyhow!("corrupt packet at {}", timestamp));
        }
        Ok(RgbImage::from_pixel(160, 90, frame_color(timestamp)))
    }
}

pub fn global(rows: u32, cols: u32) -> GlobalConfig {
    GlobalConfig {
        logo_file: None,
        fonts: (0..3)
            .map(|i| FontSpec {
                path: format!("fonts/{}.ttf", i).into(),
                size: 30,
            })
            .collect(),
        resize_scale: 1,
        avoid_leading: false,
        avoid_ending: false,
        grid_shape: GridShape::new(rows, cols).unwrap(),
        output_filename_format: "{file_name}.png".to_string(),
        max_text_multiline: 2,
    }
}

pub fn layout() -> LayoutConfig {
    serde_json::from_str(
        r#"{
            "canvas_width": 1200,
            "font_list": [0, 1, 1],
            "time_font": 2,
            "shade_offset": [2, 2],
            "text_color": [20, 20, 20],
            "shade_color": [180, 180, 180],
            "text_list": [
                [{"field": "text", "key": "file_name"}],
                ["Duration:", {"field": "duration_hms", "key": "duration"}, "Size:", {"field": "size_mib", "key": "file_size"}],
                ["Audio:", {"field": "text", "key": "audio_codec"}, {"field": "upper", "key": "audio_lang"}]
            ]
        }"#,
    )
    .unwrap()
}

pub fn config(rows: u32, cols: u32) -> ScanConfig {
    ScanConfig::new(global(rows, cols), layout()).unwrap()
}

pub fn video_info(duration: f64) -> VideoInfo {
    VideoInfo {
        file_name: "clip.mp4".to_string(),
        file_path: "/videos/clip.mp4".to_string(),
        file_size: 52_428_800,
        duration,
        bitrate: 3_500_000,
        video_streams: vec![VideoStream {
            map_index: 0,
            codec_name: "h264".to_string(),
            profile: "High".to_string(),
            pix_fmt: "yuv420p".to_string(),
            color_range: "tv".to_string(),
            color_space: "bt709".to_string(),
            width: 1920,
            height: 1080,
            sar: "1:1".to_string(),
            dar: "16:9".to_string(),
            frame_rate: 23.976,
        }],
        audio: AudioSummary {
            codec: "aac".to_string(),
            lang: "jpn/eng".to_string(),
            title: String::new(),
            sample_rate: "48000".to_string(),
            channels: "2".to_string(),
            channel_layout: "stereo".to_string(),
        },
        subtitle: SubtitleSummary::default(),
    }
}
