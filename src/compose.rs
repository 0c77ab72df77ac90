//! Canvas composition: header block, logo and the snapshot grid.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use log::debug;
use std::path::Path;

use crate::config::{ScaleMethod, ScanConfig};
use crate::error::{ScanError, ScanResult};
use crate::geometry::{Point, Size};
use crate::metadata::{format_hms, Metadata};
use crate::text::{FaceSet, TextEngine, Typeface};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const LETTERBOX: Rgb<u8> = Rgb([0, 0, 0]);
/// Fill for cells whose frame could not be extracted.
pub const PLACEHOLDER_FILL: Rgb<u8> = Rgb([48, 48, 48]);

const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_BOX: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_BOX_ALPHA: f32 = 0.6;
const LABEL_PAD_X: u32 = 8;
const LABEL_PAD_Y: u32 = 4;

/// One grid cell's content.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Decoded(RgbImage),
    Missing,
}

impl Frame {
    pub fn is_missing(&self) -> bool {
        matches!(self, Frame::Missing)
    }
}

/// Blend `color` over the pixel at `(x, y)` with the given opacity.
/// Out-of-canvas coordinates are ignored.
pub(crate) fn blend_pixel(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, alpha: f32) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let px = canvas.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        px.0[c] = (color.0[c] as f32 * alpha + px.0[c] as f32 * (1.0 - alpha)).round() as u8;
    }
}

fn fill_rect(canvas: &mut RgbImage, origin: Point, size: Size, color: Rgb<u8>, alpha: f32) {
    for y in origin.y..origin.y + size.height as i32 {
        for x in origin.x..origin.x + size.width as i32 {
            blend_pixel(canvas, x, y, color, alpha);
        }
    }
}

/// Equal cell size derived from the canvas width and the first decoded
/// frame's aspect ratio, 16:9 when nothing decoded.
pub fn cell_size(canvas_width: u32, cols: u32, frames: &[Frame]) -> Size {
    let width = canvas_width / cols.max(1);
    let (fw, fh) = frames
        .iter()
        .find_map(|f| match f {
            Frame::Decoded(img) if img.width() > 0 && img.height() > 0 => Some(img.dimensions()),
            _ => None,
        })
        .unwrap_or((16, 9));
    let height = (fh as f64 / fw as f64 * width as f64).floor() as u32;
    Size::new(width, height.max(1))
}

/// Scale `frame` into `cell` without distortion.
pub fn fit_frame(frame: &RgbImage, cell: Size, method: ScaleMethod) -> RgbImage {
    let (fw, fh) = (frame.width() as f64, frame.height() as f64);
    let (cw, ch) = (cell.width as f64, cell.height as f64);
    match method {
        ScaleMethod::Fit => {
            let scale = (cw / fw).min(ch / fh);
            let w = ((fw * scale).round() as u32).clamp(1, cell.width);
            let h = ((fh * scale).round() as u32).clamp(1, cell.height);
            let resized = resize_to(frame, w, h);
            let mut out = RgbImage::from_pixel(cell.width, cell.height, LETTERBOX);
            imageops::replace(&mut out, &resized, ((cell.width - w) / 2) as i64, ((cell.height - h) / 2) as i64);
            out
        }
        ScaleMethod::Crop => {
            let scale = (cw / fw).max(ch / fh);
            let w = ((fw * scale).ceil() as u32).max(cell.width);
            let h = ((fh * scale).ceil() as u32).max(cell.height);
            let resized = resize_to(frame, w, h);
            imageops::crop_imm(&resized, (w - cell.width) / 2, (h - cell.height) / 2, cell.width, cell.height).to_image()
        }
    }
}

fn resize_to(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

/// Read a logo and fit it into a `box_size` square, aspect preserved.
pub fn load_logo(path: &Path, box_size: u32) -> Result<RgbaImage> {
    let bytes = std::fs::read(path).with_context(|| format!("reading logo {}", path.display()))?;
    let logo = image::load_from_memory(&bytes)
        .with_context(|| format!("decoding logo {}", path.display()))?
        .to_rgba8();
    Ok(fit_logo(&logo, box_size))
}

pub fn fit_logo(logo: &RgbaImage, box_size: u32) -> RgbaImage {
    let (w, h) = (logo.width().max(1) as f64, logo.height().max(1) as f64);
    let scale = (box_size as f64 / w).min(box_size as f64 / h);
    let tw = ((w * scale).round() as u32).clamp(1, box_size.max(1));
    let th = ((h * scale).round() as u32).clamp(1, box_size.max(1));
    imageops::resize(logo, tw, th, FilterType::Lanczos3)
}

fn paint_logo(canvas: &mut RgbImage, logo: &RgbaImage, origin: Point) {
    for (x, y, px) in logo.enumerate_pixels() {
        let alpha = px.0[3] as f32 / 255.0;
        if alpha > 0.0 {
            let color = Rgb([px.0[0], px.0[1], px.0[2]]);
            blend_pixel(canvas, origin.x + x as i32, origin.y + y as i32, color, alpha);
        }
    }
}

/// Builds the scan canvas for one validated config.
pub struct Composer {
    config: ScanConfig,
    text: TextEngine,
    logo: Option<RgbaImage>,
}

impl Composer {
    /// `logo` is expected to be fitted already (see [`load_logo`]).
    pub fn new(config: ScanConfig, faces: FaceSet, logo: Option<RgbaImage>) -> ScanResult<Self> {
        let layout = config.layout();
        let needed = layout
            .font_list
            .iter()
            .copied()
            .chain(std::iter::once(layout.time_font))
            .max()
            .unwrap_or(0);
        if needed >= faces.len() {
            return Err(ScanError::InvalidConfig(format!(
                "font index {} out of bounds ({} fonts loaded)",
                needed,
                faces.len()
            )));
        }
        let text = TextEngine::new(faces, layout, config.global().max_text_multiline);
        Ok(Self { config, text, logo })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn time_face(&self) -> &dyn Typeface {
        self.text.faces()[self.config.layout().time_font].as_ref()
    }

    pub fn compose(&self, frames: &[Frame], timestamps: &[f64], metadata: &Metadata) -> ScanResult<RgbImage> {
        let grid = self.config.global().grid_shape;
        let layout = self.config.layout();
        let expected = grid.count();
        for actual in [frames.len(), timestamps.len()] {
            if actual != expected {
                return Err(ScanError::FrameCountMismatch { expected, actual });
            }
        }

        let cell = cell_size(layout.canvas_width, grid.cols(), frames);
        let margin = layout.header_margin;

        // Header text box, narrowed by the logo column when a logo is set
        let logo_column = match &self.logo {
            Some(_) => layout.logo_size + layout.logo_spacing,
            None => 0,
        };
        let text_width = layout
            .canvas_width
            .saturating_sub(margin.horizontal())
            .saturating_sub(logo_column)
            .max(1);
        let anchor = Point::new(margin.left as i32, margin.top as i32);
        let text_layout = self.text.layout(
            anchor,
            Size::new(text_width, u32::MAX),
            &layout.text_list,
            &layout.font_list,
            metadata,
        )?;
        let logo_height = self.logo.as_ref().map(|l| l.height()).unwrap_or(0);
        let header_height = margin.vertical() + text_layout.extent().height.max(logo_height);

        let canvas_height = header_height + grid.rows() * cell.height;
        debug!(
            "canvas {}x{} (header {}, cell {}x{})",
            layout.canvas_width, canvas_height, header_height, cell.width, cell.height
        );
        let mut canvas = RgbImage::from_pixel(layout.canvas_width, canvas_height, BACKGROUND);

        self.text.paint(&mut canvas, &text_layout);
        if let Some(logo) = &self.logo {
            let x = layout.canvas_width as i32 - margin.right as i32 - logo.width() as i32;
            paint_logo(&mut canvas, logo, Point::new(x, margin.top as i32));
        }

        for (i, (frame, &timestamp)) in frames.iter().zip(timestamps).enumerate() {
            let (row, col) = grid.cell_of(i);
            let origin = Point::new((col * cell.width) as i32, (header_height + row * cell.height) as i32);
            match frame {
                Frame::Decoded(img) => {
                    let fitted = fit_frame(img, cell, layout.scale_method);
                    imageops::replace(&mut canvas, &fitted, origin.x as i64, origin.y as i64);
                }
                Frame::Missing => fill_rect(&mut canvas, origin, cell, PLACEHOLDER_FILL, 1.0),
            }
            self.paint_time_label(&mut canvas, origin, cell, timestamp);
        }

        Ok(canvas)
    }

    fn paint_time_label(&self, canvas: &mut RgbImage, cell_origin: Point, cell: Size, timestamp: f64) {
        let face = self.time_face();
        let label = format_hms(timestamp);
        let text_w = face.text_width(&label).ceil() as u32;
        let text_h = face.line_height().ceil() as u32;
        let box_size = Size::new(text_w + 2 * LABEL_PAD_X, text_h + 2 * LABEL_PAD_Y);

        let x = cell_origin.x + (cell.width as i32 - box_size.width as i32) / 2;
        let y = cell_origin.y + self.config.layout().timestamp_offset_y as i32;
        fill_rect(canvas, Point::new(x, y), box_size, LABEL_BOX, LABEL_BOX_ALPHA);
        face.draw_text(canvas, x + LABEL_PAD_X as i32, y + LABEL_PAD_Y as i32, &label, LABEL_TEXT);
    }
}
