use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use log::debug;
use std::fs;
use std::sync::Arc;

use crate::compose::blend_pixel;
use crate::config::FontSpec;
use crate::text::{FaceSet, Typeface};

/// A TrueType/OpenType font rasterized at a fixed pixel size.
pub struct GlyphFont {
    font: FontVec,
    scale: PxScale,
}

/// `PxScale` for an em size in pixels. ab_glyph scales by the
/// ascent-to-descent height, which is larger than the em for most fonts.
fn em_to_px_scale(size: u32, height_unscaled: f32, units_per_em: Option<f32>) -> PxScale {
    match units_per_em {
        Some(upem) if upem > 0.0 && height_unscaled > 0.0 => PxScale::from(size as f32 * height_unscaled / upem),
        _ => PxScale::from(size as f32),
    }
}

impl GlyphFont {
    /// `size` is the em size in pixels.
    pub fn from_bytes(bytes: Vec<u8>, size: u32) -> Result<Self> {
        let font = FontVec::try_from_vec(bytes).context("parsing font data")?;
        let scale = em_to_px_scale(size, font.height_unscaled(), font.units_per_em());
        Ok(Self { font, scale })
    }

    pub fn load(spec: &FontSpec) -> Result<Self> {
        let bytes = fs::read(&spec.path).with_context(|| format!("reading font {}", spec.path.display()))?;
        Self::from_bytes(bytes, spec.size).with_context(|| format!("loading font {}", spec.path.display()))
    }

    /// Glyph ids of `text` paired with the pen x of each glyph, kerning applied.
    fn layout_glyphs(&self, text: &str) -> (Vec<(GlyphId, f32)>, f32) {
        let scaled = self.font.as_scaled(self.scale);
        let mut glyphs = Vec::with_capacity(text.len());
        let mut caret = 0.0;
        let mut prev: Option<GlyphId> = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                caret += scaled.kern(prev, id);
            }
            glyphs.push((id, caret));
            caret += scaled.h_advance(id);
            prev = Some(id);
        }
        (glyphs, caret)
    }
}

impl Typeface for GlyphFont {
    fn text_width(&self, text: &str) -> f32 {
        self.layout_glyphs(text).1
    }

    fn line_height(&self) -> f32 {
        let scaled = self.font.as_scaled(self.scale);
        scaled.ascent() - scaled.descent()
    }

    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        let baseline = y as f32 + self.font.as_scaled(self.scale).ascent();
        let (glyphs, _) = self.layout_glyphs(text);
        for (id, pen_x) in glyphs {
            let glyph = id.with_scale_and_position(self.scale, point(x as f32 + pen_x, baseline));
            let Some(outline) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outline.px_bounds();
            let (left, top) = (bounds.min.x as i32, bounds.min.y as i32);
            outline.draw(|gx, gy, coverage| {
                blend_pixel(canvas, left + gx as i32, top + gy as i32, color, coverage);
            });
        }
    }
}

/// Load every configured font, in config order.
pub fn load_faces(fonts: &[FontSpec]) -> Result<FaceSet> {
    let mut faces: FaceSet = Vec::with_capacity(fonts.len());
    for spec in fonts {
        let face = GlyphFont::load(spec)?;
        debug!(
            "loaded font {} at {}px (line height {:.1})",
            spec.path.display(),
            spec.size,
            face.line_height()
        );
        faces.push(Arc::new(face));
    }
    Ok(faces)
}
