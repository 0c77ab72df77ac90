//! Typed configuration. Deserializing into these structs is the structural
//! (schema) stage; [`ScanConfig::new`] is the content stage.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ScanError, ScanResult};
use crate::geometry::{GridShape, Margins};
use crate::metadata::Fragment;
use crate::output;

pub const MIN_CANVAS_WIDTH: u32 = 1200;

fn default_canvas_width() -> u32 {
    3200
}
fn default_output_filename_format() -> String {
    output::DEFAULT_FILENAME_FORMAT.to_string()
}
fn default_max_text_multiline() -> usize {
    3
}
fn default_vertical_spacing() -> u32 {
    10
}
fn default_horizontal_spacing() -> u32 {
    6
}
fn default_title_spacing() -> u32 {
    22
}
fn default_column_spacing() -> u32 {
    25
}
fn default_logo_spacing() -> u32 {
    10
}
fn default_logo_size() -> u32 {
    405
}
fn default_timestamp_offset_y() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontSpec {
    pub path: PathBuf,
    pub size: u32,
}

/// Settings shared by every layout: fonts, logo, sampling and output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(default)]
    pub logo_file: Option<PathBuf>,
    pub fonts: Vec<FontSpec>,
    pub resize_scale: u32,
    #[serde(default)]
    pub avoid_leading: bool,
    #[serde(default)]
    pub avoid_ending: bool,
    pub grid_shape: GridShape,
    #[serde(default = "default_output_filename_format")]
    pub output_filename_format: String,
    #[serde(default = "default_max_text_multiline")]
    pub max_text_multiline: usize,
}

/// How decoded frames are fitted into the equal-sized grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMethod {
    /// Scale to fit inside the cell and letterbox on black.
    #[default]
    Fit,
    /// Scale to cover the cell and crop the overflow around the center.
    Crop,
}

/// Which placement strategy the text engine uses for header blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPositioning {
    #[default]
    Flow,
    /// Deprecated: explicit per-line offsets from `pos_list`.
    Absolute,
    /// Title line, then alternating label and value lines as side-by-side columns.
    Columns,
}

/// Header and grid appearance for one layout preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,
    pub font_list: Vec<usize>,
    pub time_font: usize,
    #[serde(default)]
    pub shade_offset: [i32; 2],
    pub text_color: [u8; 3],
    pub shade_color: [u8; 3],
    pub text_list: Vec<Vec<Fragment>>,
    #[serde(default = "default_vertical_spacing")]
    pub vertical_spacing: u32,
    #[serde(default = "default_horizontal_spacing")]
    pub horizontal_spacing: u32,
    #[serde(default = "default_title_spacing")]
    pub title_spacing: u32,
    /// Gap between label/value column pairs in `columns` positioning.
    #[serde(default = "default_column_spacing")]
    pub column_spacing: u32,
    #[serde(default = "default_logo_spacing")]
    pub logo_spacing: u32,
    #[serde(default)]
    pub header_margin: Margins,
    #[serde(default = "default_logo_size")]
    pub logo_size: u32,
    #[serde(default = "default_timestamp_offset_y")]
    pub timestamp_offset_y: u32,
    #[serde(default)]
    pub scale_method: ScaleMethod,
    #[serde(default)]
    pub text_positioning: TextPositioning,
    #[serde(default)]
    pub pos_list: Vec<[i32; 2]>,
}

/// A global config and a layout that passed content validation together.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    global: GlobalConfig,
    layout: LayoutConfig,
}

impl ScanConfig {
    pub fn new(global: GlobalConfig, layout: LayoutConfig) -> ScanResult<Self> {
        validate_global(&global)?;
        validate_layout(&layout, &global)?;
        Ok(Self { global, layout })
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Every referenced font and the logo must exist on disk.
    pub fn check_files(&self) -> Result<()> {
        for font in &self.global.fonts {
            if !font.path.is_file() {
                return Err(anyhow!("Font file does not exist: {}", font.path.display()));
            }
        }
        if let Some(logo) = &self.global.logo_file {
            if !logo.is_file() {
                return Err(anyhow!("Logo file does not exist: {}", logo.display()));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> ScanError {
    ScanError::InvalidConfig(message)
}

fn validate_global(global: &GlobalConfig) -> ScanResult<()> {
    if global.fonts.is_empty() {
        return Err(invalid("fonts must list at least one font".into()));
    }
    if let Some(font) = global.fonts.iter().find(|f| f.size == 0) {
        return Err(invalid(format!(
            "font size must be a positive integer: {}",
            font.path.display()
        )));
    }
    if global.resize_scale == 0 {
        return Err(invalid("resize_scale must be >= 1".into()));
    }
    if global.max_text_multiline == 0 {
        return Err(invalid("max_text_multiline must be >= 1".into()));
    }
    output::validate_template(&global.output_filename_format)?;
    Ok(())
}

fn validate_layout(layout: &LayoutConfig, global: &GlobalConfig) -> ScanResult<()> {
    if layout.canvas_width < MIN_CANVAS_WIDTH {
        return Err(invalid(format!(
            "canvas_width must be >= {}, got {}",
            MIN_CANVAS_WIDTH, layout.canvas_width
        )));
    }
    if layout.canvas_width < global.grid_shape.cols() {
        return Err(invalid(format!(
            "canvas_width {} is narrower than {} grid columns",
            layout.canvas_width,
            global.grid_shape.cols()
        )));
    }
    if layout.text_list.is_empty() {
        return Err(invalid("text_list must contain at least one line".into()));
    }
    if layout.font_list.len() != layout.text_list.len() {
        return Err(invalid(format!(
            "the length of font_list ({}) does not match the number of text_list rows ({})",
            layout.font_list.len(),
            layout.text_list.len()
        )));
    }

    let max_index = global.fonts.len() - 1;
    if let Some(idx) = layout.font_list.iter().find(|idx| **idx > max_index) {
        return Err(invalid(format!(
            "font_list contains index {} out of bounds (max {})",
            idx, max_index
        )));
    }
    if layout.time_font > max_index {
        return Err(invalid(format!(
            "time_font index {} out of bounds (max {})",
            layout.time_font, max_index
        )));
    }
    if global.logo_file.is_some() && layout.logo_size == 0 {
        return Err(invalid("logo_size must be >= 1 when a logo is configured".into()));
    }
    if layout.text_positioning == TextPositioning::Absolute && layout.pos_list.is_empty() {
        return Err(invalid("absolute text positioning requires a non-empty pos_list".into()));
    }
    Ok(())
}
