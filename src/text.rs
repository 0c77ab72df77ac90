//! Header text layout: fragment resolution, greedy wrapping, truncation with
//! an ellipsis, block placement and shaded painting.

use image::{Rgb, RgbImage};
use log::debug;
use std::sync::Arc;

use crate::config::{LayoutConfig, TextPositioning};
use crate::error::{ScanError, ScanResult};
use crate::geometry::{Point, Size};
use crate::metadata::{FieldRegistry, Fragment, Metadata};

/// Appended to the last kept line when a block overflows.
pub const ELLIPSIS: &str = "…";

/// Font metrics and glyph rasterization for one font at one size.
pub trait Typeface: Send + Sync {
    /// Advance width of `text` in pixels.
    fn text_width(&self, text: &str) -> f32;

    /// Height of one line of text in pixels.
    fn line_height(&self) -> f32;

    /// Draw `text` with its top-left corner at `(x, y)`. Pixels outside the
    /// canvas are skipped.
    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>);
}

/// Shared, read-only font set indexed by the config's font indices.
pub type FaceSet = Vec<Arc<dyn Typeface>>;

/// A horizontal run of text, `x` relative to the start of its line.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    pub text: String,
    pub x: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub runs: Vec<GlyphRun>,
    pub width: f32,
}

impl TextLine {
    /// Run texts concatenated without the spacing between them.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// The wrapped lines of one template line, all in one font.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub font: usize,
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub origin: Point,
    pub font: usize,
    pub line: TextLine,
}

/// Positioned lines ready to paint, plus the size they cover from the anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    lines: Vec<PlacedLine>,
    extent: Size,
}

impl TextLayout {
    pub fn lines(&self) -> &[PlacedLine] {
        &self.lines
    }

    pub fn extent(&self) -> Size {
        self.extent
    }
}

/// A template line with its fields resolved, one string per fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub font: usize,
    pub fragments: Vec<String>,
}

/// Wrapping parameters shared by every placement strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapStyle {
    pub fragment_spacing: f32,
    pub max_lines: usize,
}

impl WrapStyle {
    pub fn wrap(&self, face: &dyn Typeface, fragments: &[String], max_width: f32) -> Vec<TextLine> {
        wrap_fragments(face, fragments, max_width, self.fragment_spacing, self.max_lines)
    }
}

/// Wraps resolved template lines and positions the result.
pub trait LinePlacer: Send + Sync {
    fn place(
        &self,
        anchor: Point,
        box_width: f32,
        lines: Vec<ResolvedLine>,
        faces: &[Arc<dyn Typeface>],
        style: &WrapStyle,
    ) -> Vec<PlacedLine>;
}

fn line_advance(face: &dyn Typeface, vertical_spacing: u32) -> i32 {
    face.line_height().ceil() as i32 + vertical_spacing as i32
}

/// Every line wrapped across the full box width.
fn wrap_blocks(lines: Vec<ResolvedLine>, box_width: f32, faces: &[Arc<dyn Typeface>], style: &WrapStyle) -> Vec<Block> {
    lines
        .into_iter()
        .map(|line| Block {
            font: line.font,
            lines: style.wrap(faces[line.font].as_ref(), &line.fragments, box_width),
        })
        .collect()
}

/// Blocks stacked top to bottom from the anchor.
#[derive(Debug, Clone)]
pub struct FlowPlacer {
    pub vertical_spacing: u32,
    pub title_spacing: u32,
}

impl LinePlacer for FlowPlacer {
    fn place(
        &self,
        anchor: Point,
        box_width: f32,
        lines: Vec<ResolvedLine>,
        faces: &[Arc<dyn Typeface>],
        style: &WrapStyle,
    ) -> Vec<PlacedLine> {
        let mut placed = Vec::new();
        let mut y = anchor.y;
        for (i, block) in wrap_blocks(lines, box_width, faces, style).into_iter().enumerate() {
            let advance = line_advance(faces[block.font].as_ref(), self.vertical_spacing);
            for line in block.lines {
                placed.push(PlacedLine {
                    origin: Point::new(anchor.x, y),
                    font: block.font,
                    line,
                });
                y += advance;
            }
            if i == 0 {
                y += self.title_spacing as i32;
            }
        }
        placed
    }
}

/// Legacy placement: block `i` starts at `anchor + positions[i]`. Blocks
/// without a position are dropped.
#[derive(Debug, Clone)]
pub struct AbsolutePlacer {
    pub positions: Vec<[i32; 2]>,
    pub vertical_spacing: u32,
}

impl LinePlacer for AbsolutePlacer {
    fn place(
        &self,
        anchor: Point,
        box_width: f32,
        lines: Vec<ResolvedLine>,
        faces: &[Arc<dyn Typeface>],
        style: &WrapStyle,
    ) -> Vec<PlacedLine> {
        if lines.len() > self.positions.len() {
            debug!(
                "absolute placement: dropping {} block(s) without a position",
                lines.len() - self.positions.len()
            );
        }
        let mut placed = Vec::new();
        let blocks = wrap_blocks(lines, box_width, faces, style);
        for (block, [dx, dy]) in blocks.into_iter().zip(self.positions.iter().copied()) {
            let advance = line_advance(faces[block.font].as_ref(), self.vertical_spacing);
            let mut origin = anchor.offset(dx, dy);
            for line in block.lines {
                placed.push(PlacedLine {
                    origin,
                    font: block.font,
                    line,
                });
                origin = origin.offset(0, advance);
            }
        }
        placed
    }
}

/// Title on top, then label/value column pairs side by side. Template lines
/// 1, 3, 5… are label columns and 2, 4, 6… the value columns next to them;
/// each fragment is one row.
#[derive(Debug, Clone)]
pub struct ColumnPlacer {
    pub vertical_spacing: u32,
    pub title_spacing: u32,
    /// Gap between a label and its value.
    pub label_spacing: u32,
    /// Gap between neighbouring column pairs.
    pub column_spacing: u32,
}

struct ColumnPair {
    label_font: usize,
    labels: Vec<String>,
    value: Option<ResolvedLine>,
    label_width: f32,
    natural_value_width: f32,
}

impl ColumnPair {
    fn new(label: ResolvedLine, value: Option<ResolvedLine>, faces: &[Arc<dyn Typeface>]) -> Self {
        let widest = |line: &ResolvedLine| {
            let face = faces[line.font].as_ref();
            line.fragments
                .iter()
                .map(|f| face.text_width(f))
                .fold(0.0_f32, f32::max)
        };
        Self {
            label_width: widest(&label),
            natural_value_width: value.as_ref().map(widest).unwrap_or(0.0),
            label_font: label.font,
            labels: label.fragments,
            value,
        }
    }

    fn rows(&self) -> usize {
        let values = self.value.as_ref().map(|v| v.fragments.len()).unwrap_or(0);
        self.labels.len().max(values)
    }
}

/// Split `available` across value columns. Columns no wider than an equal
/// share keep their natural width and leave the rest to the others; when
/// everything fits, the surplus is shared equally.
pub fn allocate_column_widths(natural: &[f32], available: f32) -> Vec<f32> {
    if natural.is_empty() {
        return Vec::new();
    }
    let total: f32 = natural.iter().sum();
    if total <= available {
        let extra = (available - total) / natural.len() as f32;
        return natural.iter().map(|w| w + extra).collect();
    }

    let mut widths: Vec<Option<f32>> = vec![None; natural.len()];
    let mut remaining = available;
    loop {
        let open: Vec<usize> = (0..natural.len()).filter(|&i| widths[i].is_none()).collect();
        if open.is_empty() {
            break;
        }
        let share = remaining / open.len() as f32;
        let fitting: Vec<usize> = open.iter().copied().filter(|&i| natural[i] <= share).collect();
        if fitting.is_empty() {
            for i in open {
                widths[i] = Some(share);
            }
            break;
        }
        for i in fitting {
            widths[i] = Some(natural[i]);
            remaining -= natural[i];
        }
    }
    widths.into_iter().map(|w| w.unwrap_or(0.0)).collect()
}

impl ColumnPlacer {
    fn place_pair(
        &self,
        origin: Point,
        pair: &ColumnPair,
        value_width: f32,
        faces: &[Arc<dyn Typeface>],
        style: &WrapStyle,
    ) -> Vec<PlacedLine> {
        let label_face = faces[pair.label_font].as_ref();
        let value_x = origin.x + (pair.label_width + self.label_spacing as f32).round() as i32;
        let mut placed = Vec::new();
        let mut y = origin.y;
        for row in 0..pair.rows() {
            let mut row_advance = line_advance(label_face, self.vertical_spacing);
            if let Some(label) = pair.labels.get(row).filter(|l| !l.trim().is_empty()) {
                placed.push(PlacedLine {
                    origin: Point::new(origin.x, y),
                    font: pair.label_font,
                    line: TextLine {
                        runs: vec![GlyphRun {
                            text: label.clone(),
                            x: 0.0,
                        }],
                        width: label_face.text_width(label),
                    },
                });
            }
            if let Some(value) = &pair.value {
                if let Some(text) = value.fragments.get(row) {
                    let face = faces[value.font].as_ref();
                    let advance = line_advance(face, self.vertical_spacing);
                    let wrapped = style.wrap(face, std::slice::from_ref(text), value_width);
                    row_advance = row_advance.max(advance * wrapped.len().max(1) as i32);
                    for (k, line) in wrapped.into_iter().enumerate() {
                        placed.push(PlacedLine {
                            origin: Point::new(value_x, y + advance * k as i32),
                            font: value.font,
                            line,
                        });
                    }
                }
            }
            y += row_advance;
        }
        placed
    }
}

impl LinePlacer for ColumnPlacer {
    fn place(
        &self,
        anchor: Point,
        box_width: f32,
        lines: Vec<ResolvedLine>,
        faces: &[Arc<dyn Typeface>],
        style: &WrapStyle,
    ) -> Vec<PlacedLine> {
        let mut lines = lines.into_iter();
        let Some(title) = lines.next() else {
            return Vec::new();
        };

        let mut placed = Vec::new();
        let title_face = faces[title.font].as_ref();
        let advance = line_advance(title_face, self.vertical_spacing);
        let mut y = anchor.y;
        for line in style.wrap(title_face, &title.fragments, box_width) {
            placed.push(PlacedLine {
                origin: Point::new(anchor.x, y),
                font: title.font,
                line,
            });
            y += advance;
        }
        y += self.title_spacing as i32;

        let mut pairs = Vec::new();
        while let Some(label) = lines.next() {
            pairs.push(ColumnPair::new(label, lines.next(), faces));
        }
        if pairs.is_empty() {
            return placed;
        }

        let fixed: f32 = pairs.iter().map(|p| p.label_width + self.label_spacing as f32).sum::<f32>()
            + self.column_spacing as f32 * (pairs.len() - 1) as f32;
        let natural: Vec<f32> = pairs.iter().map(|p| p.natural_value_width).collect();
        let widths = allocate_column_widths(&natural, (box_width - fixed).max(0.0));
        debug!("column placement: {} pair(s), value widths {:?}", pairs.len(), widths);

        let mut x = anchor.x as f32;
        for (pair, value_width) in pairs.iter().zip(widths) {
            placed.extend(self.place_pair(Point::new(x.round() as i32, y), pair, value_width, faces, style));
            x += pair.label_width + self.label_spacing as f32 + value_width + self.column_spacing as f32;
        }
        placed
    }
}

fn measure(face: &dyn Typeface, runs: &[GlyphRun]) -> f32 {
    runs.last().map(|r| r.x + face.text_width(&r.text)).unwrap_or(0.0)
}

struct LineBuilder<'f> {
    face: &'f dyn Typeface,
    max_width: f32,
    fragment_spacing: f32,
    lines: Vec<TextLine>,
    runs: Vec<GlyphRun>,
    run_fragment: Option<usize>,
}

impl<'f> LineBuilder<'f> {
    fn push_word(&mut self, fragment: usize, word: &str) {
        if !self.runs.is_empty() {
            if self.run_fragment == Some(fragment) {
                if let Some(last) = self.runs.last_mut() {
                    let joined = format!("{} {}", last.text, word);
                    if last.x + self.face.text_width(&joined) <= self.max_width {
                        last.text = joined;
                        return;
                    }
                }
            } else {
                let x = measure(self.face, &self.runs) + self.fragment_spacing;
                if x + self.face.text_width(word) <= self.max_width {
                    self.runs.push(GlyphRun {
                        text: word.to_string(),
                        x,
                    });
                    self.run_fragment = Some(fragment);
                    return;
                }
            }
            self.finish_line();
        }
        self.start_line(fragment, word);
    }

    /// Place `word` on an empty line, breaking it by character when it is
    /// wider than the box.
    fn start_line(&mut self, fragment: usize, word: &str) {
        let mut rest = word;
        while self.face.text_width(rest) > self.max_width {
            let split = self.longest_prefix(rest);
            if split >= rest.len() {
                break;
            }
            self.runs.push(GlyphRun {
                text: rest[..split].to_string(),
                x: 0.0,
            });
            self.finish_line();
            rest = &rest[split..];
        }
        self.runs.push(GlyphRun {
            text: rest.to_string(),
            x: 0.0,
        });
        self.run_fragment = Some(fragment);
    }

    /// Byte length of the longest prefix that fits; always at least one char.
    fn longest_prefix(&self, text: &str) -> usize {
        let mut end = 0;
        for (i, c) in text.char_indices() {
            let next = i + c.len_utf8();
            if end > 0 && self.face.text_width(&text[..next]) > self.max_width {
                break;
            }
            end = next;
        }
        end
    }

    fn finish_line(&mut self) {
        if self.runs.is_empty() {
            return;
        }
        let runs = std::mem::take(&mut self.runs);
        let width = measure(self.face, &runs);
        self.lines.push(TextLine { runs, width });
        self.run_fragment = None;
    }
}

/// Greedy word wrap of resolved fragments into at most `max_lines` lines.
pub fn wrap_fragments(
    face: &dyn Typeface,
    fragments: &[String],
    max_width: f32,
    fragment_spacing: f32,
    max_lines: usize,
) -> Vec<TextLine> {
    let mut builder = LineBuilder {
        face,
        max_width,
        fragment_spacing,
        lines: Vec::new(),
        runs: Vec::new(),
        run_fragment: None,
    };
    for (i, fragment) in fragments.iter().enumerate() {
        for word in fragment.split_whitespace() {
            builder.push_word(i, word);
        }
    }
    builder.finish_line();

    let mut lines = builder.lines;
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.pop() {
            lines.push(ellipsize(face, last, max_width));
        }
    }
    lines
}

/// Shorten `line` until it fits with [`ELLIPSIS`] appended.
fn ellipsize(face: &dyn Typeface, mut line: TextLine, max_width: f32) -> TextLine {
    loop {
        let Some(last) = line.runs.last() else {
            break;
        };
        let candidate = format!("{}{}", last.text.trim_end(), ELLIPSIS);
        let fits = last.x + face.text_width(&candidate) <= max_width;
        let exhausted = line.runs.len() == 1 && last.text.is_empty();
        if fits || exhausted {
            if let Some(last) = line.runs.last_mut() {
                last.text = candidate;
            }
            break;
        }
        if let Some(last) = line.runs.last_mut() {
            last.text.pop();
            if last.text.is_empty() && line.runs.len() > 1 {
                line.runs.pop();
            }
        }
    }
    line.width = measure(face, &line.runs);
    line
}

/// Lays out and paints the header template with one shared style.
pub struct TextEngine {
    faces: FaceSet,
    registry: FieldRegistry,
    placer: Box<dyn LinePlacer>,
    wrap: WrapStyle,
    text_color: Rgb<u8>,
    shade_color: Rgb<u8>,
    shade_offset: (i32, i32),
}

impl TextEngine {
    pub fn new(faces: FaceSet, layout: &LayoutConfig, max_lines: usize) -> Self {
        let placer: Box<dyn LinePlacer> = match layout.text_positioning {
            TextPositioning::Flow => Box::new(FlowPlacer {
                vertical_spacing: layout.vertical_spacing,
                title_spacing: layout.title_spacing,
            }),
            TextPositioning::Absolute => Box::new(AbsolutePlacer {
                positions: layout.pos_list.clone(),
                vertical_spacing: layout.vertical_spacing,
            }),
            TextPositioning::Columns => Box::new(ColumnPlacer {
                vertical_spacing: layout.vertical_spacing,
                title_spacing: layout.title_spacing,
                label_spacing: layout.horizontal_spacing,
                column_spacing: layout.column_spacing,
            }),
        };
        Self {
            faces,
            registry: FieldRegistry::default(),
            placer,
            wrap: WrapStyle {
                fragment_spacing: layout.horizontal_spacing as f32,
                max_lines: max_lines.max(1),
            },
            text_color: Rgb(layout.text_color),
            shade_color: Rgb(layout.shade_color),
            shade_offset: (layout.shade_offset[0], layout.shade_offset[1]),
        }
    }

    /// Replace the field formatter registry.
    pub fn with_registry(mut self, registry: FieldRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn faces(&self) -> &[Arc<dyn Typeface>] {
        &self.faces
    }

    fn face(&self, index: usize) -> ScanResult<&dyn Typeface> {
        self.faces.get(index).map(|f| f.as_ref()).ok_or_else(|| {
            ScanError::InvalidConfig(format!(
                "font index {} out of bounds ({} fonts loaded)",
                index,
                self.faces.len()
            ))
        })
    }

    pub fn layout(
        &self,
        anchor: Point,
        box_size: Size,
        template: &[Vec<Fragment>],
        font_list: &[usize],
        metadata: &Metadata,
    ) -> ScanResult<TextLayout> {
        if template.len() != font_list.len() {
            return Err(ScanError::InvalidConfig(format!(
                "the length of font_list ({}) does not match the number of text_list rows ({})",
                font_list.len(),
                template.len()
            )));
        }

        let mut resolved = Vec::with_capacity(template.len());
        for (fragments, &font) in template.iter().zip(font_list) {
            self.face(font)?;
            resolved.push(ResolvedLine {
                font,
                fragments: self.registry.resolve_line(fragments, metadata),
            });
        }

        let bottom_limit = anchor.y as i64 + box_size.height as i64;
        let mut extent = Size::new(0, 0);
        let mut lines = Vec::new();
        for placed in self
            .placer
            .place(anchor, box_size.width as f32, resolved, &self.faces, &self.wrap)
        {
            let height = self.faces[placed.font].line_height().ceil() as i64;
            let bottom = placed.origin.y as i64 + height;
            if bottom > bottom_limit {
                continue;
            }
            let right = (placed.origin.x - anchor.x) as f32 + placed.line.width;
            extent.width = extent.width.max(right.ceil().max(0.0) as u32);
            extent.height = extent.height.max((bottom - anchor.y as i64).max(0) as u32);
            lines.push(placed);
        }
        debug!("laid out {} text lines, extent {:?}", lines.len(), extent);

        Ok(TextLayout { lines, extent })
    }

    pub fn paint(&self, canvas: &mut RgbImage, layout: &TextLayout) {
        let (dx, dy) = self.shade_offset;
        for placed in layout.lines() {
            let face = self.faces[placed.font].as_ref();
            for run in &placed.line.runs {
                let x = placed.origin.x + run.x.round() as i32;
                let y = placed.origin.y;
                if (dx, dy) != (0, 0) {
                    face.draw_text(canvas, x + dx, y + dy, &run.text, self.shade_color);
                }
                face.draw_text(canvas, x, y, &run.text, self.text_color);
            }
        }
    }

    pub fn render(
        &self,
        canvas: &mut RgbImage,
        anchor: Point,
        box_size: Size,
        template: &[Vec<Fragment>],
        font_list: &[usize],
        metadata: &Metadata,
    ) -> ScanResult<TextLayout> {
        let layout = self.layout(anchor, box_size, template, font_list, metadata)?;
        self.paint(canvas, &layout);
        Ok(layout)
    }
}
