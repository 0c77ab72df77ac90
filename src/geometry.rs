use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};

/// Rows × columns of the snapshot grid. Serialized as `[rows, cols]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct GridShape {
    rows: u32,
    cols: u32,
}

impl GridShape {
    pub fn new(rows: u32, cols: u32) -> ScanResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "grid_shape must be at least [1, 1], got [{}, {}]",
                rows, cols
            )));
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Number of snapshots the grid holds.
    pub fn count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Row-major cell of the `index`-th frame as `(row, col)`.
    pub fn cell_of(&self, index: usize) -> (u32, u32) {
        let cols = self.cols as usize;
        ((index / cols) as u32, (index % cols) as u32)
    }
}

impl TryFrom<[u32; 2]> for GridShape {
    type Error = ScanError;

    fn try_from(value: [u32; 2]) -> ScanResult<Self> {
        Self::new(value[0], value[1])
    }
}

impl From<GridShape> for [u32; 2] {
    fn from(grid: GridShape) -> Self {
        [grid.rows, grid.cols]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Margins around the header block, serialized as `[top, right, bottom, left]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Margins {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Margins {
    pub fn horizontal(&self) -> u32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> u32 {
        self.top + self.bottom
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 22,
            right: 22,
            bottom: 40,
            left: 22,
        }
    }
}

impl From<[u32; 4]> for Margins {
    fn from(v: [u32; 4]) -> Self {
        Self {
            top: v[0],
            right: v[1],
            bottom: v[2],
            left: v[3],
        }
    }
}

impl From<Margins> for [u32; 4] {
    fn from(m: Margins) -> Self {
        [m.top, m.right, m.bottom, m.left]
    }
}
