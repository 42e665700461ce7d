//! Dot grid storage and reconstruction.
//!
//! A [`Grid`] is a fixed `rows × cols` array of [`GridDot`]s with a designated
//! center cell. Cells are stored column-major so that every column (and every
//! half-column above or below the center row) is one contiguous slice; the
//! tracker hands those slices to its workers as exclusive views.
//!
//! Grid validity is path-dependent: the center cell is populated first and
//! every other cell is derived from already populated neighbors, so an
//! invalid cell is never revisited within one tracking run.

mod boundary;
mod search;
mod tracker;

pub use boundary::{BoundaryConfig, BoundaryRefiner};
pub use search::{
    center_of_mass, locate_seed, refine_dot, step_is_plausible, MassCentroid, SearchConfig,
    SeedConfig, StepBand,
};
pub use tracker::{track_grid, Anchor, TrackerConfig};

use serde::{Deserialize, Serialize};

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GridDot {
    /// Dot located at sub-pixel position `(x, y)`.
    Valid { x: f32, y: f32 },
    /// No plausible dot for this cell.
    #[default]
    Invalid,
}

impl GridDot {
    pub fn at(p: [f32; 2]) -> Self {
        Self::Valid { x: p[0], y: p[1] }
    }

    pub fn position(&self) -> Option<[f32; 2]> {
        match *self {
            Self::Valid { x, y } => Some([x, y]),
            Self::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Errors for grids that violate the shape contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Both dimensions must be odd so a unique center cell exists.
    EvenDimensions { rows: usize, cols: usize },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EvenDimensions { rows, cols } => {
                write!(f, "grid dimensions must be odd, got {rows}x{cols}")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// Fixed-size dot grid with a designated center cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    /// Column-major cells.
    cells: Vec<GridDot>,
    center_position: [f32; 2],
    center_grid_position: (usize, usize),
}

impl Grid {
    /// Create an all-invalid grid seeded at `center_position`.
    pub fn new(rows: usize, cols: usize, center_position: [f32; 2]) -> Result<Self, GridError> {
        if rows % 2 == 0 || cols % 2 == 0 {
            return Err(GridError::EvenDimensions { rows, cols });
        }
        Ok(Self {
            rows,
            cols,
            cells: vec![GridDot::Invalid; rows * cols],
            center_position,
            center_grid_position: (rows / 2, cols / 2),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Fixed `(row, col)` of the seed cell.
    pub fn center_cell(&self) -> (usize, usize) {
        (self.rows / 2, self.cols / 2)
    }

    /// Sub-pixel seed position.
    pub fn center_position(&self) -> [f32; 2] {
        self.center_position
    }

    /// Cell that polar sampling is currently anchored at.
    pub fn center_grid_position(&self) -> (usize, usize) {
        self.center_grid_position
    }

    /// Re-anchor polar sampling. Returns `false` (and keeps the old anchor)
    /// when the cell is outside the grid.
    ///
    /// Only [`crate::polar_samples`] reads the anchor. The measurement
    /// pipeline passes its fit cell explicitly and leaves the anchor alone.
    pub fn set_center_grid_position(&mut self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        self.center_grid_position = (row, col);
        true
    }

    pub fn reset_center_grid_position(&mut self) {
        self.center_grid_position = self.center_cell();
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        col * self.rows + row
    }

    /// Cell at `(row, col)`; out-of-range reads as invalid.
    pub fn get(&self, row: usize, col: usize) -> GridDot {
        if row >= self.rows || col >= self.cols {
            return GridDot::Invalid;
        }
        self.cells[self.index(row, col)]
    }

    /// Cell at a signed `[row, col]` offset from `anchor`, `None` if outside.
    pub fn get_offset(&self, anchor: (usize, usize), offset: [i32; 2]) -> Option<GridDot> {
        let r = anchor.0 as i64 + offset[0] as i64;
        let c = anchor.1 as i64 + offset[1] as i64;
        if r < 0 || c < 0 || r >= self.rows as i64 || c >= self.cols as i64 {
            return None;
        }
        Some(self.get(r as usize, c as usize))
    }

    pub fn set(&mut self, row: usize, col: usize, dot: GridDot) {
        if row < self.rows && col < self.cols {
            let i = self.index(row, col);
            self.cells[i] = dot;
        }
    }

    /// Invalidate every cell and restore the polar anchor.
    pub fn clear(&mut self) {
        self.cells.fill(GridDot::Invalid);
        self.reset_center_grid_position();
    }

    pub fn invalidate(&mut self, row: usize, col: usize) {
        self.set(row, col, GridDot::Invalid);
    }

    /// Contiguous cells of one column, top to bottom.
    pub fn column(&self, col: usize) -> &[GridDot] {
        &self.cells[col * self.rows..(col + 1) * self.rows]
    }

    pub(crate) fn columns_mut(&mut self) -> std::slice::ChunksMut<'_, GridDot> {
        self.cells.chunks_mut(self.rows)
    }

    /// `(row, col, dot)` for every cell, column by column.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, GridDot)> + '_ {
        let rows = self.rows;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, d)| (i % rows, i / rows, *d))
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|d| d.is_valid()).count()
    }

    /// Same dimensions, so cells can be compared index by index.
    pub fn same_shape(&self, other: &Grid) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    /// Valid cell whose position is closest to `point`.
    pub fn nearest_valid_cell(&self, point: [f32; 2]) -> Option<(usize, usize)> {
        self.iter()
            .filter_map(|(r, c, d)| {
                let p = d.position()?;
                let dx = p[0] - point[0];
                let dy = p[1] - point[1];
                Some(((r, c), dx * dx + dy * dy))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(cell, _)| cell)
    }
}
