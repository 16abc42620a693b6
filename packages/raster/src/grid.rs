//! Row-major 2D cell grid shared by raster bands and flood masks.

use crate::RasterError;

/// A `width` × `height` grid of cells stored row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Creates a grid with every cell set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width * height],
        }
    }

    /// Wraps a row-major cell buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError::ShapeMismatch`] if `cells.len()` is not
    /// `width * height`.
    pub fn from_vec(width: usize, height: usize, cells: Vec<T>) -> Result<Self, RasterError> {
        if cells.len() != width * height {
            return Err(RasterError::ShapeMismatch {
                expected: (width * height, 1),
                actual: (cells.len(), 1),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Cell at `(col, row)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, col: usize, row: usize) -> Option<T> {
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(self.cells[row * self.width + col])
    }

    /// Sets the cell at `(col, row)`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, col: usize, row: usize, value: T) {
        if col < self.width && row < self.height {
            self.cells[row * self.width + col] = value;
        }
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Consumes the grid, returning its row-major cells.
    #[must_use]
    pub fn into_cells(self) -> Vec<T> {
        self.cells
    }

    /// Copies the `width` × `height` window whose top-left cell is
    /// `(col, row)`. The window must lie inside the grid.
    #[must_use]
    pub fn window(&self, col: usize, row: usize, width: usize, height: usize) -> Self {
        debug_assert!(col + width <= self.width && row + height <= self.height);

        let mut cells = Vec::with_capacity(width * height);
        for r in row..row + height {
            let start = r * self.width + col;
            cells.extend_from_slice(&self.cells[start..start + width]);
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Number of cells equal to `value`.
    #[must_use]
    pub fn count(&self, value: T) -> usize
    where
        T: PartialEq,
    {
        self.cells.iter().filter(|&&c| c == value).count()
    }
}
