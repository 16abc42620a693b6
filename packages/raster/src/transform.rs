//! Affine pixel-to-world transform.
//!
//! Uses the same coefficient order as GDAL-style affine matrices:
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! `(col, row)` is a pixel *corner*; the center of pixel `(i, j)` is
//! `(i + 0.5, j + 0.5)`.

use geo::Coord;

/// Maps pixel `(col, row)` coordinates to CRS coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    /// x scale along columns.
    pub a: f64,
    /// x shear along rows.
    pub b: f64,
    /// x of the top-left corner.
    pub c: f64,
    /// y shear along columns.
    pub d: f64,
    /// y scale along rows (negative for north-up rasters).
    pub e: f64,
    /// y of the top-left corner.
    pub f: f64,
}

impl AffineTransform {
    /// Pixel coordinates are world coordinates.
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// Creates a transform from its six coefficients.
    #[must_use]
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// A north-up transform with its top-left corner at `(west, north)`
    /// and square-or-rectangular cells of `x_res` × `y_res`.
    #[must_use]
    pub const fn from_origin(west: f64, north: f64, x_res: f64, y_res: f64) -> Self {
        Self::new(x_res, 0.0, west, 0.0, -y_res, north)
    }

    /// Maps a pixel coordinate to a world coordinate.
    #[must_use]
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.a.mul_add(col, self.b.mul_add(row, self.c)),
            y: self.d.mul_add(col, self.e.mul_add(row, self.f)),
        }
    }

    /// Maps a coordinate treating `x` as column and `y` as row.
    #[must_use]
    pub fn apply_coord(&self, coord: Coord<f64>) -> Coord<f64> {
        self.apply(coord.x, coord.y)
    }

    /// The world-to-pixel transform, or `None` if this one is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        Some(Self {
            a: self.e / det,
            b: -self.b / det,
            c: self.b.mul_add(self.f, -self.e * self.c) / det,
            d: -self.d / det,
            e: self.a / det,
            f: self.d.mul_add(self.c, -self.a * self.f) / det,
        })
    }

    /// The transform of a window whose top-left pixel is `(col, row)`.
    #[must_use]
    pub fn offset(&self, col: f64, row: f64) -> Self {
        let origin = self.apply(col, row);
        Self {
            c: origin.x,
            f: origin.y,
            ..*self
        }
    }

    /// `a * e - b * d`.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.a.mul_add(self.e, -self.b * self.d)
    }

    /// Area of one cell in squared CRS units.
    #[must_use]
    pub fn cell_area(&self) -> f64 {
        self.determinant().abs()
    }

    /// `true` when there is no rotation or shear.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}
