//! The spatial fingerprint map: one LED intensity vector per floor cell.

use crate::npy::{NpyArray, NpyError};
use crate::Position;

use std::path::Path;

/// Grid cells are one centimetre wide; positions go over the wire in mm.
pub const MM_PER_CELL: f32 = 10.0;

/// Marker the dataset uses for cells that were never measured.
pub const INVALID_MARKER: f32 = -1.0;

/// A row-major `(height, width, leds)` grid of LED intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    height: usize,
    width: usize,
    leds: usize,
    data: Vec<f32>,
}

impl IntensityGrid {
    /// Wraps a flat buffer. Returns `None` if the buffer length does not
    /// match the given shape.
    pub fn new(height: usize, width: usize, leds: usize, data: Vec<f32>) -> Option<Self> {
        let len = height.checked_mul(width).and_then(|cells| cells.checked_mul(leds));
        if len != Some(data.len()) || leds == 0 {
            return None;
        }
        Some(Self {
            height,
            width,
            leds,
            data,
        })
    }

    /// Loads a grid from a 3 dimensional `.npy` file.
    pub fn from_npy(path: impl AsRef<Path>) -> Result<Self, NpyError> {
        let array = NpyArray::from_path(path)?;
        Self::try_from(array)
    }

    /// Number of rows (the y axis).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns (the x axis).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of LEDs per cell.
    pub fn leds(&self) -> usize {
        self.leds
    }

    /// Total number of cells, valid or not.
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// The LED vector at a flat cell index `y * width + x`.
    pub fn cell(&self, flat: usize) -> &[f32] {
        &self.data[flat * self.leds..(flat + 1) * self.leds]
    }

    /// Grid coordinates of a flat cell index, in cells.
    pub fn location(&self, flat: usize) -> Position {
        Position::new((flat % self.width) as f32, (flat / self.width) as f32)
    }

    /// A cell is valid unless LED 0 carries the invalid marker. The mask is
    /// shared by every LED.
    pub fn is_valid(&self, flat: usize) -> bool {
        self.data[flat * self.leds] != INVALID_MARKER
    }

    /// Flat indices of every valid cell, in ascending order.
    pub fn valid_indices(&self) -> Vec<usize> {
        (0..self.area()).filter(|&i| self.is_valid(i)).collect()
    }
}

impl TryFrom<NpyArray> for IntensityGrid {
    type Error = NpyError;

    fn try_from(array: NpyArray) -> Result<Self, Self::Error> {
        let (h, w, l) = match *array.shape() {
            [h, w, l] => (h, w, l),
            ref other => return Err(NpyError::BadShape(other.to_vec())),
        };
        Self::new(h, w, l, array.into_data()).ok_or(NpyError::BadShape(vec![h, w, l]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_three() -> IntensityGrid {
        // 2 rows, 3 columns, 2 LEDs; the middle of the top row is unmeasured
        let data = vec![
            1.0, 2.0, -1.0, -1.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, 9.0, 10.0,
        ];
        IntensityGrid::new(2, 3, 2, data).unwrap()
    }

    #[test]
    fn rejects_mismatched_shape() {
        assert!(IntensityGrid::new(2, 2, 2, vec![0.0; 7]).is_none());
    }

    #[test]
    fn rejects_overflowing_shape() {
        assert!(IntensityGrid::new(usize::MAX, 2, 36, vec![]).is_none());
        assert!(IntensityGrid::new(1 << 62, 4, 36, vec![0.0; 16]).is_none());
    }

    #[test]
    fn valid_mask_follows_first_led() {
        let grid = two_by_three();
        assert_eq!(grid.valid_indices(), vec![0, 2, 3, 4, 5]);
        assert!(!grid.is_valid(1));
    }

    #[test]
    fn flat_index_to_cell_and_location() {
        let grid = two_by_three();
        assert_eq!(grid.cell(4), &[7.0, 8.0]);
        assert_eq!(grid.location(4), Position::new(1.0, 1.0));
        assert_eq!(grid.location(2), Position::new(2.0, 0.0));
    }
}
