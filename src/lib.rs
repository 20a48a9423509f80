//! `vlp` is the host-side harness for a visible-light positioning (VLP)
//! system. A ceiling of 36 LEDs lights a floor; a photodiode on the floor
//! reads one intensity per LED, and a small quantized network running on a
//! Raspberry Pi Pico turns that vector of intensities into an `(x, y)`
//! position.
//!
//! LEDs get dimmer as they age, so a model trained on fresh LEDs slowly
//! drifts. This crate drives the Pico over a serial link with sensor vectors
//! that have been artificially aged, and measures how far the predictions
//! drift as thousands of simulated hours pass.
//!
//! It also handles the last step of deploying a model: dumping the
//! `.tflite` binary into a C array the firmware can link against.
//!
//! You can find an overview of the [wire protocol and workflow](guide) in
//! this documentation site.

#![warn(missing_docs)]
pub mod aging;
pub mod args;
pub mod c_array;
pub mod experiment;
pub mod grid;
pub mod gui;
pub mod guide;
pub mod lambertian;
pub mod link;
pub mod npy;
pub mod packet;
pub mod replay;
pub mod sample_file;
pub mod simulated_device;

use std::fmt::{self, Display};

/// A position on the floor plane, in millimetres unless stated otherwise.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Position {
    /// Distance along the grid's width
    pub x: f32,
    /// Distance along the grid's height
    pub y: f32,
}

impl Position {
    /// Builds a [Position] from its two coordinates.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between two positions.
    pub fn distance(&self, other: &Self) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Multiplies both coordinates by `factor`, e.g. to go from grid cells
    /// to millimetres.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// One sensor reading together with where it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// One intensity per LED
    pub leds: Vec<f32>,
    /// Where the reading was taken
    pub location: Position,
}

/// Mean Euclidean distance between paired predictions and ground truth.
/// Returns `NaN` for empty input, the same as averaging nothing would.
pub fn mean_error(predicted: &[Position], truth: &[Position]) -> f32 {
    debug_assert_eq!(predicted.len(), truth.len());
    let total: f32 = predicted
        .iter()
        .zip(truth)
        .map(|(p, t)| p.distance(t))
        .sum();
    total / predicted.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn mean_error_averages_pairs() {
        let predicted = [Position::new(0.0, 0.0), Position::new(10.0, 0.0)];
        let truth = [Position::new(0.0, 1.0), Position::new(10.0, 3.0)];
        assert!((mean_error(&predicted, &truth) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn scaling_to_millimetres() {
        let p = Position::new(1.5, 2.0).scaled(10.0);
        assert_eq!(p, Position::new(15.0, 20.0));
    }
}
