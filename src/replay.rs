//! Scores the device on a fixed set of recorded samples, with no aging.

use crate::link::{LinkError, PicoLink};
use crate::packet::EvalFlag;
use crate::{mean_error, Position, Sample};

use log::info;
use std::{
    fmt,
    io::{Read, Write},
    time::{Duration, Instant},
};

/// The outcome of a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// How many samples were sent
    pub samples: usize,
    /// Mean Euclidean error, in the units of the recorded locations
    pub average_error: f32,
    /// Wall clock time of the whole exchange
    pub elapsed: Duration,
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Average error: {:.3} over {} samples ({:.2?})",
            self.average_error, self.samples, self.elapsed
        )
    }
}

/// Sends every sample for evaluation and compares the answers with the
/// recorded locations.
pub fn replay<P>(link: &mut PicoLink<P>, samples: &[Sample]) -> Result<ReplayReport, LinkError>
where
    P: Read + Write,
{
    let start = Instant::now();
    info!("Replaying {} samples", samples.len());

    let predictions = link.predict(samples.iter().map(|s| &s.leds), EvalFlag::Evaluate)?;
    let truth: Vec<Position> = samples.iter().map(|s| s.location).collect();

    Ok(ReplayReport {
        samples: samples.len(),
        average_error: mean_error(&predictions, &truth),
        elapsed: start.elapsed(),
    })
}
