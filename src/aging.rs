//! Synthetic LED aging.
//!
//! Every LED gets a random R90 lifetime, the number of hours after which it
//! only emits 90% of its original light. Brightness decays exponentially,
//!
//! ```text
//! relative_decay(t) = exp(-k * t),    k = ln(1 / 0.9) / r90
//! ```
//!
//! plus a little Gaussian measurement noise. The fingerprint grid is then
//! resampled at each simulated timestep and scaled by that timestep's decay.

use crate::grid::IntensityGrid;
use crate::Sample;

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fmt;

/// Shortest R90 lifetime handed out, in hours (inclusive).
pub const R90_MIN_HOURS: u32 = 10_000;

/// Longest R90 lifetime handed out, in hours (exclusive).
pub const R90_MAX_HOURS: u32 = 50_000;

/// Errors produced while setting up an aging run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgingError {
    /// The grid has no valid cell to sample from.
    NoValidCells,
    /// The timestep must be strictly positive.
    BadTimestep(f64),
    /// The total simulated time must be finite.
    BadDuration(f64),
    /// The noise standard deviation must be finite and non-negative.
    BadNoise(f64),
    /// The schedule was made for a different number of LEDs than the grid.
    LedCountMismatch {
        /// LEDs in the decay schedule
        schedule: usize,
        /// LEDs in the grid
        grid: usize,
    },
}

impl fmt::Display for AgingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AgingError::NoValidCells => write!(f, "the grid has no valid cells"),
            AgingError::BadTimestep(step) => write!(f, "timestep must be positive, got {step}"),
            AgingError::BadDuration(total) => write!(f, "total time must be finite, got {total}"),
            AgingError::BadNoise(std) => write!(f, "invalid noise standard deviation {std}"),
            AgingError::LedCountMismatch { schedule, grid } => write!(
                f,
                "decay schedule covers {schedule} LEDs but the grid has {grid}"
            ),
        }
    }
}

impl std::error::Error for AgingError {}

/// Decay constant `k` such that `exp(-k * r90_hours) = 0.9`.
pub fn decay_constant(r90_hours: f64) -> f64 {
    (1.0f64 / 0.9).ln() / r90_hours
}

/// `0, step, 2 * step, ...` up to but excluding `total`.
pub fn timesteps(total: f64, step: f64) -> Result<Vec<f64>, AgingError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(AgingError::BadTimestep(step));
    }
    if !total.is_finite() {
        return Err(AgingError::BadDuration(total));
    }
    let mut out = Vec::new();
    let mut i = 0usize;
    loop {
        let t = i as f64 * step;
        if t >= total {
            break;
        }
        out.push(t);
        i += 1;
    }
    Ok(out)
}

/// How bright every LED is, relative to new, at every timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct DecaySchedule {
    timesteps: Vec<f64>,
    r90_hours: Vec<u32>,
    decay_ks: Vec<f64>,
    relative_decay: Vec<Vec<f32>>,
}

impl DecaySchedule {
    /// Draws an R90 lifetime for each of `leds` LEDs and builds the noisy
    /// decay table `[timestep][led]`.
    pub fn generate<R: Rng + ?Sized>(
        timesteps: Vec<f64>,
        leds: usize,
        noise_std: f64,
        rng: &mut R,
    ) -> Result<Self, AgingError> {
        // Normal::new accepts a negative std and mirrors the samples
        if !(noise_std.is_finite() && noise_std >= 0.0) {
            return Err(AgingError::BadNoise(noise_std));
        }
        let noise = Normal::new(0.0, noise_std).map_err(|_| AgingError::BadNoise(noise_std))?;

        let r90_hours: Vec<u32> = (0..leds)
            .map(|_| rng.gen_range(R90_MIN_HOURS..R90_MAX_HOURS))
            .collect();
        let decay_ks: Vec<f64> = r90_hours.iter().map(|&h| decay_constant(h as f64)).collect();

        let relative_decay = timesteps
            .iter()
            .map(|&t| {
                decay_ks
                    .iter()
                    .map(|&k| ((-t * k).exp() + noise.sample(rng)) as f32)
                    .collect()
            })
            .collect();

        debug!(
            "Drew R90 lifetimes between {:?} and {:?} hours",
            r90_hours.iter().min(),
            r90_hours.iter().max()
        );

        Ok(Self {
            timesteps,
            r90_hours,
            decay_ks,
            relative_decay,
        })
    }

    /// The simulated times, in hours.
    pub fn timesteps(&self) -> &[f64] {
        &self.timesteps
    }

    /// The R90 lifetime drawn for every LED.
    pub fn r90_hours(&self) -> &[u32] {
        &self.r90_hours
    }

    /// The decay constant of every LED.
    pub fn decay_ks(&self) -> &[f64] {
        &self.decay_ks
    }

    /// Number of LEDs covered.
    pub fn leds(&self) -> usize {
        self.decay_ks.len()
    }

    /// The relative brightness of every LED at timestep index `i`.
    pub fn at(&self, i: usize) -> &[f32] {
        &self.relative_decay[i]
    }

    /// Average relative brightness across LEDs, per timestep.
    pub fn mean(&self) -> Vec<f32> {
        self.relative_decay
            .iter()
            .map(|row| row.iter().sum::<f32>() / row.len() as f32)
            .collect()
    }

    /// Dimmest LED, per timestep.
    pub fn min(&self) -> Vec<f32> {
        self.relative_decay
            .iter()
            .map(|row| row.iter().cloned().fold(f32::INFINITY, f32::min))
            .collect()
    }

    /// Brightest LED, per timestep.
    pub fn max(&self) -> Vec<f32> {
        self.relative_decay
            .iter()
            .map(|row| row.iter().cloned().fold(f32::NEG_INFINITY, f32::max))
            .collect()
    }
}

/// Element-wise product of an LED vector and a decay row.
pub fn apply_decay(leds: &[f32], decay: &[f32]) -> Vec<f32> {
    leds.iter().zip(decay).map(|(v, d)| v * d).collect()
}

fn draw_cells<R: Rng + ?Sized>(valid: &[usize], n: usize, rng: &mut R) -> Vec<usize> {
    (0..n).map(|_| valid[rng.gen_range(0..valid.len())]).collect()
}

/// For every timestep, draws `samples_per_timestep` valid cells (with
/// replacement) and ages their LED vectors by that timestep's decay.
///
/// Locations are in grid cells. The result is indexed `[timestep][sample]`.
pub fn generate_aged_samples<R: Rng + ?Sized>(
    grid: &IntensityGrid,
    schedule: &DecaySchedule,
    samples_per_timestep: usize,
    rng: &mut R,
) -> Result<Vec<Vec<Sample>>, AgingError> {
    if schedule.leds() != grid.leds() {
        return Err(AgingError::LedCountMismatch {
            schedule: schedule.leds(),
            grid: grid.leds(),
        });
    }
    let valid = grid.valid_indices();
    if valid.is_empty() {
        return Err(AgingError::NoValidCells);
    }

    let aged = (0..schedule.timesteps().len())
        .map(|i| {
            let decay = schedule.at(i);
            draw_cells(&valid, samples_per_timestep, rng)
                .into_iter()
                .map(|flat| Sample {
                    leds: apply_decay(grid.cell(flat), decay),
                    location: grid.location(flat),
                })
                .collect()
        })
        .collect();

    Ok(aged)
}

/// Draws `floor(area * fraction)` valid cells (with replacement) and returns
/// their fresh, unaged LED vectors. The count is relative to the whole grid,
/// including invalid cells.
pub fn generate_test_set<R: Rng + ?Sized>(
    grid: &IntensityGrid,
    fraction: f64,
    rng: &mut R,
) -> Result<Vec<Sample>, AgingError> {
    let valid = grid.valid_indices();
    if valid.is_empty() {
        return Err(AgingError::NoValidCells);
    }

    let n = (grid.area() as f64 * fraction) as usize;
    Ok(draw_cells(&valid, n, rng)
        .into_iter()
        .map(|flat| Sample {
            leds: grid.cell(flat).to_vec(),
            location: grid.location(flat),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_grid() -> IntensityGrid {
        // 3x3 grid with 2 LEDs; the center cell is invalid
        let mut data = Vec::new();
        for flat in 0..9 {
            if flat == 4 {
                data.extend_from_slice(&[-1.0, -1.0]);
            } else {
                data.extend_from_slice(&[flat as f32 + 1.0, 10.0]);
            }
        }
        IntensityGrid::new(3, 3, 2, data).unwrap()
    }

    #[test]
    fn ninety_percent_at_r90() {
        for r90 in [10_000.0, 27_500.0, 49_999.0] {
            let k = decay_constant(r90);
            assert!(((-k * r90).exp() - 0.9).abs() < 1e-12);
        }
    }

    #[test]
    fn timesteps_exclude_total() {
        assert_eq!(timesteps(5000.0, 1000.0).unwrap(), vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0]);
        assert_eq!(timesteps(4500.0, 1000.0).unwrap().len(), 5);
        assert!(timesteps(0.0, 1000.0).unwrap().is_empty());
        assert_eq!(timesteps(10.0, 0.0), Err(AgingError::BadTimestep(0.0)));
    }

    #[test]
    fn noiseless_schedule_is_pure_exponential() {
        let mut rng = StdRng::seed_from_u64(42);
        let ts = timesteps(50_000.0, 10_000.0).unwrap();
        let schedule = DecaySchedule::generate(ts, 36, 0.0, &mut rng).unwrap();

        assert_eq!(schedule.leds(), 36);
        assert!(schedule
            .r90_hours()
            .iter()
            .all(|h| (R90_MIN_HOURS..R90_MAX_HOURS).contains(h)));
        assert!(schedule.at(0).iter().all(|&d| d == 1.0));

        for (i, &t) in schedule.timesteps().iter().enumerate() {
            for (led, &k) in schedule.decay_ks().iter().enumerate() {
                let expected = (-t * k).exp() as f32;
                assert!((schedule.at(i)[led] - expected).abs() < 1e-6);
            }
        }

        // monotonically dimmer over time
        let mean = schedule.mean();
        assert!(mean.windows(2).all(|w| w[1] < w[0]));
        let (lo, hi) = (schedule.min(), schedule.max());
        assert!(lo.iter().zip(&mean).zip(&hi).all(|((l, m), h)| l <= m && m <= h));
    }

    #[test]
    fn negative_noise_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = DecaySchedule::generate(vec![0.0], 2, -1.0, &mut rng).unwrap_err();
        assert_eq!(err, AgingError::BadNoise(-1.0));
    }

    #[test]
    fn non_finite_noise_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        for std in [f64::NAN, f64::INFINITY, -0.5] {
            let err = DecaySchedule::generate(vec![0.0], 2, std, &mut rng).unwrap_err();
            assert!(matches!(err, AgingError::BadNoise(_)));
        }
    }

    #[test]
    fn infinite_duration_rejected() {
        assert_eq!(
            timesteps(f64::INFINITY, 1.0),
            Err(AgingError::BadDuration(f64::INFINITY))
        );
    }

    #[test]
    fn noise_is_added_to_every_entry() {
        let noise_std = 0.01;
        let mut rng = StdRng::seed_from_u64(11);
        let ts = timesteps(50_000.0, 500.0).unwrap();
        let schedule = DecaySchedule::generate(ts, 36, noise_std, &mut rng).unwrap();

        let residuals: Vec<f64> = schedule
            .timesteps()
            .iter()
            .enumerate()
            .flat_map(|(i, &t)| {
                schedule
                    .decay_ks()
                    .iter()
                    .enumerate()
                    .map(move |(led, &k)| (i, led, (-t * k).exp()))
            })
            .map(|(i, led, clean)| schedule.at(i)[led] as f64 - clean)
            .collect();

        // 100 timesteps x 36 LEDs
        assert_eq!(residuals.len(), 3600);
        assert!(residuals.iter().any(|r| r.abs() > 1e-4));

        let n = residuals.len() as f64;
        let mean = residuals.iter().sum::<f64>() / n;
        let std = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!(mean.abs() < 1e-3, "mean residual {mean}");
        assert!((std - noise_std).abs() < 0.1 * noise_std, "residual std {std}");
    }

    #[test]
    fn same_seed_same_schedule() {
        let ts = timesteps(3000.0, 1000.0).unwrap();
        let a = DecaySchedule::generate(ts.clone(), 5, 0.005, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = DecaySchedule::generate(ts, 5, 0.005, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn aged_samples_only_from_valid_cells() {
        let grid = small_grid();
        let mut rng = StdRng::seed_from_u64(1);
        let schedule = DecaySchedule::generate(vec![0.0, 20_000.0], 2, 0.0, &mut rng).unwrap();
        let aged = generate_aged_samples(&grid, &schedule, 50, &mut rng).unwrap();

        assert_eq!(aged.len(), 2);
        for (i, row) in aged.iter().enumerate() {
            assert_eq!(row.len(), 50);
            for s in row {
                let flat = s.location.y as usize * 3 + s.location.x as usize;
                assert_ne!(flat, 4);
                let fresh = grid.cell(flat);
                assert_eq!(s.leds, apply_decay(fresh, schedule.at(i)));
            }
        }
    }

    #[test]
    fn aged_samples_need_matching_leds() {
        let grid = small_grid();
        let mut rng = StdRng::seed_from_u64(1);
        let schedule = DecaySchedule::generate(vec![0.0], 36, 0.0, &mut rng).unwrap();
        assert_eq!(
            generate_aged_samples(&grid, &schedule, 1, &mut rng),
            Err(AgingError::LedCountMismatch {
                schedule: 36,
                grid: 2
            })
        );
    }

    #[test]
    fn test_set_sized_by_area() {
        let grid = small_grid();
        let mut rng = StdRng::seed_from_u64(3);
        // 9 cells * 0.5 = 4.5, floored
        let test = generate_test_set(&grid, 0.5, &mut rng).unwrap();
        assert_eq!(test.len(), 4);
        assert!(test.iter().all(|s| s.leds[0] != -1.0));
    }

    #[test]
    fn fully_invalid_grid() {
        let grid = IntensityGrid::new(1, 2, 1, vec![-1.0, -1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            generate_test_set(&grid, 1.0, &mut rng),
            Err(AgingError::NoValidCells)
        );
    }
}
