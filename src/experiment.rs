//! The aging experiment: how far do the Pico's predictions drift as the
//! LEDs dim over tens of thousands of hours?
//!
//! For each simulated timestep the device is first shown that timestep's
//! aged samples as warmup traffic, then scored on a fixed test set dimmed
//! by the same timestep's decay.

use crate::aging::{
    apply_decay, generate_aged_samples, generate_test_set, timesteps, AgingError, DecaySchedule,
};
use crate::grid::{IntensityGrid, MM_PER_CELL};
use crate::link::{LinkError, PicoLink};
use crate::packet::{EvalFlag, LED_COUNT};
use crate::{mean_error, Position, Sample};

use log::info;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{Read, Write},
    time::{Duration, Instant},
};

/// Every knob of an aging run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingConfig {
    /// Standard deviation of the noise added to the relative decay
    pub noise_std: f64,
    /// How long to age the LEDs for, in hours
    pub total_hours: f64,
    /// Hours between two evaluations
    pub timestep_hours: f64,
    /// Warmup samples sent to the device at every timestep
    pub samples_per_timestep: usize,
    /// Probability of an LED flickering off. Recorded, not simulated.
    pub flickering_prob: f64,
    /// Seed for every random draw of the run
    pub seed: u64,
    /// Size of the test set, as a fraction of the grid area
    pub test_fraction: f64,
    /// The test set is cut down to at most this many samples
    pub test_limit: usize,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            noise_std: 0.005,
            total_hours: 50_000.0,
            timestep_hours: 1000.0,
            samples_per_timestep: 100,
            flickering_prob: 0.001,
            seed: 42,
            test_fraction: 0.02,
            test_limit: 1000,
        }
    }
}

/// Errors produced while preparing or running an experiment.
#[derive(Debug)]
pub enum ExperimentError {
    /// The grid does not have one value per LED on the rig.
    LedCountMismatch(usize),
    /// Sampling failed.
    Aging(AgingError),
    /// Talking to the device failed.
    Link(LinkError),
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExperimentError::LedCountMismatch(n) => {
                write!(f, "grid has {n} LEDs per cell, the rig has {LED_COUNT}")
            }
            ExperimentError::Aging(e) => write!(f, "{e}"),
            ExperimentError::Link(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ExperimentError {}

impl From<AgingError> for ExperimentError {
    fn from(value: AgingError) -> Self {
        Self::Aging(value)
    }
}

impl From<LinkError> for ExperimentError {
    fn from(value: LinkError) -> Self {
        Self::Link(value)
    }
}

fn to_mm(sample: Sample) -> Sample {
    Sample {
        location: sample.location.scaled(MM_PER_CELL),
        ..sample
    }
}

/// Everything drawn up front for one run; the device is not touched yet.
#[derive(Debug, Clone)]
pub struct AgingExperiment {
    config: AgingConfig,
    schedule: DecaySchedule,
    aged: Vec<Vec<Sample>>,
    test: Vec<Sample>,
}

impl AgingExperiment {
    /// Draws the decay schedule, the aged warmup samples and the test set.
    ///
    /// Randomness is consumed in a fixed order (lifetimes, noise, warmup
    /// cells, test cells) so a seed always reproduces the same run.
    pub fn prepare(grid: &IntensityGrid, config: AgingConfig) -> Result<Self, ExperimentError> {
        if grid.leds() != LED_COUNT {
            return Err(ExperimentError::LedCountMismatch(grid.leds()));
        }
        info!(
            "Generated valid mask ({} valid points)",
            grid.valid_indices().len()
        );

        let mut rng = StdRng::seed_from_u64(config.seed);

        let ts = timesteps(config.total_hours, config.timestep_hours)?;
        info!("Generated {} timesteps", ts.len());

        let schedule = DecaySchedule::generate(ts, grid.leds(), config.noise_std, &mut rng)?;
        info!(
            "Generated {} decay constants and their decay scalers",
            schedule.leds()
        );

        let aged: Vec<Vec<Sample>> =
            generate_aged_samples(grid, &schedule, config.samples_per_timestep, &mut rng)?
                .into_iter()
                .map(|row| row.into_iter().map(to_mm).collect())
                .collect();
        info!(
            "Generated {} samples; {} samples at {} timesteps",
            aged.len() * config.samples_per_timestep,
            config.samples_per_timestep,
            aged.len()
        );

        let test: Vec<Sample> = generate_test_set(grid, config.test_fraction, &mut rng)?
            .into_iter()
            .take(config.test_limit)
            .map(to_mm)
            .collect();
        info!("Generated a test set of {} samples", test.len());

        Ok(Self {
            config,
            schedule,
            aged,
            test,
        })
    }

    /// The configuration this run was prepared with.
    pub fn config(&self) -> &AgingConfig {
        &self.config
    }

    /// The decay of every LED over time.
    pub fn schedule(&self) -> &DecaySchedule {
        &self.schedule
    }

    /// Warmup samples, `[timestep][sample]`, locations in mm.
    pub fn aged_samples(&self) -> &[Vec<Sample>] {
        &self.aged
    }

    /// Fresh test samples, locations in mm.
    pub fn test_set(&self) -> &[Sample] {
        &self.test
    }

    /// The test vectors as they look at timestep index `i`.
    pub fn test_inputs_at(&self, i: usize) -> Vec<Vec<f32>> {
        let decay = self.schedule.at(i);
        self.test
            .iter()
            .map(|s| apply_decay(&s.leds, decay))
            .collect()
    }

    /// Runs every timestep against the device behind `link`.
    pub fn run<P>(&self, link: &mut PicoLink<P>) -> Result<RunReport, ExperimentError>
    where
        P: Read + Write,
    {
        let start = Instant::now();
        let truth: Vec<Position> = self.test.iter().map(|s| s.location).collect();
        let n_steps = self.schedule.timesteps().len();

        let mut errors = Vec::with_capacity(n_steps);
        for (i, &t) in self.schedule.timesteps().iter().enumerate() {
            link.predict(self.aged[i].iter().map(|s| &s.leds), EvalFlag::Warmup)?;

            let predictions = link.predict(self.test_inputs_at(i), EvalFlag::Evaluate)?;
            let average_error = mean_error(&predictions, &truth);
            info!(
                "[{}/{}] Average error at {} hours: {:.2} mm",
                i + 1,
                n_steps,
                t,
                average_error
            );
            errors.push(average_error);
        }

        Ok(RunReport {
            timesteps: self.schedule.timesteps().to_vec(),
            errors,
            decay_ks: self.schedule.decay_ks().to_vec(),
            avg_decay: self.schedule.mean(),
            min_decay: self.schedule.min(),
            max_decay: self.schedule.max(),
            elapsed: start.elapsed(),
        })
    }
}

/// What a finished run measured.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Simulated hours of every evaluation
    pub timesteps: Vec<f64>,
    /// Mean positioning error in mm, per timestep
    pub errors: Vec<f32>,
    /// Decay constant of every LED
    pub decay_ks: Vec<f64>,
    /// Mean relative brightness, per timestep
    pub avg_decay: Vec<f32>,
    /// Dimmest LED, per timestep
    pub min_decay: Vec<f32>,
    /// Brightest LED, per timestep
    pub max_decay: Vec<f32>,
    /// Wall clock time spent talking to the device
    pub elapsed: Duration,
}

impl RunReport {
    /// Running total of the error, per timestep.
    pub fn cumulative_errors(&self) -> Vec<f32> {
        self.errors
            .iter()
            .scan(0.0, |acc, e| {
                *acc += e;
                Some(*acc)
            })
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>10}  {:>10}  {:>12}  {:>8}  {:>8}  {:>8}",
            "hours", "error mm", "cumulative", "avg", "min", "max"
        )?;
        let cumulative = self.cumulative_errors();
        for i in 0..self.timesteps.len() {
            writeln!(
                f,
                "{:>10}  {:>10.2}  {:>12.2}  {:>8.4}  {:>8.4}  {:>8.4}",
                self.timesteps[i],
                self.errors[i],
                cumulative[i],
                self.avg_decay[i],
                self.min_decay[i],
                self.max_decay[i]
            )?;
        }
        write!(f, "total time: {:.1?}", self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambertian::synthesize_grid;
    use crate::simulated_device::SimulatedPico;

    fn quick_config() -> AgingConfig {
        AgingConfig {
            noise_std: 0.0,
            total_hours: 40_000.0,
            timestep_hours: 10_000.0,
            samples_per_timestep: 5,
            test_fraction: 0.05,
            test_limit: 30,
            ..AgingConfig::default()
        }
    }

    #[test]
    fn prepare_shapes() {
        let grid = synthesize_grid(40, 30);
        let exp = AgingExperiment::prepare(&grid, quick_config()).unwrap();

        assert_eq!(exp.schedule().timesteps(), &[0.0, 10_000.0, 20_000.0, 30_000.0]);
        assert_eq!(exp.aged_samples().len(), 4);
        assert!(exp.aged_samples().iter().all(|row| row.len() == 5));
        // 1200 cells * 0.05 = 60, cut to 30
        assert_eq!(exp.test_set().len(), 30);
        // locations are in millimetres, on the 10 mm lattice
        assert!(exp
            .test_set()
            .iter()
            .all(|s| s.location.x % 10.0 == 0.0 && s.location.x < 400.0));
    }

    #[test]
    fn prepare_is_reproducible() {
        let grid = synthesize_grid(20, 20);
        let a = AgingExperiment::prepare(&grid, quick_config()).unwrap();
        let b = AgingExperiment::prepare(&grid, quick_config()).unwrap();
        assert_eq!(a.schedule(), b.schedule());
        assert_eq!(a.test_set(), b.test_set());

        let c = AgingExperiment::prepare(
            &grid,
            AgingConfig {
                seed: 43,
                ..quick_config()
            },
        )
        .unwrap();
        assert_ne!(a.schedule(), c.schedule());
    }

    #[test]
    fn rejects_grids_for_other_rigs() {
        let grid = IntensityGrid::new(1, 1, 2, vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            AgingExperiment::prepare(&grid, quick_config()),
            Err(ExperimentError::LedCountMismatch(2))
        ));
    }

    #[test]
    fn test_inputs_are_dimmed() {
        let grid = synthesize_grid(20, 20);
        let exp = AgingExperiment::prepare(&grid, quick_config()).unwrap();
        let fresh = exp.test_inputs_at(0);
        let old = exp.test_inputs_at(3);
        assert_eq!(fresh[0], exp.test_set()[0].leds);
        assert!(old[0].iter().zip(&fresh[0]).all(|(o, f)| o < f));
    }

    #[test]
    fn run_against_simulated_device() {
        let grid = synthesize_grid(40, 30);
        let exp = AgingExperiment::prepare(&grid, quick_config()).unwrap();
        let device = SimulatedPico::builder().build(&grid).unwrap();
        let mut link = PicoLink::new(device);

        let report = exp.run(&mut link).unwrap();
        assert_eq!(report.errors.len(), 4);
        assert_eq!(report.decay_ks.len(), LED_COUNT);
        // fresh LEDs are looked up exactly
        assert!(report.errors[0] < 1e-3);
        assert!(report.errors.iter().all(|e| e.is_finite()));

        let device = link.into_inner();
        assert_eq!(device.warmups(), 4 * 5);
        assert_eq!(device.evaluations(), 4 * 30);

        let table = report.to_string();
        assert!(table.contains("error mm"));
        assert_eq!(table.lines().count(), 1 + 4 + 1);
    }

    #[test]
    fn cumulative_errors_add_up() {
        let report = RunReport {
            timesteps: vec![0.0, 1.0, 2.0],
            errors: vec![1.0, 2.0, 3.5],
            decay_ks: vec![],
            avg_decay: vec![1.0; 3],
            min_decay: vec![1.0; 3],
            max_decay: vec![1.0; 3],
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.cumulative_errors(), vec![1.0, 3.0, 6.5]);
    }
}
