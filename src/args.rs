// Commandline argument parser using clap for the VLP bench

use crate::experiment::AgingConfig;
use crate::link::DEFAULT_BAUD;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top level arguments of the `vlp-bench` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct BenchArgs {
    #[command(subcommand)]
    /// Which task to perform: an aging run, a replay, or a model embed
    pub command: Command,

    /// Seed for every random draw, so a run can be reproduced
    #[arg(long, global = true, default_value_t = 42)]
    pub seed: u64,
}

/// The tasks the bench can perform.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Age the LEDs in simulation and score the device at every timestep
    Aging(AgingCommand),

    /// Score the device on recorded samples
    Replay(ReplayCommand),

    /// Dump a model binary into a C array for the firmware
    Embed(EmbedCommand),
}

/// Arguments of `vlp-bench aging`.
#[derive(Debug, Args, Clone)]
pub struct AgingCommand {
    /// Intensity grid to sample from, a (height, width, 36) .npy file
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    pub src: Option<PathBuf>,

    /// Use a Lambertian grid of WIDTHxHEIGHT cells instead of a dataset
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub synthetic: Option<(usize, usize)>,

    /// Serial port of the device; a selector is shown when omitted
    #[arg(short, long, conflicts_with = "simulate")]
    pub port: Option<PathBuf>,

    /// Talk to a simulated device built from the same grid
    #[arg(long)]
    pub simulate: bool,

    /// Baud rate of the serial link
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Read timeout of the serial link, in seconds
    #[arg(long, default_value_t = 100)]
    pub timeout: u64,

    /// Standard deviation of the noise on the relative decay
    #[arg(long = "std", default_value_t = 0.005)]
    pub noise_std: f64,

    /// Total simulated time, in hours
    #[arg(long = "time", default_value_t = 50_000.0)]
    pub total_hours: f64,

    /// Hours between two evaluations
    #[arg(long = "timestep", default_value_t = 1000.0)]
    pub timestep_hours: f64,

    /// Warmup samples sent at every timestep
    #[arg(long, default_value_t = 100)]
    pub samples_per_timestep: usize,

    /// Probability of an LED flickering off (recorded only)
    #[arg(long, default_value_t = 0.001)]
    pub flickering_prob: f64,

    /// Write the test set to this file for later replay
    #[arg(long, value_name = "FILE")]
    pub export_test_set: Option<PathBuf>,
}

impl AgingCommand {
    /// The run configuration these arguments describe.
    pub fn to_config(&self, seed: u64) -> AgingConfig {
        AgingConfig {
            noise_std: self.noise_std,
            total_hours: self.total_hours,
            timestep_hours: self.timestep_hours,
            samples_per_timestep: self.samples_per_timestep,
            flickering_prob: self.flickering_prob,
            seed,
            ..AgingConfig::default()
        }
    }
}

/// Arguments of `vlp-bench replay`.
#[derive(Debug, Args, Clone)]
pub struct ReplayCommand {
    /// Sample file to replay
    #[arg(short, long)]
    pub file: PathBuf,

    /// Serial port of the device; a selector is shown when omitted
    #[arg(short, long, conflicts_with = "simulate_from")]
    pub port: Option<PathBuf>,

    /// Replay against a simulated device built from this .npy grid
    #[arg(long, value_name = "NPY")]
    pub simulate_from: Option<PathBuf>,

    /// Baud rate of the serial link
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    /// Read timeout of the serial link, in seconds
    #[arg(long, default_value_t = 100)]
    pub timeout: u64,
}

/// Arguments of `vlp-bench embed`.
#[derive(Debug, Args, Clone)]
pub struct EmbedCommand {
    /// Model binary, usually a .tflite file
    #[arg(short, long)]
    pub input: PathBuf,

    /// C file to write
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,

    /// Name of the array; derived from the input file name by default
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Parses `WIDTHxHEIGHT`, e.g. `100x80`.
fn parse_dimensions(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s
        .split_once(|c| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w: usize = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h: usize = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("grid dimensions must be positive".to_string());
    }
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        BenchArgs::command().debug_assert();
    }

    #[test]
    fn aging_defaults_match_config() {
        let args = BenchArgs::parse_from(["vlp-bench", "aging", "--synthetic", "20x10", "--simulate"]);
        let Command::Aging(aging) = args.command else {
            panic!("expected the aging command");
        };
        assert_eq!(aging.synthetic, Some((20, 10)));
        assert_eq!(aging.to_config(args.seed), AgingConfig::default());
    }

    #[test]
    fn aging_overrides() {
        let args = BenchArgs::parse_from([
            "vlp-bench",
            "aging",
            "--src",
            "grid.npy",
            "--port",
            "/dev/ttyACM0",
            "--std",
            "0.01",
            "--time",
            "2000",
            "--timestep",
            "500",
            "--seed",
            "7",
        ]);
        let Command::Aging(aging) = args.command else {
            panic!("expected the aging command");
        };
        let config = aging.to_config(args.seed);
        assert_eq!(config.seed, 7);
        assert_eq!(config.noise_std, 0.01);
        assert_eq!(config.total_hours, 2000.0);
        assert_eq!(config.timestep_hours, 500.0);
        assert_eq!(aging.port, Some(PathBuf::from("/dev/ttyACM0")));
    }

    #[test]
    fn aging_needs_a_grid() {
        assert!(BenchArgs::try_parse_from(["vlp-bench", "aging", "--simulate"]).is_err());
        assert!(BenchArgs::try_parse_from([
            "vlp-bench",
            "aging",
            "--src",
            "a.npy",
            "--synthetic",
            "3x3"
        ])
        .is_err());
    }

    #[test]
    fn dimensions() {
        assert_eq!(parse_dimensions("100x80"), Ok((100, 80)));
        assert!(parse_dimensions("100").is_err());
        assert!(parse_dimensions("0x5").is_err());
        assert!(parse_dimensions("ax5").is_err());
    }

    #[test]
    fn embed_name_is_optional() {
        let args =
            BenchArgs::parse_from(["vlp-bench", "embed", "-i", "model.tflite", "-o", "model.c"]);
        let Command::Embed(embed) = args.command else {
            panic!("expected the embed command");
        };
        assert_eq!(embed.name, None);
    }
}
