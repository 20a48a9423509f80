//! Command line front end of the bench. See `vlp-bench --help`.

use clap::Parser;
use log::{info, warn};
use serial2::SerialPort;
use std::{
    error::Error,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use vlp::{
    args::{AgingCommand, BenchArgs, Command, EmbedCommand, ReplayCommand},
    c_array,
    experiment::AgingExperiment,
    grid::IntensityGrid,
    gui::port_selector,
    lambertian::synthesize_grid,
    link::{open_serial, PicoLink},
    replay::replay,
    sample_file::SampleFile,
    simulated_device::SimulatedPico,
};

// Example:
// cargo run -- aging --src dataset/grid.npy --port /dev/ttyACM0 --time 20000
// cargo run -- aging --synthetic 100x80 --simulate
// cargo run -- replay --file test_set.vlp --simulate-from dataset/grid.npy
// cargo run -- embed --input model_int8.tflite --out model_int8.c

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = BenchArgs::parse();

    match args.command {
        Command::Aging(cmd) => aging(cmd, args.seed),
        Command::Replay(cmd) => replay_file(cmd),
        Command::Embed(cmd) => embed(cmd),
    }
}

fn aging(cmd: AgingCommand, seed: u64) -> Result<(), Box<dyn Error>> {
    let (grid, source) = match (&cmd.src, cmd.synthetic) {
        (Some(path), _) => (IntensityGrid::from_npy(path)?, path.display().to_string()),
        (None, Some((width, height))) => (
            synthesize_grid(width, height),
            format!("lambertian {width}x{height}"),
        ),
        (None, None) => return Err("one of --src or --synthetic is required".into()),
    };
    info!(
        "Loaded {} grid of {}x{} cells",
        source,
        grid.width(),
        grid.height()
    );

    let experiment = AgingExperiment::prepare(&grid, cmd.to_config(seed))?;

    if let Some(path) = &cmd.export_test_set {
        SampleFile::builder()
            .set_source(source)
            .set_config(experiment.config().clone())
            .add_samples(experiment.test_set().iter().cloned())
            .build()?
            .to_path(path)?;
        info!("Wrote the test set to {}", path.display());
    }

    let report = if cmd.simulate {
        let mut link = PicoLink::new(SimulatedPico::builder().build(&grid)?);
        experiment.run(&mut link)?
    } else {
        let Some(mut link) = connect(cmd.port.as_deref(), cmd.baud, cmd.timeout)? else {
            return Ok(());
        };
        experiment.run(&mut link)?
    };

    println!("{report}");
    Ok(())
}

fn replay_file(cmd: ReplayCommand) -> Result<(), Box<dyn Error>> {
    let file = SampleFile::from_path(&cmd.file)?;
    info!(
        "Loaded {} samples recorded from {}",
        file.samples().len(),
        file.source()
    );
    if file.samples().is_empty() {
        warn!("{} holds no samples", cmd.file.display());
    }

    let report = match &cmd.simulate_from {
        Some(path) => {
            let grid = IntensityGrid::from_npy(path)?;
            run_replay(PicoLink::new(SimulatedPico::builder().build(&grid)?), &file)?
        }
        None => {
            let Some(link) = connect(cmd.port.as_deref(), cmd.baud, cmd.timeout)? else {
                return Ok(());
            };
            run_replay(link, &file)?
        }
    };

    println!("{report}");
    Ok(())
}

fn run_replay<P: Read + Write>(
    mut link: PicoLink<P>,
    file: &SampleFile,
) -> Result<vlp::replay::ReplayReport, Box<dyn Error>> {
    Ok(replay(&mut link, file.samples())?)
}

fn embed(cmd: EmbedCommand) -> Result<(), Box<dyn Error>> {
    c_array::convert_file(&cmd.input, &cmd.outfile, cmd.name.as_deref())?;
    Ok(())
}

/// Opens `port`, or asks the user to pick one when none was given. `None`
/// means the user backed out of the selector.
fn connect(
    port: Option<&Path>,
    baud: u32,
    timeout_secs: u64,
) -> Result<Option<PicoLink<SerialPort>>, Box<dyn Error>> {
    let path: PathBuf = match port {
        Some(p) => p.to_path_buf(),
        None => match port_selector(SerialPort::available_ports()?)? {
            Some(p) => p,
            None => {
                info!("No port selected, exiting");
                return Ok(None);
            }
        },
    };

    info!("Opening {} at {} baud", path.display(), baud);
    let link = open_serial(&path, baud, Duration::from_secs(timeout_secs))?;
    Ok(Some(link))
}
