//! # gem_recon_cli
//!
//! Part of the gem_recon crate family.
//!
//! Command line application running the GEM reconstruction over a file of events.
//!
//! ## Use
//!
//! ```bash
//! gem_recon_cli -p config.yml new
//! gem_recon_cli -p config.yml -i pedestal_events.yml -o pedestals.csv pedestal
//! gem_recon_cli -p config.yml -i events.yml -o results.yml run
//! ```
//!
//! Event files are YAML streams with one document per event. A log of the run is
//! written to `gem_recon.log` in the working directory.
use clap::{Arg, ArgMatches, Command};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

use libgem_recon::config::Config;
use libgem_recon::error::{ConfigError, PedestalError, ProcessorError};
use libgem_recon::event::GemEvent;
use libgem_recon::process::{process, process_pedestals, EventResult};
use libgem_recon::worker_status::{RunStage, WorkerStatus};

#[derive(Debug, Error)]
enum CliError {
    #[error("Missing required argument --{0}")]
    MissingArgument(&'static str),
    #[error("Could not read events from {0:?}: {1}")]
    BadEventFile(PathBuf, String),
    #[error("Output failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Output failed to write YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    PedestalError(#[from] PedestalError),
    #[error("{0}")]
    ProcessorError(#[from] ProcessorError),
    #[error("Failed to join the processing thread")]
    JoinError,
    #[error("Could not set up logging: {0}")]
    LoggingError(#[from] spdlog::Error),
}

fn init_logging() -> Result<(), CliError> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./gem_recon.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn path_arg(matches: &ArgMatches, name: &'static str) -> Result<PathBuf, CliError> {
    matches
        .get_one::<String>(name)
        .map(PathBuf::from)
        .ok_or(CliError::MissingArgument(name))
}

/// Read a YAML stream of events, one document per event
fn read_events(path: &Path) -> Result<Vec<GemEvent>, CliError> {
    let yaml_str = std::fs::read_to_string(path)
        .map_err(|e| CliError::BadEventFile(path.to_path_buf(), e.to_string()))?;
    let mut events = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&yaml_str) {
        let event = GemEvent::deserialize(document)
            .map_err(|e| CliError::BadEventFile(path.to_path_buf(), e.to_string()))?;
        events.push(event);
    }
    Ok(events)
}

fn write_results(path: &Path, results: &[EventResult]) -> Result<(), CliError> {
    let mut yaml_str = String::new();
    for result in results.iter() {
        yaml_str.push_str("---\n");
        yaml_str.push_str(&serde_yaml::to_string(result)?);
    }
    std::fs::write(path, yaml_str)?;
    Ok(())
}

/// Drive the progress bar from the worker messages until the worker hangs up
fn watch_worker<T>(
    rx: mpsc::Receiver<WorkerStatus>,
    handle: JoinHandle<Result<T, ProcessorError>>,
) -> Result<T, CliError> {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{msg:>14} [{bar:40.cyan/blue}] {pos:>3}%") {
        pb.set_style(style.progress_chars("=> "));
    }
    for status in rx.iter() {
        let message = match status.stage {
            RunStage::Reconstruction => "Reconstructing",
            RunStage::Pedestal => "Pedestals",
            RunStage::Done => "Done",
        };
        pb.set_message(message);
        pb.set_position((status.progress * 100.0) as u64);
    }
    pb.finish();
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(CliError::JoinError),
    }
}

fn run_reconstruction(config: Config, input: &Path, output: &Path) -> Result<(), CliError> {
    let events = read_events(input)?;
    spdlog::info!("Read {} events from {}", events.len(), input.to_string_lossy());
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let handle = std::thread::spawn(move || process(config, events, tx, 0));
    let results = watch_worker(rx, handle)?;
    write_results(output, &results)?;
    spdlog::info!("Wrote {} events to {}", results.len(), output.to_string_lossy());
    Ok(())
}

fn run_pedestal(config: Config, input: &Path, output: &Path) -> Result<(), CliError> {
    let events = read_events(input)?;
    spdlog::info!("Read {} pedestal events from {}", events.len(), input.to_string_lossy());
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let handle = std::thread::spawn(move || process_pedestals(config, events, tx, 0));
    let table = watch_worker(rx, handle)?;
    table.write(output)?;
    spdlog::info!("Wrote pedestal table to {}", output.to_string_lossy());
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<(), CliError> {
    let config_path = path_arg(matches, "path")?;

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        Config::template().write_config_file(&config_path)?;
        println!("Wrote template config to {}", config_path.to_string_lossy());
        return Ok(());
    }

    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = Config::read_config_file(&config_path)?;
    spdlog::info!(
        "Config successfully loaded: {} detectors, {} FECs, {} APVs",
        config.detectors.len(),
        config.fecs.len(),
        config.apvs.len()
    );

    let input = path_arg(matches, "input")?;
    let output = path_arg(matches, "output")?;
    match matches.subcommand() {
        Some(("pedestal", _)) => run_pedestal(config, &input, &output),
        _ => run_reconstruction(config, &input, &output),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("gem_recon_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("pedestal").about("Fit pedestals from a pedestal run and write the table"),
        )
        .subcommand(Command::new("run").about("Reconstruct and match a file of events"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .help("Path to the YAML event file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Path to the output file"),
        )
        .get_matches();

    if let Err(e) = init_logging() {
        eprintln!("{e}");
        return;
    }
    spdlog::info!("Starting GEM reconstruction CLI");

    match run(&matches) {
        Ok(()) => spdlog::info!("Done."),
        Err(e) => {
            spdlog::error!("{e}");
            eprintln!("GEM reconstruction failed: {e}. Check gem_recon.log for details.");
        }
    }
}
