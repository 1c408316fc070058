//! suriza: read a loop puzzle through the camera and draw its solution.
//!
//! A full run opens the plotter, captures one frame, recognizes the
//! board, hands the grid to the external solver and draws the returned
//! route. The `detect` and `draw` subcommands run each half alone.
//!
//! # Usage
//!
//! ```text
//! suriza run [--config suriza.json] [--frame board.png] [--dry-run out.gcode]
//! suriza detect --frame board.png [--json] [--canonical canonical.png] [--diagnostics]
//! suriza draw --path route.json [--dry-run out.gcode]
//! suriza default-config > suriza.json
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Serialize;
use suriza_io::solver::decode_route;
use suriza_io::{
    AcquisitionError, Camera, CommandCamera, CommandSolver, ConfigurationError, FrameAcquirer,
    ImageFileCamera, RobotConfig, SerialError, SerialGrbl, Solver, SolverError,
    TesseractRecognizer, open_grbl,
};
use suriza_plotter::{
    Delay, GcodeWriter, MotionError, MotionSequencer, Plotter, PlotterConfig, PlotterError,
    PlotterPoint, ThreadDelay,
};
use suriza_vision::diagnostics::Clock;
use suriza_vision::{
    BoardCorners, CellIndex, Frame, Grid, LensCorrector, VisionError, VisionResult,
};

/// Camera-to-pen-plotter loop puzzle robot.
#[derive(Parser)]
#[command(name = "suriza", version)]
struct Cli {
    /// Increase log detail (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Photograph the board, solve it and draw the route.
    Run {
        /// Configuration file (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Read the board from an image file instead of the camera.
        #[arg(long)]
        frame: Option<PathBuf>,

        /// Write G-code to this file instead of driving the plotter.
        #[arg(long, value_name = "GCODE_OUT")]
        dry_run: Option<PathBuf>,
    },

    /// Recognize the board in an image and print the grid.
    Detect {
        /// Configuration file (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Camera frame to read.
        #[arg(long)]
        frame: PathBuf,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Save the canonical board image.
        #[arg(long, value_name = "PNG_OUT")]
        canonical: Option<PathBuf>,

        /// Print per-stage timings and counts.
        #[arg(long)]
        diagnostics: bool,
    },

    /// Draw a route read from a JSON file of `[column, row]` pairs.
    Draw {
        /// Configuration file (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Route file.
        #[arg(long)]
        path: PathBuf,

        /// Write G-code to this file instead of driving the plotter.
        #[arg(long, value_name = "GCODE_OUT")]
        dry_run: Option<PathBuf>,
    },

    /// Print the default configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Plotter(#[from] PlotterError),

    #[error("failed to read route file {}", .path.display())]
    ReadRoute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save {}", .path.display())]
    SaveImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to serialize output")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    suriza_io::logging::init(cli.verbose, cli.log_json);

    let result = match cli.command {
        Command::Run {
            config,
            frame,
            dry_run,
        } => run(config.as_deref(), frame.as_deref(), dry_run.as_deref()),
        Command::Detect {
            config,
            frame,
            json,
            canonical,
            diagnostics,
        } => detect(
            config.as_deref(),
            &frame,
            &DetectOutput {
                json,
                canonical,
                diagnostics,
            },
        ),
        Command::Draw {
            config,
            path,
            dry_run,
        } => draw(config.as_deref(), &path, dry_run.as_deref()),
        Command::DefaultConfig => print_default_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let chain = error_chain(&e);
            tracing::error!(error = %chain, "suriza failed");
            eprintln!("Error: {chain}");
            ExitCode::FAILURE
        }
    }
}

/// The end-to-end sequence: plotter, frame, grid, route, drawing.
fn run(
    config_path: Option<&Path>,
    frame_path: Option<&Path>,
    dry_run: Option<&Path>,
) -> Result<(), RunError> {
    let config = RobotConfig::load_or_default(config_path)?;
    let corrector = LensCorrector::new(&config.vision.calibration)?;

    let target = Target::open(&config, dry_run)?;

    let frame = acquire_frame(&config, frame_path)?;
    let recognizer = TesseractRecognizer::new(
        config.devices.tesseract_program.as_str(),
        config.vision.whitelist.as_str(),
    );
    let result = suriza_vision::detect(frame, &config.vision, &corrector, &recognizer)?;
    println!("{}", result.grid);

    let mut solver = CommandSolver::new(
        config.devices.solver_program.clone(),
        config.devices.solver_args.clone(),
    );
    let route = solver.solve(&result.grid)?;
    let points = config.plotter.mapper().map_path(&route);

    target.draw(&config.plotter, &points)
}

fn acquire_frame(config: &RobotConfig, frame_path: Option<&Path>) -> Result<Frame, RunError> {
    let resolution = config.vision.calibration.resolution;
    let mut camera: Box<dyn Camera> = match frame_path {
        Some(path) => Box::new(ImageFileCamera::new(path, resolution)),
        None => Box::new(CommandCamera::new(&config.devices.camera, resolution)),
    };
    let acquirer = FrameAcquirer::from_config(&config.devices.camera);
    Ok(acquirer.acquire(camera.as_mut(), &mut ThreadDelay)?)
}

struct DetectOutput {
    json: bool,
    canonical: Option<PathBuf>,
    diagnostics: bool,
}

/// JSON view of a recognition result.
#[derive(Serialize)]
struct DetectReport<'a> {
    grid: &'a Grid,
    text: String,
    corners: &'a BoardCorners,
    marker_count: usize,
    unknown_cells: Vec<CellIndex>,
}

fn detect(
    config_path: Option<&Path>,
    frame_path: &Path,
    output: &DetectOutput,
) -> Result<(), RunError> {
    let config = RobotConfig::load_or_default(config_path)?;
    let corrector = LensCorrector::new(&config.vision.calibration)?;
    let frame = ImageFileCamera::new(frame_path, config.vision.calibration.resolution)
        .try_frame()?
        .ok_or(AcquisitionError::Exhausted { attempts: 1 })?;
    let recognizer = TesseractRecognizer::new(
        config.devices.tesseract_program.as_str(),
        config.vision.whitelist.as_str(),
    );

    let (result, diagnostics) = if output.diagnostics {
        let (result, diagnostics) = suriza_vision::detect_with_diagnostics(
            frame,
            &config.vision,
            &corrector,
            &recognizer,
            &StdClock,
        )?;
        (result, Some(diagnostics))
    } else {
        (
            suriza_vision::detect(frame, &config.vision, &corrector, &recognizer)?,
            None,
        )
    };

    if let Some(ref path) = output.canonical {
        result
            .canonical
            .save(path)
            .map_err(|source| RunError::SaveImage {
                path: path.clone(),
                source,
            })?;
        eprintln!("Canonical image written to {}", path.display());
    }

    if output.json {
        println!("{}", serde_json::to_string_pretty(&detect_report(&result))?);
        if let Some(ref diagnostics) = diagnostics {
            println!("{}", serde_json::to_string_pretty(diagnostics)?);
        }
    } else {
        println!("{}", result.grid);
        if let Some(ref diagnostics) = diagnostics {
            println!();
            println!("{}", diagnostics.report());
        }
    }
    Ok(())
}

fn detect_report(result: &VisionResult) -> DetectReport<'_> {
    DetectReport {
        grid: &result.grid,
        text: result.grid.to_string(),
        corners: &result.corners,
        marker_count: result.markers.len(),
        unknown_cells: result.grid.unknown_cells(),
    }
}

/// Draw a route from a file, skipping the vision half.
fn draw(config_path: Option<&Path>, route_path: &Path, dry_run: Option<&Path>) -> Result<(), RunError> {
    let config = RobotConfig::load_or_default(config_path)?;
    let bytes = std::fs::read(route_path).map_err(|source| RunError::ReadRoute {
        path: route_path.to_path_buf(),
        source,
    })?;
    let route = decode_route(&bytes, config.vision.grid.cell_count)?;
    let points = config.plotter.mapper().map_path(&route);

    Target::open(&config, dry_run)?.draw(&config.plotter, &points)
}

fn print_default_config() -> Result<(), RunError> {
    println!("{}", serde_json::to_string_pretty(&RobotConfig::default())?);
    Ok(())
}

/// Where the drawing goes.
enum Target {
    Controller(SerialGrbl),
    GcodeFile {
        writer: GcodeWriter<BufWriter<File>>,
        path: PathBuf,
    },
}

impl Target {
    fn open(config: &RobotConfig, dry_run: Option<&Path>) -> Result<Self, RunError> {
        let dialect = config.plotter.dialect();
        if let Some(path) = dry_run {
            let file = File::create(path).map_err(|source| RunError::Create {
                path: path.to_path_buf(),
                source,
            })?;
            let mut writer = GcodeWriter::new(BufWriter::new(file), dialect);
            writer.write_preamble()?;
            return Ok(Self::GcodeFile {
                writer,
                path: path.to_path_buf(),
            });
        }
        Ok(Self::Controller(open_grbl(&config.devices.serial, dialect)?))
    }

    fn draw(self, config: &PlotterConfig, points: &[PlotterPoint]) -> Result<(), RunError> {
        match self {
            Self::Controller(grbl) => {
                sequence(grbl, ThreadDelay, config, points)?;
            }
            Self::GcodeFile { writer, path } => {
                let writer = sequence(writer, NoDelay, config, points)?;
                writer.finish()?;
                eprintln!("G-code written to {}", path.display());
            }
        }
        Ok(())
    }
}

fn sequence<P: Plotter, D: Delay>(
    plotter: P,
    delay: D,
    config: &PlotterConfig,
    points: &[PlotterPoint],
) -> Result<P, MotionError> {
    let mut sequencer = MotionSequencer::new(plotter, delay, config.timing());
    sequencer.draw(points)?;
    tracing::info!(state = ?sequencer.state(), "drawing complete");
    Ok(sequencer.into_inner())
}

/// Skips pauses when only G-code is written.
struct NoDelay;

impl Delay for NoDelay {
    fn pause(&mut self, _duration: Duration) {}
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// `outer: inner: innermost` rendering of an error and its sources.
fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
