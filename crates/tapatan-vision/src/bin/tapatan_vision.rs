//! tapatan-vision CLI: calibrate the board from image files and render markers.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tapatan_vision::aruco::Dictionary;
use tapatan_vision::calib::CalibrationSetup;
use tapatan_vision::core::LogConfig;
use tapatan_vision::detect::{draw_calibration, gray_frame, load_gray, marker_image};
use tapatan_vision::{BoardCoordinateSystem, CalibrationReport, FrameOutcome};

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tapatan-vision")]
#[command(about = "Calibrate the Tapatan board from two ArUco reference markers")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run image files through the calibration in order and print a JSON report.
    Calibrate(CalibrateArgs),

    /// Render one marker with a white quiet zone as a PNG.
    RenderMarker(RenderArgs),

    /// Print dictionary statistics.
    DictionaryInfo {
        /// Dictionary JSON file.
        #[arg(long)]
        dictionary: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Setup JSON (dictionary path and calibration configuration).
    #[arg(long)]
    setup: PathBuf,

    /// Also write the report to this file.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write `<frame>.overlay.png` with markers and cell centers for every
    /// frame that calibrated.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Frames, processed in the given order.
    #[arg(required = true)]
    frames: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RenderArgs {
    /// Dictionary JSON file.
    #[arg(long)]
    dictionary: PathBuf,

    /// Marker id.
    #[arg(long)]
    id: u32,

    /// Pixels per marker cell.
    #[arg(long, default_value = "20")]
    cell_px: usize,

    /// White margin around the marker in pixels.
    #[arg(long, default_value = "40")]
    quiet_px: usize,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::RenderMarker(args) => run_render(&args),
        Commands::DictionaryInfo { dictionary } => run_dictionary_info(&dictionary),
    }
}

fn init_logging(verbose: u8, json: bool) {
    #[cfg(feature = "tracing")]
    let _ = LogTracer::init();
    tapatan_vision::core::init_logging(LogConfig::from_verbosity(verbose, json));
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let setup = CalibrationSetup::load_json(&args.setup)?;
    let mut board = BoardCoordinateSystem::from_setup(&setup)?;

    let mut outcomes = Vec::with_capacity(args.frames.len());
    for path in &args.frames {
        let label = path.display().to_string();
        let img = match load_gray(path) {
            Ok(img) => img,
            Err(err) => {
                log::warn!("skipping {label}: {err}");
                outcomes.push(FrameOutcome::unreadable(label, err.to_string()));
                continue;
            }
        };
        let outcome = board.orchestrator_mut().try_calibrate(&gray_frame(&img));
        if let (Some(dir), Ok(result)) = (&args.overlay_dir, &outcome) {
            let stem = path.file_stem().unwrap_or(path.as_os_str()).to_string_lossy();
            let overlay = dir.join(format!("{stem}.overlay.png"));
            draw_calibration(&img, result).save(&overlay)?;
            log::info!("wrote {}", overlay.display());
        }
        outcomes.push(FrameOutcome::new(label, &outcome));
    }

    let report = CalibrationReport::new(outcomes, &board);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(out) = &args.out {
        report.write_json(out)?;
    }
    if !board.is_calibrated() {
        return Err("no frame produced a calibration".into());
    }
    Ok(())
}

fn run_render(args: &RenderArgs) -> CliResult<()> {
    let dict = Dictionary::load_json(&args.dictionary)?;
    let img = marker_image(&dict, args.id, args.cell_px, args.quiet_px)?;
    img.save(&args.out)?;
    println!(
        "wrote marker {} ({}x{} px) to {}",
        args.id,
        img.width(),
        img.height(),
        args.out.display()
    );
    Ok(())
}

fn run_dictionary_info(path: &Path) -> CliResult<()> {
    let dict = Dictionary::load_json(path)?;
    println!("name: {}", dict.name());
    println!("marker size: {}x{}", dict.marker_size(), dict.marker_size());
    println!("markers: {}", dict.len());
    println!("max correction bits: {}", dict.max_correction_bits());
    println!("min distance: {}", dict.min_distance());
    Ok(())
}
