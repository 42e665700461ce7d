//! lensgrid CLI — measure lenses from raw NV21 dot-grid frames.

use clap::{Args, Parser, Subcommand};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_cross_mut;
use std::path::{Path, PathBuf};

use lensgrid::{Frame, Grid, Lensmeter, LensmeterConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "lensgrid")]
#[command(about = "Measure sphere, cylinder and axis of a lens from dot-grid camera frames")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure a lens from a zero frame and a sample frame.
    Measure(MeasureArgs),

    /// Track the dot grid of a single frame.
    Track(TrackArgs),

    /// Print the default configuration as JSON.
    DefaultConfig {
        /// Write to this path instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct FrameArgs {
    /// Frame width in pixels.
    #[arg(long)]
    width: u32,

    /// Frame height in pixels.
    #[arg(long)]
    height: u32,

    /// JSON configuration (partial files keep defaults for missing keys).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the tracked row count (odd).
    #[arg(long)]
    rows: Option<usize>,

    /// Override the tracked column count (odd).
    #[arg(long)]
    cols: Option<usize>,

    /// Override the distance-grid dot pitch in pixels.
    #[arg(long)]
    pitch: Option<f32>,
}

#[derive(Debug, Clone, Args)]
struct MeasureArgs {
    /// Raw NV21 frame of the empty stage.
    #[arg(long)]
    zero: PathBuf,

    /// Raw NV21 frame with the lens in place.
    #[arg(long)]
    sample: PathBuf,

    #[command(flatten)]
    frame: FrameArgs,

    /// Path to write the measurement (JSON).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to write the sample frame's chroma mask (PNG).
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Path to write the sample frame with tracked dots drawn on it (PNG).
    #[arg(long)]
    overlay: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct TrackArgs {
    /// Raw NV21 frame.
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    frame: FrameArgs,

    /// Path to write the tracked grid (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Path to write the frame with tracked dots drawn on it (PNG).
    #[arg(long)]
    overlay: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Measure(args) => run_measure(&args),
        Commands::Track(args) => run_track(&args),
        Commands::DefaultConfig { out } => run_default_config(out.as_deref()),
    }
}

fn load_lensmeter(args: &FrameArgs) -> CliResult<Lensmeter> {
    let mut lensmeter = match &args.config {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            Lensmeter::from_json_file(path)?
        }
        None => Lensmeter::new(),
    };

    let geometry = &mut lensmeter.config_mut().geometry;
    if let Some(rows) = args.rows {
        geometry.rows = rows;
    }
    if let Some(cols) = args.cols {
        geometry.cols = cols;
    }
    if let Some(pitch) = args.pitch {
        geometry.pitch_px = pitch;
    }
    lensmeter.config().validate()?;
    Ok(lensmeter)
}

fn read_frame_bytes(path: &Path, args: &FrameArgs) -> CliResult<Vec<u8>> {
    let data = std::fs::read(path)
        .map_err(|e| -> CliError { format!("Failed to read {}: {}", path.display(), e).into() })?;
    let needed = Frame::buffer_len(args.width, args.height);
    if data.len() < needed {
        return Err(format!(
            "{} holds {} bytes, a {}x{} NV21 frame needs {}",
            path.display(),
            data.len(),
            args.width,
            args.height,
            needed
        )
        .into());
    }
    Ok(data)
}

/// Luma plane as RGB with the valid grid dots (green) and an optional
/// optical center (red) marked.
fn overlay(frame: &Frame<'_>, grid: &Grid, center: Option<[f32; 2]>) -> RgbImage {
    let mut img = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let l = frame.luma(x as i32, y as i32);
        Rgb([l, l, l])
    });
    for (_, _, dot) in grid.iter() {
        if let Some([x, y]) = dot.position() {
            draw_cross_mut(&mut img, Rgb([0, 220, 0]), x.round() as i32, y.round() as i32);
        }
    }
    if let Some([x, y]) = center {
        let (cx, cy) = (x.round() as i32, y.round() as i32);
        for d in -2..=2 {
            draw_cross_mut(&mut img, Rgb([255, 0, 0]), cx + d, cy);
            draw_cross_mut(&mut img, Rgb([255, 0, 0]), cx, cy + d);
        }
    }
    img
}

// ── measure ────────────────────────────────────────────────────────────

fn run_measure(args: &MeasureArgs) -> CliResult<()> {
    let lensmeter = load_lensmeter(&args.frame)?;
    let (w, h) = (args.frame.width, args.frame.height);

    tracing::info!("Loading frames: {} / {}", args.zero.display(), args.sample.display());
    let zero_buf = read_frame_bytes(&args.zero, &args.frame)?;
    let sample_buf = read_frame_bytes(&args.sample, &args.frame)?;
    let zero = Frame::new(&zero_buf, w, h)?;
    let sample = Frame::new(&sample_buf, w, h)?;

    let m = lensmeter.measure(&zero, &sample)?;
    let r = &m.refraction;
    tracing::info!(
        "{:?}: sphere {:+.2} cylinder {:+.2} axis {:.0}",
        m.status,
        r.sphere,
        r.cylinder,
        r.axis
    );

    let json = serde_json::to_string_pretty(&m)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Measurement written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if let Some(path) = &args.mask {
        lensmeter.chroma_mask(&sample).save(path)?;
        tracing::info!("Chroma mask written to {}", path.display());
    }

    if let Some(path) = &args.overlay {
        let seed = lensmeter
            .locate_seed(&sample)
            .ok_or_else(|| -> CliError { "no seed dot in the sample frame".into() })?;
        let grid = lensmeter.track(&sample, seed, &[])?;
        overlay(&sample, &grid, m.optical_center).save(path)?;
        tracing::info!("Overlay written to {}", path.display());
    }

    Ok(())
}

// ── track ──────────────────────────────────────────────────────────────

fn run_track(args: &TrackArgs) -> CliResult<()> {
    let lensmeter = load_lensmeter(&args.frame)?;
    tracing::info!("Loading frame: {}", args.image.display());
    let buf = read_frame_bytes(&args.image, &args.frame)?;
    let frame = Frame::new(&buf, args.frame.width, args.frame.height)?;

    let seed = lensmeter
        .locate_seed(&frame)
        .ok_or_else(|| -> CliError { "no seed dot near the frame center".into() })?;
    let grid = lensmeter.track(&frame, seed, &[])?;
    tracing::info!(
        "Tracked {}/{} dots from seed ({:.1}, {:.1})",
        grid.valid_count(),
        grid.rows() * grid.cols(),
        seed[0],
        seed[1]
    );

    std::fs::write(&args.out, serde_json::to_string_pretty(&grid)?)?;
    tracing::info!("Grid written to {}", args.out.display());

    if let Some(path) = &args.overlay {
        overlay(&frame, &grid, None).save(path)?;
        tracing::info!("Overlay written to {}", path.display());
    }

    Ok(())
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config(out: Option<&Path>) -> CliResult<()> {
    let json = LensmeterConfig::default().to_json()?;
    match out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Default config written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
