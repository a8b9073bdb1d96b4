use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Exit status of a check-sanity run whose verdict failed.
const EXIT_SANITY_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "flowtruth", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Unpack flow, back flow, depth and occlusions from a directory of EXR buffers.
    Unpack(UnpackArgs),
    /// Compute occlusions from existing flow and back-flow files.
    Occlusions(OcclusionArgs),
    /// Pack a directory of per-frame files into a frame-indexed zip.
    Pack(PackArgs),
    /// Extract one frame, or all frames, from a packed zip.
    UnpackArchive(UnpackArchiveArgs),
    /// Render depth arrays to grayscale PNGs normalized by the depth range.
    DepthImages(DepthImagesArgs),
    /// Cross-check flow against object IDs and correspondences.
    CheckSanity(CheckSanityArgs),
    /// Run a JSON pipeline configuration.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct ThreadingArgs {
    /// Spread work over a rayon thread pool.
    #[arg(long)]
    parallel: bool,

    /// Worker count for --parallel (defaults to the number of cores).
    #[arg(long)]
    threads: Option<usize>,
}

impl ThreadingArgs {
    fn threading(&self) -> flowtruth::Threading {
        flowtruth::Threading {
            parallel: self.parallel,
            threads: self.threads,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UnitsChoice {
    Pixels,
    Normalized,
}

impl From<UnitsChoice> for flowtruth::MotionUnits {
    fn from(u: UnitsChoice) -> Self {
        match u {
            UnitsChoice::Pixels => Self::Pixels,
            UnitsChoice::Normalized => Self::Normalized,
        }
    }
}

#[derive(Args, Debug)]
struct UnpackArgs {
    /// Directory with one EXR file per frame.
    #[arg(long)]
    input_dir: PathBuf,

    #[arg(long)]
    flow_odir: Option<PathBuf>,

    #[arg(long)]
    back_flow_odir: Option<PathBuf>,

    /// Output directory for raw depth arrays.
    #[arg(long)]
    depth_odir: Option<PathBuf>,

    #[arg(long)]
    occlusions_odir: Option<PathBuf>,

    /// Only written together with --flow-odir.
    #[arg(long)]
    flow_zip: Option<PathBuf>,

    /// Only written together with --back-flow-odir.
    #[arg(long)]
    back_flow_zip: Option<PathBuf>,

    /// Only written together with --depth-odir.
    #[arg(long)]
    depth_zip: Option<PathBuf>,

    /// Output file for the sequence-wide depth range.
    #[arg(long)]
    depth_range_ofile: Option<PathBuf>,

    /// Round-trip tolerance in pixels.
    #[arg(long, default_value_t = flowtruth::DEFAULT_OCCLUSION_THRESHOLD_PX)]
    occlusion_threshold: f32,

    /// Unit of the raw motion vectors.
    #[arg(long, value_enum, default_value_t = UnitsChoice::Pixels)]
    units: UnitsChoice,

    #[command(flatten)]
    threading: ThreadingArgs,
}

#[derive(Args, Debug)]
struct OcclusionArgs {
    /// Glob of forward flow files, e.g. 'flow/*.flo'.
    #[arg(long)]
    flow_pattern: String,

    /// Glob of back flow files.
    #[arg(long)]
    backflow_pattern: String,

    #[arg(long)]
    odir: PathBuf,

    /// Comma-separated frame numbers to restrict to.
    #[arg(long, value_delimiter = ',')]
    frames: Option<Vec<u32>>,

    #[arg(long, default_value_t = flowtruth::DEFAULT_OCCLUSION_THRESHOLD_PX)]
    threshold: f32,

    #[command(flatten)]
    threading: ThreadingArgs,
}

#[derive(Args, Debug)]
struct PackArgs {
    #[arg(long)]
    input_dir: PathBuf,

    /// Extension of the per-frame files to pack (flo, array, png).
    #[arg(long)]
    ext: String,

    #[arg(long)]
    archive: PathBuf,
}

#[derive(Args, Debug)]
struct UnpackArchiveArgs {
    #[arg(long)]
    archive: PathBuf,

    #[arg(long)]
    out_dir: PathBuf,

    /// Extract only this frame.
    #[arg(long)]
    frame: Option<u32>,
}

#[derive(Args, Debug)]
struct DepthImagesArgs {
    #[arg(long)]
    array_dir: PathBuf,

    #[arg(long)]
    range_file: PathBuf,

    #[arg(long)]
    odir: PathBuf,
}

#[derive(Args, Debug)]
struct CheckSanityArgs {
    #[arg(long)]
    flow_pattern: String,

    #[arg(long)]
    objectid_pattern: String,

    #[arg(long)]
    corresp_pattern: String,

    #[arg(long)]
    occlusion_pattern: String,

    #[arg(long)]
    alpha_pattern: String,

    /// Write a color-coded verdict image of the first tested frame.
    #[arg(long)]
    debug_output_file: Option<PathBuf>,

    #[arg(long)]
    debug_only_on_failure: bool,

    /// Check only this frame (it also becomes the debug frame).
    #[arg(long)]
    debug_frame: Option<u32>,

    #[arg(long, default_value_t = 0.8)]
    min_sanity: f64,

    /// Fail when any frame has a larger fraction of occluded samples.
    #[arg(long)]
    max_occlusion_frac: Option<f64>,

    /// Frames to test; 0 tests every frame.
    #[arg(long, default_value_t = 20)]
    nframes: usize,

    /// Pixels sampled per frame.
    #[arg(long, default_value_t = 1000)]
    npixels: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Per-channel tolerance when comparing packed 8-bit object-ID colors.
    #[arg(long, default_value_t = 0)]
    id_tolerance: u8,

    /// Pixels a destination may fall outside the frame and still be compared; use the
    /// occlusion threshold the masks were made with.
    #[arg(long, default_value_t = flowtruth::DEFAULT_OCCLUSION_THRESHOLD_PX)]
    border_margin: f32,

    /// Pick frames at random (seeded) instead of evenly spaced.
    #[arg(long)]
    random_frames: bool,

    #[command(flatten)]
    threading: ThreadingArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Pipeline configuration JSON.
    #[arg(long)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Unpack(args) => cmd_unpack(args),
        Command::Occlusions(args) => cmd_occlusions(args),
        Command::Pack(args) => cmd_pack(args),
        Command::UnpackArchive(args) => cmd_unpack_archive(args),
        Command::DepthImages(args) => cmd_depth_images(args),
        Command::CheckSanity(args) => cmd_check_sanity(args),
        Command::Run(args) => cmd_run(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_unpack(args: UnpackArgs) -> anyhow::Result<ExitCode> {
    let config = flowtruth::UnpackConfig {
        input_dir: args.input_dir,
        flow_odir: args.flow_odir,
        back_flow_odir: args.back_flow_odir,
        depth_odir: args.depth_odir,
        occlusions_odir: args.occlusions_odir,
        depth_range_ofile: args.depth_range_ofile,
        flow_zip: args.flow_zip,
        back_flow_zip: args.back_flow_zip,
        depth_zip: args.depth_zip,
        resolution: None,
        units: args.units.into(),
        occlusion: flowtruth::OcclusionParams {
            threshold_px: args.occlusion_threshold,
        },
        threading: args.threading.threading(),
    };
    let input = config.input_dir.clone();
    let summary = flowtruth::unpack_sequence(config)
        .with_context(|| format!("unpack '{}'", input.display()))?;
    eprintln!(
        "unpacked {} frames: {} flows, {} back flows, {} depth arrays, {} occlusion masks",
        summary.frames, summary.flows, summary.back_flows, summary.depths, summary.occlusions
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_occlusions(args: OcclusionArgs) -> anyhow::Result<ExitCode> {
    let batch = flowtruth::OcclusionBatch {
        flow_pattern: args.flow_pattern,
        backflow_pattern: args.backflow_pattern,
        odir: args.odir,
        frames: args
            .frames
            .map(|fs| fs.into_iter().map(flowtruth::FrameIndex).collect()),
        params: flowtruth::OcclusionParams {
            threshold_px: args.threshold,
        },
        threading: args.threading.threading(),
    };
    let written = flowtruth::compute_occlusion_sequence(&batch)?;
    eprintln!("wrote {} occlusion masks to {}", written.len(), batch.odir.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_pack(args: PackArgs) -> anyhow::Result<ExitCode> {
    let summary = flowtruth::pack_dir(&args.input_dir, &args.ext, &args.archive)
        .with_context(|| format!("pack '{}'", args.input_dir.display()))?;
    eprintln!(
        "wrote {} ({} frames from {})",
        args.archive.display(),
        summary.count,
        summary.name.format(summary.first)
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_unpack_archive(args: UnpackArchiveArgs) -> anyhow::Result<ExitCode> {
    let frame = args.frame.map(flowtruth::FrameIndex);
    let written = flowtruth::unpack_archive(&args.archive, &args.out_dir, frame)
        .with_context(|| format!("unpack archive '{}'", args.archive.display()))?;
    for path in &written {
        eprintln!("wrote {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_depth_images(args: DepthImagesArgs) -> anyhow::Result<ExitCode> {
    let written = flowtruth::render_depth_images(&args.array_dir, &args.range_file, &args.odir)?;
    eprintln!("wrote {} depth images to {}", written.len(), args.odir.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_check_sanity(args: CheckSanityArgs) -> anyhow::Result<ExitCode> {
    let patterns = flowtruth::SanityPatterns {
        flow: args.flow_pattern,
        objectid: args.objectid_pattern,
        corresp: args.corresp_pattern,
        occlusion: args.occlusion_pattern,
        alpha: args.alpha_pattern,
    };
    let config = flowtruth::SanityConfig {
        npixels: args.npixels,
        nframes: (args.nframes > 0).then_some(args.nframes),
        min_sanity: args.min_sanity,
        max_occlusion_frac: args.max_occlusion_frac,
        selection: if args.random_frames {
            flowtruth::FrameSelection::Random
        } else {
            flowtruth::FrameSelection::EvenlySpaced
        },
        seed: args.seed,
        id_tolerance: args.id_tolerance,
        border_margin_px: args.border_margin,
        debug_frame: args.debug_frame.map(flowtruth::FrameIndex),
        debug_output: args.debug_output_file,
        debug_only_on_failure: args.debug_only_on_failure,
        threading: args.threading.threading(),
        ..flowtruth::SanityConfig::default()
    };
    let report = flowtruth::run_sanity_check(&patterns, &config)?;
    if let Some(path) = &report.debug_image {
        eprintln!("wrote {}", path.display());
    }
    println!("{}", report.summary_line());
    Ok(sanity_exit(report.passed))
}

fn cmd_run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = flowtruth::PipelineConfig::load(&args.config)?;
    let outcomes = config
        .run()
        .with_context(|| format!("run pipeline '{}'", args.config.display()))?;
    for outcome in &outcomes {
        match &outcome.result {
            flowtruth::StageResult::Sanity(report) => {
                println!("{}: {}", outcome.name, report.summary_line());
            }
            _ => println!("{}: done", outcome.name),
        }
    }
    Ok(sanity_exit(outcomes.iter().all(flowtruth::StageOutcome::passed)))
}

fn sanity_exit(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_SANITY_FAILURE)
    }
}
