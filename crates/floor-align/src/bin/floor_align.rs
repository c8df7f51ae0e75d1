//! floor-align CLI: inspect and edit a floor's room alignment file.

use clap::{Args, Parser, Subcommand, ValueEnum};
use floor_align::{edit, AdjustCommand, AdjusterParams, RigidTransform};
use nalgebra::{Point3, Vector3};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "floor-align")]
#[command(about = "Inspect and edit room-to-floor rigid alignments (<floor>.json)")]
#[command(version)]
struct Cli {
    /// Log progress to stderr (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every room's translation and heading.
    Show {
        /// Alignment file of the floor.
        file: PathBuf,

        /// Print a JSON summary instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Replace one room's alignment.
    Set {
        file: PathBuf,
        room: String,

        /// Translation in floor units, `x,y,z`.
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        translation: [f64; 3],

        /// Heading about +Y in degrees.
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        yaw_deg: f64,
    },

    /// Apply step adjustments to one room and save it.
    Nudge(NudgeArgs),

    /// Rename a room's entry.
    Rename {
        file: PathBuf,
        old: String,
        new: String,
    },

    /// Remove a room's entry.
    Remove { file: PathBuf, room: String },

    /// Map room-local points into the floor frame and print them as JSON.
    Place {
        file: PathBuf,
        room: String,

        /// Room-local point `x,y,z`; repeat for several points.
        #[arg(long = "point", value_parser = parse_vec3, allow_hyphen_values = true, required = true)]
        points: Vec<[f64; 3]>,
    },
}

#[derive(Debug, Clone, Args)]
struct NudgeArgs {
    file: PathBuf,
    room: String,

    /// Adjustments, applied in order.
    #[arg(value_enum, required = true, num_args = 1..)]
    steps: Vec<StepArg>,

    /// Adjuster parameters (JSON); explicit step flags override it.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Translation step in floor units.
    #[arg(long)]
    translation_step: Option<f64>,

    /// Rotation step in degrees.
    #[arg(long)]
    rotation_step_deg: Option<f64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StepArg {
    PlusZ,
    MinusZ,
    PlusX,
    MinusX,
    /// Counter-clockwise seen from above.
    Ccw,
    Cw,
}

impl From<StepArg> for AdjustCommand {
    fn from(value: StepArg) -> Self {
        match value {
            StepArg::PlusZ => AdjustCommand::PlusZ,
            StepArg::MinusZ => AdjustCommand::MinusZ,
            StepArg::PlusX => AdjustCommand::PlusX,
            StepArg::MinusX => AdjustCommand::MinusX,
            StepArg::Ccw => AdjustCommand::RotateCounterClockwise,
            StepArg::Cw => AdjustCommand::RotateClockwise,
        }
    }
}

fn parse_vec3(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z, got {s:?}"));
    };
    let parse = |v: &str| {
        v.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| format!("invalid coordinate {v:?}"))
    };
    Ok([parse(x)?, parse(y)?, parse(z)?])
}

fn init_logging(verbose: bool) {
    #[cfg(feature = "tracing")]
    {
        let _ = verbose;
        floor_align::core::init_tracing(false);
        // No-op when the subscriber already bridged `log`.
        let _ = tracing_log::LogTracer::init();
    }
    #[cfg(not(feature = "tracing"))]
    {
        if std::env::var_os("RUST_LOG").is_some() {
            let _ = env_logger::try_init();
        } else {
            let level = if verbose {
                log::LevelFilter::Info
            } else {
                log::LevelFilter::Warn
            };
            let _ = floor_align::core::init_with_level(level);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!("floor-align").entered();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Show { file, json } => run_show(&file, json),
        Commands::Set {
            file,
            room,
            translation,
            yaw_deg,
        } => run_set(&file, &room, translation, yaw_deg),
        Commands::Nudge(args) => run_nudge(&args),
        Commands::Rename { file, old, new } => {
            edit::rename(&file, &old, &new)?;
            println!("renamed {old} -> {new}");
            Ok(())
        }
        Commands::Remove { file, room } => {
            edit::remove(&file, &room)?;
            println!("removed {room}");
            Ok(())
        }
        Commands::Place { file, room, points } => run_place(&file, &room, &points),
    }
}

// ── show ───────────────────────────────────────────────────────────────

fn run_show(file: &Path, json: bool) -> CliResult<()> {
    let store = edit::show(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&edit::summary_json(&store))?);
        return Ok(());
    }
    if store.is_empty() {
        println!("no rooms aligned in {}", file.display());
        return Ok(());
    }
    println!("{:<24} {:>10} {:>10} {:>10} {:>10}", "room", "x", "y", "z", "yaw_deg");
    for (room, t) in store.iter() {
        let v = t.translation_vector();
        println!(
            "{:<24} {:>10.4} {:>10.4} {:>10.4} {:>10.3}",
            room,
            v.x,
            v.y,
            v.z,
            t.yaw().to_degrees()
        );
    }
    Ok(())
}

// ── set ────────────────────────────────────────────────────────────────

fn run_set(file: &Path, room: &str, translation: [f64; 3], yaw_deg: f64) -> CliResult<()> {
    let t = edit::set_entry(
        file,
        room,
        Vector3::from(translation),
        yaw_deg.to_radians(),
    )?;
    print_placement(room, &t);
    Ok(())
}

// ── nudge ──────────────────────────────────────────────────────────────

fn run_nudge(args: &NudgeArgs) -> CliResult<()> {
    let mut params = match &args.params {
        Some(path) => AdjusterParams::load_json(path)?,
        None => AdjusterParams::default(),
    };
    if let Some(step) = args.translation_step {
        params.translation_step = step;
    }
    if let Some(deg) = args.rotation_step_deg {
        params.rotation_step = deg.to_radians();
    }
    params.validate()?;

    let commands: Vec<AdjustCommand> = args.steps.iter().copied().map(Into::into).collect();
    let t = edit::nudge(&args.file, &args.room, &commands, params)?;
    print_placement(&args.room, &t);
    Ok(())
}

// ── place ──────────────────────────────────────────────────────────────

fn run_place(file: &Path, room: &str, points: &[[f64; 3]]) -> CliResult<()> {
    let points: Vec<Point3<f64>> = points.iter().map(|p| Point3::from(*p)).collect();
    let placed = edit::place(file, room, &points)?;
    println!("{}", serde_json::to_string_pretty(&placed)?);
    Ok(())
}

fn print_placement(room: &str, t: &RigidTransform) {
    let v = t.translation_vector();
    println!(
        "{room}: translation ({:.4}, {:.4}, {:.4}), yaw {:.3} deg",
        v.x,
        v.y,
        v.z,
        t.yaw().to_degrees()
    );
}
