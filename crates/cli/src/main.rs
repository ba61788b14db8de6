use anyhow::{bail, Context, Result};
use beatsort::io::{input_stem, read_shift, sibling_path, write_shift};
use beatsort::prelude::*;
use beatsort::stack::plane;
use beatsort::synth::{travelling_wave, SynthCfg};
use beatsort::tour::tsplib::{write_problem, write_solution};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::Level;

mod logging;
mod preview;
mod provenance;

use provenance::{write_sidecar, Payload};

#[derive(Parser)]
#[command(name = "beatsort")]
#[command(about = "Sort and unshear periodic-motion microscopy stacks")]
#[command(version = beatsort::VERSION)]
struct Cmd {
    #[command(subcommand)]
    action: Action,
}

#[derive(Clone, Copy, Debug, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
enum SolverKind {
    /// External Concorde executable
    Concorde,
    /// In-process Held–Karp (up to 16 frames)
    Exact,
    /// In-process nearest neighbour + 2-opt
    TwoOpt,
}

#[derive(Subcommand)]
enum Action {
    /// Recover the cyclic frame order of an unordered period
    Sort {
        /// Input .npy file or directory of TIFF slices
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        /// Output .npy (default: <input-stem>_sorted.npy beside the input)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Downsizing factor along Y
        #[arg(short = 'y', long = "ydownsizing", default_value_t = 4)]
        ydownsizing: usize,
        /// Downsizing factor along X
        #[arg(short = 'x', long = "xdownsizing", default_value_t = 4)]
        xdownsizing: usize,
        /// Concorde executable
        #[arg(long, default_value = "concorde")]
        concorde: PathBuf,
        #[arg(long, value_enum, default_value_t = SolverKind::Concorde)]
        solver: SolverKind,
        /// Apply an existing solution file instead of solving (same frame count)
        #[arg(long = "tsp-file")]
        tsp_file: Option<PathBuf>,
        /// Prefix of the problem/solution files (default: <input-stem>_tsp_file)
        #[arg(long = "input-tsp")]
        input_tsp: Option<PathBuf>,
        /// Write preview montages of the input, downsized and sorted frames
        #[arg(long)]
        show: bool,
        /// INFO, WARNING or ERROR
        #[arg(long = "logging-level", default_value = "INFO", value_parser = logging::parse_level)]
        logging_level: Level,
    },
    /// Estimate and correct the per-row scan shift of a sorted period
    Unshear {
        /// Sorted .npy file or directory of TIFF slices
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        /// Output .npy (default: <input-stem>_unsheared.npy beside the input)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(short = 'y', long = "ydownsizing", default_value_t = 4)]
        ydownsizing: usize,
        #[arg(short = 'x', long = "xdownsizing", default_value_t = 4)]
        xdownsizing: usize,
        /// Apply the shift stored in this file; skips estimation
        #[arg(long = "input-shift-file")]
        input_shift_file: Option<PathBuf>,
        /// Initial guess for the estimator (frames per downsized row)
        #[arg(long = "shift-init", default_value_t = 5.3, allow_negative_numbers = true)]
        shift_init: f64,
        /// Write preview montages of the input and corrected frames
        #[arg(long)]
        show: bool,
        #[arg(long = "logging-level", default_value = "INFO", value_parser = logging::parse_level)]
        logging_level: Level,
    },
    /// Write a synthetic sheared, shuffled travelling-wave stack
    Synth {
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, default_value_t = 64)]
        rows: usize,
        #[arg(long, default_value_t = 64)]
        cols: usize,
        #[arg(long, default_value_t = 48)]
        frames: usize,
        /// Frames of lag per row
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        shear: f64,
        /// Shuffle frames with this seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Serialize)]
struct SortParams<'a> {
    input: &'a Path,
    output: &'a Path,
    ydownsizing: usize,
    xdownsizing: usize,
    solver: SolverKind,
    concorde: &'a Path,
    tsp_file: Option<&'a Path>,
    problem_file: &'a Path,
    solution_file: &'a Path,
}

#[derive(Serialize)]
struct UnshearParams<'a> {
    input: &'a Path,
    output: &'a Path,
    ydownsizing: usize,
    xdownsizing: usize,
    input_shift_file: Option<&'a Path>,
    shift_init: f64,
}

fn main() {
    let cmd = Cmd::parse();
    let result = match cmd.action {
        Action::Sort {
            input,
            output,
            ydownsizing,
            xdownsizing,
            concorde,
            solver,
            tsp_file,
            input_tsp,
            show,
            logging_level,
        } => logging::init_file(&logging::log_dir(&input), "sorting.log", logging_level)
            .and_then(|_| {
                sort(SortArgs {
                    input: &input,
                    output: output.as_deref(),
                    factors: DownsizeFactors::new(ydownsizing, xdownsizing),
                    concorde: &concorde,
                    solver,
                    tsp_file: tsp_file.as_deref(),
                    input_tsp: input_tsp.as_deref(),
                    show,
                })
            }),
        Action::Unshear {
            input,
            output,
            ydownsizing,
            xdownsizing,
            input_shift_file,
            shift_init,
            show,
            logging_level,
        } => logging::init_file(&logging::log_dir(&input), "unshearing.log", logging_level)
            .and_then(|_| {
                unshear_cmd(
                    &input,
                    output.as_deref(),
                    DownsizeFactors::new(ydownsizing, xdownsizing),
                    input_shift_file.as_deref(),
                    shift_init,
                    show,
                )
            }),
        Action::Synth {
            output,
            rows,
            cols,
            frames,
            shear,
            seed,
        } => {
            logging::init_stderr();
            synth(
                &output,
                SynthCfg {
                    rows,
                    cols,
                    frames,
                    shear,
                    shuffle_seed: seed,
                },
            )
        }
    };
    if let Err(err) = result {
        tracing::error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(-1);
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output dir {}", parent.display()))?;
        }
    }
    Ok(())
}

struct SortArgs<'a> {
    input: &'a Path,
    output: Option<&'a Path>,
    factors: DownsizeFactors,
    concorde: &'a Path,
    solver: SolverKind,
    tsp_file: Option<&'a Path>,
    input_tsp: Option<&'a Path>,
    show: bool,
}

fn sort(args: SortArgs<'_>) -> Result<()> {
    let output = args
        .output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling_path(args.input, "_sorted.npy"));
    let files = match args.input_tsp {
        Some(prefix) => SequencingFiles::from_prefix(prefix),
        None => SequencingFiles::for_input(args.input),
    };
    tracing::info!(input = %args.input.display(), output = %output.display(), "sorting");

    let loaded = load_stack(args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    let dtype = loaded.dtype;
    let shape = StackShape::of(&loaded.stack);
    if args.show {
        preview::write_montage(&loaded.stack, &output, "input")?;
        let reduced = downsize(&plane(&loaded.stack, 0, 0)?, args.factors);
        preview::write_montage(&reduced.stack, &output, "downsized")?;
    }
    let src = MappedStack::from_source(&loaded.stack)?;
    drop(loaded);

    let cfg = SortCfg {
        factors: args.factors,
    };
    let concorde = ConcordeSolver::new(args.concorde, files.clone());
    let exact = ExactSolver::default();
    let two_opt = TwoOptSolver::default();
    let sequencing = match args.tsp_file {
        Some(path) => {
            if !path.exists() {
                bail!("solution file {} does not exist", path.display());
            }
            Sequencing::Reuse(path)
        }
        None => Sequencing::Solve(match args.solver {
            SolverKind::Concorde => &concorde as &dyn TourSolver,
            SolverKind::Exact => &exact,
            SolverKind::TwoOpt => &two_opt,
        }),
    };

    let mut sorted = MappedStack::zeros(shape)?;
    let outcome = sort_into(&src, &mut sorted, &cfg, sequencing)?;

    // In-process backends leave the same audit trail as Concorde.
    if args.tsp_file.is_none() && !matches!(args.solver, SolverKind::Concorde) {
        if let Some(distances) = &outcome.distances {
            write_problem(&files.problem, distances)
                .with_context(|| format!("writing {}", files.problem.display()))?;
        }
        write_solution(&files.solution, &outcome.permutation)
            .with_context(|| format!("writing {}", files.solution.display()))?;
    }

    ensure_parent(&output)?;
    write_npy(&output, &sorted, dtype).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), "saved sorted stack");

    if args.show {
        preview::write_montage(&plane(&sorted, 0, 0)?, &output, "sorted")?;
    }

    let params = SortParams {
        input: args.input,
        output: &output,
        ydownsizing: args.factors.rows,
        xdownsizing: args.factors.cols,
        solver: args.solver,
        concorde: args.concorde,
        tsp_file: args.tsp_file,
        problem_file: &files.problem,
        solution_file: &files.solution,
    };
    let results = json!({
        "backend": outcome.backend,
        "permutation": outcome.permutation.as_slice(),
        "tour_cost": outcome.tour_cost(),
        "effective_downsizing": outcome.factors.map(|f| [f.rows, f.cols]),
        "shape": shape.dims(),
        "dtype": dtype.descr(),
    });
    write_sidecar(
        &output,
        Payload::new("sort", serde_json::to_value(&params)?)
            .with_input(args.input)
            .with_results(results),
    )?;
    tracing::info!("Done.");
    Ok(())
}

fn unshear_cmd(
    input: &Path,
    output: Option<&Path>,
    factors: DownsizeFactors,
    input_shift_file: Option<&Path>,
    shift_init: f64,
    show: bool,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling_path(input, "_unsheared.npy"));
    tracing::info!(input = %input.display(), output = %output.display(), "scanning aberration correction");

    let shift = match input_shift_file {
        Some(path) => ShiftSource::Fixed(
            read_shift(path).with_context(|| format!("reading shift file {}", path.display()))?,
        ),
        None => ShiftSource::Estimate {
            initial: shift_init,
        },
    };

    let loaded = load_stack(input).with_context(|| format!("loading {}", input.display()))?;
    let shape = StackShape::of(&loaded.stack);
    if show {
        preview::write_montage(&loaded.stack, &output, "input")?;
    }
    let src = MappedStack::from_source(&loaded.stack)?;
    drop(loaded);

    let cfg = UnshearCfg { factors, shift };
    let mut corrected = MappedStack::zeros(shape)?;
    let outcome = unshear_into(&src, &mut corrected, &cfg, &NelderMead::default())?;

    let shift_file = sibling_path(input, "_shift.txt");
    if outcome.estimate.is_some() {
        write_shift(&shift_file, outcome.shift)
            .with_context(|| format!("writing {}", shift_file.display()))?;
        tracing::info!(path = %shift_file.display(), shift = outcome.shift, "saved shift");
    }

    ensure_parent(&output)?;
    write_npy(&output, &corrected, SampleType::F64)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), "saved corrected stack");

    if show {
        preview::write_montage(&plane(&corrected, 0, 0)?, &output, "unsheared")?;
    }

    let params = UnshearParams {
        input,
        output: &output,
        ydownsizing: factors.rows,
        xdownsizing: factors.cols,
        input_shift_file,
        shift_init,
    };
    let results = json!({
        "shift": outcome.shift,
        "estimated": outcome.estimate.is_some(),
        "reduced_shift": outcome.estimate.map(|e| e.reduced_shift),
        "row_factor": outcome.estimate.map(|e| e.row_factor),
        "objective_initial": outcome.estimate.map(|e| e.initial_value),
        "objective_final": outcome.estimate.map(|e| e.final_value),
        "evaluations": outcome.estimate.map(|e| e.minimum.evaluations),
        "shift_file": outcome.estimate.map(|_| shift_file.to_string_lossy().into_owned()),
        "stages": outcome.stages.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>(),
        "shape": shape.dims(),
    });
    write_sidecar(
        &output,
        Payload::new("unshear", serde_json::to_value(&params)?)
            .with_input(input)
            .with_results(results),
    )?;
    tracing::info!("Done.");
    Ok(())
}

fn synth(output: &Path, cfg: SynthCfg) -> Result<()> {
    tracing::info!(output = %output.display(), ?cfg, "synth");
    if cfg.rows == 0 || cfg.cols == 0 || cfg.frames == 0 {
        bail!("synthetic stack needs non-zero rows, cols and frames");
    }
    let synthetic = travelling_wave(&cfg);
    ensure_parent(output)?;
    write_npy(output, &synthetic.stack, SampleType::F64)
        .with_context(|| format!("writing {}", output.display()))?;
    write_sidecar(
        output,
        Payload::new(
            "synth",
            json!({
                "rows": cfg.rows,
                "cols": cfg.cols,
                "frames": cfg.frames,
                "shear": cfg.shear,
                "seed": cfg.shuffle_seed,
            }),
        )
        .with_results(json!({
            "stem": input_stem(output),
            "shuffle": synthetic.shuffle.as_slice(),
        })),
    )?;
    Ok(())
}
