use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use nalgebra::DVector;
use tracing::{error, info, warn, Level};

use vebench::analytical::Benchmark;
use vebench::config::SweepConfig;
use vebench::datatypes::TimeUnit;
use vebench::error::{Result, VeBenchError};
use vebench::generator::{self, CommandSubmitter, DryRunSubmitter, GenerateOptions, Submitter};
use vebench::post_processor::{self, ErrorRecord, ProfileErrorRecord};
use vebench::statistics::StatisticsTable;
use vebench::topography;

#[derive(Parser)]
#[command(name = "vebench", version, about = "Viscoelastic benchmark sweeps and analytical comparisons")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render and submit every run of a sweep
    Generate {
        /// Sweep config (JSON)
        config: PathBuf,

        /// Directory for the rendered files [default: current directory]
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Write files but create no output directories and submit nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Evaluate an analytical solution on a uniform time grid
    Evaluate {
        #[arg(value_enum)]
        benchmark: Benchmark,

        #[arg(long)]
        start: f64,

        #[arg(long)]
        end: f64,

        #[arg(long, default_value_t = 101)]
        samples: usize,

        /// Unit of start and end [default: the benchmark's output unit]
        #[arg(long, value_enum)]
        unit: Option<TimeUnit>,

        /// Horizontal position for surface benchmarks
        #[arg(long, default_value_t = 0.5)]
        x: f64,

        /// CSV file to write instead of printing
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare statistics files or topography profiles with an analytical solution
    Compare {
        #[arg(value_enum)]
        benchmark: Benchmark,

        /// Name or unique fragment of the compared column
        #[arg(long, required_unless_present = "topography_step")]
        column: Option<String>,

        /// Compare the profile in topography.NNNNN instead of a statistics column
        #[arg(long, conflicts_with_all = ["column", "at"], requires = "time")]
        topography_step: Option<u32>,

        /// Model time of the topography step
        #[arg(long)]
        time: Option<f64>,

        /// Reference height removed from the topography elevations
        #[arg(long, default_value_t = 1.0)]
        height: f64,

        /// Name or unique fragment of the time column [default: per benchmark]
        #[arg(long)]
        time_column: Option<String>,

        /// Unit of the time column [default: the benchmark's output unit]
        #[arg(long, value_enum)]
        unit: Option<TimeUnit>,

        /// Horizontal position for surface benchmarks
        #[arg(long, default_value_t = 0.5)]
        x: f64,

        /// Only compare the samples at these times
        #[arg(long = "at")]
        at: Vec<f64>,

        /// CSV file to write instead of printing
        #[arg(long)]
        output: Option<PathBuf>,

        /// Statistics files or run output directories (directories only for topography)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns true when every run was generated and submitted
fn generate(config: &Path, work_dir: Option<PathBuf>, dry_run: bool, quiet: bool) -> Result<bool> {
    let config = SweepConfig::load(config)?;
    let cwd = std::env::current_dir()?;
    let work_dir = match work_dir {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    let options = GenerateOptions {
        work_dir,
        create_directories: !dry_run,
        show_progress: !quiet,
    };

    let mut submitter: Box<dyn Submitter> = if dry_run {
        Box::new(DryRunSubmitter {
            command: config.scheduler.submit_command.clone(),
        })
    } else {
        Box::new(CommandSubmitter {
            command: config.scheduler.submit_command.clone(),
        })
    };

    let report = generator::generate(&config, &options, submitter.as_mut())?;
    for failure in &report.failed {
        error!(run = %failure.name, "{}", failure.error);
    }
    info!(
        "{} runs submitted, {} failed, {} output directories created",
        report.submitted.len(),
        report.failed.len(),
        report.created_directories.len()
    );

    Ok(report.is_success())
}

fn linspace(start: f64, end: f64, samples: usize) -> DVector<f64> {
    if samples < 2 {
        return DVector::from_element(samples, start);
    }
    let step = (end - start) / (samples - 1) as f64;
    DVector::from_fn(samples, |i, _| start + step * i as f64)
}

fn evaluate(
    benchmark: Benchmark,
    start: f64,
    end: f64,
    samples: usize,
    unit: TimeUnit,
    x: f64,
    output: Option<PathBuf>,
) -> Result<()> {
    if end < start {
        return Err(VeBenchError::Input(format!(
            "end time {end} lies before start time {start}"
        )));
    }

    let reference = benchmark.reference(x);
    let times = linspace(start, end, samples);
    let values = times.map(|t| reference(unit.to_seconds(t)));

    match output {
        Some(path) => post_processor::write_evaluation(&times, &values, &path)?,
        None => {
            println!("time,value");
            for (t, v) in times.iter().zip(values.iter()) {
                println!("{t},{v}");
            }
        }
    }
    Ok(())
}

/// Statistics file and run name for a compare input
fn statistics_input(input: &Path) -> (PathBuf, String) {
    let (path, run_dir) = if input.is_dir() {
        (input.join("statistics"), input)
    } else {
        (input.to_path_buf(), input.parent().unwrap_or(input))
    };
    let run = match run_dir.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => input.display().to_string(),
    };
    (path, run)
}

/// Returns true when every input was loaded and every requested time found
#[allow(clippy::too_many_arguments)]
fn compare(
    benchmark: Benchmark,
    column: &str,
    time_column: Option<String>,
    unit: TimeUnit,
    x: f64,
    at: &[f64],
    output: Option<PathBuf>,
    inputs: &[PathBuf],
) -> Result<bool> {
    let reference = benchmark.reference(x);
    let time_column = time_column.unwrap_or_else(|| benchmark.time_column().to_string());

    let mut records: Vec<ErrorRecord> = Vec::new();
    let mut complete = true;

    for input in inputs {
        let (path, run) = statistics_input(input);
        let series = match StatisticsTable::read(&path)
            .and_then(|table| table.series(&time_column, column, unit))
        {
            Ok(s) => s,
            Err(err) => {
                error!(run = %run, "{err}");
                complete = false;
                continue;
            }
        };

        let run_records = if at.is_empty() {
            post_processor::compare_series(&run, &series, &reference)
        } else {
            let mut found: Vec<ErrorRecord> = Vec::with_capacity(at.len());
            for t in at {
                match post_processor::compare_at(&run, &series, *t, &reference) {
                    Ok(record) => found.push(record),
                    Err(err) => {
                        warn!(run = %run, "{err}");
                        complete = false;
                    }
                }
            }
            found
        };

        match post_processor::max_abs_error(&run_records) {
            Some(max) => info!(run = %run, samples = run_records.len(), "max |error| = {max:.6} %"),
            None => info!(run = %run, samples = run_records.len(), "no defined errors"),
        }
        records.extend(run_records);
    }

    match output {
        Some(path) => post_processor::write_error_records(&records, &path)?,
        None => {
            println!("run,time,simulated,analytical,error_percent");
            for r in &records {
                let error = r.error_percent.map(|e| e.to_string()).unwrap_or_default();
                println!("{},{},{},{},{}", r.run, r.time, r.simulated, r.analytical, error);
            }
        }
    }

    Ok(complete)
}

/// Returns true when every input's profile was read and compared
fn compare_topography(
    benchmark: Benchmark,
    step: u32,
    time: f64,
    height: f64,
    output: Option<PathBuf>,
    inputs: &[PathBuf],
) -> Result<bool> {
    if !benchmark.is_surface() {
        return Err(VeBenchError::Input(format!(
            "{benchmark:?} has no surface profile to compare a topography with"
        )));
    }

    let mut records: Vec<ProfileErrorRecord> = Vec::new();
    let mut complete = true;

    for input in inputs {
        let run = match input.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => input.display().to_string(),
        };
        let run_records = topography::read_topography(input, step).and_then(|profile| {
            let analytical = benchmark.profile(&profile.x, time).ok_or_else(|| {
                VeBenchError::Input(format!("{benchmark:?} has no surface profile"))
            })?;
            post_processor::compare_profile(&run, &profile, height, &analytical)
        });
        let run_records = match run_records {
            Ok(r) => r,
            Err(err) => {
                error!(run = %run, "{err}");
                complete = false;
                continue;
            }
        };

        match post_processor::max_abs_profile_error(&run_records) {
            Some(max) => info!(run = %run, points = run_records.len(), "max |error| = {max:.6} %"),
            None => info!(run = %run, points = run_records.len(), "no defined errors"),
        }
        records.extend(run_records);
    }

    match output {
        Some(path) => post_processor::write_profile_records(&records, &path)?,
        None => {
            println!("run,step,x,simulated,analytical,error_percent");
            for r in &records {
                let error = r.error_percent.map(|e| e.to_string()).unwrap_or_default();
                println!("{},{},{},{},{},{}", r.run, r.step, r.x, r.simulated, r.analytical, error);
            }
        }
    }

    Ok(complete)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let outcome = match cli.command {
        Command::Generate {
            config,
            work_dir,
            dry_run,
        } => generate(&config, work_dir, dry_run, cli.quiet),
        Command::Evaluate {
            benchmark,
            start,
            end,
            samples,
            unit,
            x,
            output,
        } => evaluate(
            benchmark,
            start,
            end,
            samples,
            unit.unwrap_or_else(|| benchmark.time_unit()),
            x,
            output,
        )
        .map(|_| true),
        Command::Compare {
            benchmark,
            column,
            topography_step,
            time,
            height,
            time_column,
            unit,
            x,
            at,
            output,
            inputs,
        } => {
            let unit = unit.unwrap_or_else(|| benchmark.time_unit());
            match (topography_step, column) {
                (Some(step), _) => compare_topography(
                    benchmark,
                    step,
                    unit.to_seconds(time.unwrap_or(0.)),
                    height,
                    output,
                    &inputs,
                ),
                (None, Some(column)) => {
                    compare(benchmark, &column, time_column, unit, x, &at, output, &inputs)
                }
                (None, None) => Err(VeBenchError::Input(
                    "compare needs --column or --topography-step".to_string(),
                )),
            }
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
