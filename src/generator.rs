//! Run matrix generation: one parameter file, one job script and one output
//! directory per combination of axis values, each submitted to the scheduler.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{debug, error, info, warn};

use crate::config::{Axes, SweepConfig};
use crate::datatypes::{ParticleMode, RunSpec};
use crate::error::{Result, VeBenchError};
use crate::jobscript::JobScript;
use crate::parameters::ParameterFile;

/// Parameter file and job script materialized for one run
#[derive(Debug, Clone)]
pub struct RenderedJob {
    pub spec: RunSpec,
    pub label: String,
    /// `base_label` followed by the label; names the job and the output directory
    pub name: String,
    pub parameter_file: String,
    pub job_script: String,
    pub parameter_path: PathBuf,
    pub job_path: PathBuf,
    pub output_dir: PathBuf,
}

/// Hands a job script to a batch scheduler
///
/// `job_script` is relative to `work_dir` when it lies inside it.
pub trait Submitter {
    fn submit(&mut self, job_script: &Path, work_dir: &Path) -> Result<()>;
}

/// Runs the scheduler's submit command (e.g. `sbatch`) in the work directory
pub struct CommandSubmitter {
    pub command: String,
}

impl Submitter for CommandSubmitter {
    fn submit(&mut self, job_script: &Path, work_dir: &Path) -> Result<()> {
        let mut words = self.command.split_whitespace();
        let program = match words.next() {
            Some(p) => p,
            None => return Err(VeBenchError::Submit("empty submit command".to_string())),
        };

        debug!(command = %self.command, job = %job_script.display(), "submitting");
        let output = match std::process::Command::new(program)
            .args(words)
            .arg(job_script)
            .current_dir(work_dir)
            .output()
        {
            Ok(out) => out,
            Err(err) => {
                return Err(VeBenchError::Submit(format!(
                    "failed to run {program}: {err}"
                )));
            }
        };

        if !output.status.success() {
            return Err(VeBenchError::Submit(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim());
        }

        Ok(())
    }
}

/// Logs what would be submitted
pub struct DryRunSubmitter {
    pub command: String,
}

impl Submitter for DryRunSubmitter {
    fn submit(&mut self, job_script: &Path, _work_dir: &Path) -> Result<()> {
        info!("dry run: {} {}", self.command, job_script.display());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory receiving the rendered files; the submit command runs here
    pub work_dir: PathBuf,
    /// Create output directories before submitting
    pub create_directories: bool,
    pub show_progress: bool,
}

#[derive(Debug)]
pub struct RunFailure {
    pub name: String,
    pub error: VeBenchError,
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    pub submitted: Vec<RenderedJob>,
    pub failed: Vec<RunFailure>,
    pub created_directories: Vec<PathBuf>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Number of runs `run_matrix` produces for the given axes
pub fn matrix_size(axes: &Axes) -> usize {
    let repeats = axes.repeats.len().max(1);
    let per_timestep_pair: usize = axes
        .particles
        .iter()
        .map(|p| match p {
            ParticleMode::Fields => 1,
            ParticleMode::Particles(_) => axes.interpolator.len().max(1),
        })
        .sum();

    axes.refinement.len()
        * axes.elastic_timestep.len()
        * axes.timestep.len()
        * per_timestep_pair
        * repeats
}

/// Expands the axes into their Cartesian product
///
/// Field runs do not use an interpolator, so the interpolator axis only
/// multiplies particle runs.
///
/// # Arguments
/// * `axes` - The configured axis values
///
/// # Returns
/// One RunSpec per combination, refinement varying slowest
pub fn run_matrix(axes: &Axes) -> Vec<RunSpec> {
    let repeats: Vec<Option<u32>> = if axes.repeats.is_empty() {
        vec![None]
    } else {
        axes.repeats.iter().map(|r| Some(*r)).collect()
    };

    let mut specs: Vec<RunSpec> = Vec::with_capacity(matrix_size(axes));

    for &refinement in &axes.refinement {
        for &particles in &axes.particles {
            let interpolators: Vec<Option<String>> = match particles {
                ParticleMode::Particles(_) if !axes.interpolator.is_empty() => {
                    axes.interpolator.iter().cloned().map(Some).collect()
                }
                _ => vec![None],
            };

            for &elastic_timestep in &axes.elastic_timestep {
                for &timestep in &axes.timestep {
                    for interpolator in &interpolators {
                        for repeat in &repeats {
                            specs.push(RunSpec {
                                refinement,
                                timestep,
                                elastic_timestep,
                                particles,
                                interpolator: interpolator.clone(),
                                repeat: *repeat,
                            });
                        }
                    }
                }
            }
        }
    }

    specs
}

/// Rejects run matrices in which two runs would share an output directory
pub fn check_unique_labels(specs: &[RunSpec], tag: Option<&str>) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::with_capacity(specs.len());
    for spec in specs {
        let label = spec.label(tag);
        if !seen.insert(label.clone()) {
            return Err(VeBenchError::DuplicateRun(label));
        }
    }
    Ok(())
}

fn set_if(prm: &mut ParameterFile, selector: &Option<String>, value: impl ToString) -> Result<()> {
    match selector {
        Some(selector) => prm.set(selector, value.to_string()),
        None => Ok(()),
    }
}

/// Applies the run's values to a parameter-file template
fn render_parameters(
    config: &SweepConfig,
    spec: &RunSpec,
    output_dir: &Path,
    prm: &mut ParameterFile,
) -> Result<()> {
    let keys = &config.keys;

    set_if(prm, &keys.output_directory, output_dir.display())?;
    set_if(prm, &keys.refinement, spec.refinement)?;
    set_if(prm, &keys.timestep, spec.timestep)?;
    set_if(prm, &keys.elastic_timestep, spec.elastic_timestep)?;
    set_if(
        prm,
        &keys.use_fixed_elastic_timestep,
        spec.uses_fixed_elastic_timestep(),
    )?;

    if let ParticleMode::Particles(n) = spec.particles {
        set_if(prm, &keys.particles_per_direction, n)?;
        set_if(prm, &keys.min_particles, n * n)?;
        set_if(prm, &keys.max_particles, n * n)?;
        if let Some(interpolator) = &spec.interpolator {
            set_if(prm, &keys.interpolator, interpolator.replace('_', " "))?;
        }
    }

    if let Some(rule) = &config.initial_stress {
        let correction = rule.resolve(spec)?;
        let current = prm.get(&rule.key)?.to_string();
        if let Some(expression) = rule.render(&current, &correction)? {
            prm.set(&rule.key, expression)?;
        }
    }

    Ok(())
}

/// Applies the run's name, resources and solver command to a job-script template
fn render_job_script(
    config: &SweepConfig,
    spec: &RunSpec,
    name: &str,
    parameter_file_name: &str,
    output_dir: &Path,
    job: &mut JobScript,
) -> Result<()> {
    job.set_directive(&config.scheduler.job_name_flag, name);

    for resource in config
        .scheduler
        .resources
        .iter()
        .filter(|r| r.refinement == spec.refinement)
    {
        for (flag, value) in &resource.directives {
            job.set_directive(flag, value);
        }
    }

    let solver = &config.solver;
    let trigger = match solver.launcher.split_whitespace().next() {
        Some(t) => t,
        None => {
            return Err(VeBenchError::Generator(
                "solver launcher has no command word to locate in the job script".to_string(),
            ))
        }
    };
    let command = format!(
        "{} {} {} > {}",
        solver.launcher,
        solver.executable,
        parameter_file_name,
        output_dir.join(&solver.log_file).display()
    );
    job.replace_command(trigger, &command)
}

/// Renders both artifacts for one run, reading the templates afresh
///
/// # Arguments
/// * `config` - The sweep config
/// * `spec` - The run to render
/// * `work_dir` - The directory the rendered files will be written to
///
/// # Returns
/// The rendered job; nothing is written to disk
pub fn render(config: &SweepConfig, spec: &RunSpec, work_dir: &Path) -> Result<RenderedJob> {
    let label = spec.label(config.label_tag.as_deref());
    let name = format!("{}{}", config.base_label, label);
    let output_dir = config.output_root.join(&name);
    let parameter_file_name = format!("{}_{}.prm", config.benchmark, label);
    let job_file_name = format!("jobscript_{label}");

    let mut prm = ParameterFile::read(&config.parameter_template)?;
    render_parameters(config, spec, &output_dir, &mut prm)?;

    let mut job = JobScript::read(&config.job_template, &config.scheduler.directive_prefix)?;
    render_job_script(
        config,
        spec,
        &name,
        &parameter_file_name,
        &output_dir,
        &mut job,
    )?;

    Ok(RenderedJob {
        spec: spec.clone(),
        label,
        name,
        parameter_file: prm.to_string(),
        job_script: job.to_string(),
        parameter_path: work_dir.join(parameter_file_name),
        job_path: work_dir.join(job_file_name),
        output_dir,
    })
}

/// Writes a rendered job, creates its output directory and submits it
///
/// # Arguments
/// * `job` - The rendered job
/// * `options` - Work directory and directory-creation switch
/// * `submitter` - The scheduler front end
/// * `created` - Directories created so far in this generation
fn materialize(
    job: &RenderedJob,
    options: &GenerateOptions,
    submitter: &mut dyn Submitter,
    created: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    std::fs::write(&job.parameter_path, &job.parameter_file)?;
    std::fs::write(&job.job_path, &job.job_script)?;

    if options.create_directories {
        if !job.output_dir.exists() {
            std::fs::create_dir_all(&job.output_dir)?;
            created.insert(job.output_dir.clone());
        } else {
            debug!(dir = %job.output_dir.display(), "output directory already exists");
        }
    }

    let script = job
        .job_path
        .strip_prefix(&options.work_dir)
        .unwrap_or(&job.job_path);
    submitter.submit(script, &options.work_dir)?;
    info!("model output in {}", job.output_dir.display());
    Ok(())
}

/// Generates and submits every run of a sweep
///
/// All runs are rendered before anything is written, so an error that aborts
/// the generation leaves no partial sweep behind. Other failures are confined
/// to their run and recorded in the report.
///
/// # Arguments
/// * `config` - The sweep config
/// * `options` - Generation options
/// * `submitter` - The scheduler front end
///
/// # Returns
/// A report of submitted and failed runs
pub fn generate(
    config: &SweepConfig,
    options: &GenerateOptions,
    submitter: &mut dyn Submitter,
) -> Result<GenerationReport> {
    let specs = run_matrix(&config.axes);
    if specs.is_empty() {
        return Err(VeBenchError::Generator("run matrix is empty".to_string()));
    }
    check_unique_labels(&specs, config.label_tag.as_deref())?;
    info!(runs = specs.len(), "expanded run matrix");

    let mut report = GenerationReport::default();
    let mut rendered: Vec<RenderedJob> = Vec::with_capacity(specs.len());

    for spec in &specs {
        match render(config, spec, &options.work_dir) {
            Ok(job) => rendered.push(job),
            Err(err) if err.aborts_generation() => {
                error!("aborting generation: {err}");
                return Err(err);
            }
            Err(err) => {
                let name = format!(
                    "{}{}",
                    config.base_label,
                    spec.label(config.label_tag.as_deref())
                );
                warn!(run = %name, "skipping run: {err}");
                report.failed.push(RunFailure { name, error: err });
            }
        }
    }

    let bar = if options.show_progress {
        ProgressBar::new(rendered.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    let mut created: BTreeSet<PathBuf> = BTreeSet::new();
    for job in rendered {
        match materialize(&job, options, submitter, &mut created) {
            Ok(()) => report.submitted.push(job),
            Err(err) => {
                error!(run = %job.name, "failed: {err}");
                report.failed.push(RunFailure {
                    name: job.name.clone(),
                    error: err,
                });
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    report.created_directories = created.into_iter().collect();
    info!(
        submitted = report.submitted.len(),
        failed = report.failed.len(),
        "generation finished"
    );

    Ok(report)
}
