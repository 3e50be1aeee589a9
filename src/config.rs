//! Sweep configuration, read from a JSON file.

use std::path::{Path, PathBuf};

use json::JsonValue;
use tracing::info;

use crate::datatypes::{ParticleMode, TimeUnit};
use crate::error::{Result, VeBenchError};
use crate::initial_stress::{InitialStressRule, MissPolicy, TableEntry};

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub executable: String,
    /// Command prefix; its first word identifies the command line in the job script
    pub launcher: String,
    pub log_file: String,
}

/// Extra scheduler directives for runs at one refinement level
#[derive(Debug, Clone)]
pub struct ResourceOverride {
    pub refinement: u32,
    pub directives: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub submit_command: String,
    pub directive_prefix: String,
    pub job_name_flag: String,
    pub resources: Vec<ResourceOverride>,
}

#[derive(Debug, Clone)]
pub struct Axes {
    pub refinement: Vec<u32>,
    pub timestep: Vec<f64>,
    pub elastic_timestep: Vec<f64>,
    pub particles: Vec<ParticleMode>,
    pub interpolator: Vec<String>,
    pub repeats: Vec<u32>,
}

/// Parameter selectors used by each rendering rule; `None` disables the rule
#[derive(Debug, Clone)]
pub struct ParameterKeys {
    pub output_directory: Option<String>,
    pub refinement: Option<String>,
    pub timestep: Option<String>,
    pub elastic_timestep: Option<String>,
    pub use_fixed_elastic_timestep: Option<String>,
    pub particles_per_direction: Option<String>,
    pub min_particles: Option<String>,
    pub max_particles: Option<String>,
    pub interpolator: Option<String>,
}

impl Default for ParameterKeys {
    fn default() -> Self {
        ParameterKeys {
            output_directory: Some("Output directory".to_string()),
            refinement: Some("Initial global refinement".to_string()),
            timestep: Some("Maximum time step".to_string()),
            elastic_timestep: Some("Fixed elastic time step".to_string()),
            use_fixed_elastic_timestep: Some("Use fixed elastic time step".to_string()),
            particles_per_direction: Some(
                "Number of particles per cell per direction".to_string(),
            ),
            min_particles: Some("Minimum particles per cell".to_string()),
            max_particles: Some("Maximum particles per cell".to_string()),
            interpolator: Some("Interpolation scheme".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub benchmark: String,
    pub base_label: String,
    pub label_tag: Option<String>,
    pub output_root: PathBuf,
    pub parameter_template: PathBuf,
    pub job_template: PathBuf,
    pub solver: SolverConfig,
    pub scheduler: SchedulerConfig,
    pub axes: Axes,
    pub keys: ParameterKeys,
    pub initial_stress: Option<InitialStressRule>,
}

fn required_str(value: &JsonValue, field: &str) -> Result<String> {
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None if value.is_null() => Err(VeBenchError::Input(format!(
            "Sweep config missing {field} field"
        ))),
        None => Err(VeBenchError::Input(format!(
            "Sweep config field {field} must be a string"
        ))),
    }
}

fn optional_str(value: &JsonValue, field: &str, default: &str) -> Result<String> {
    if value.is_null() {
        return Ok(default.to_string());
    }
    required_str(value, field)
}

fn required_f64(value: &JsonValue, field: &str) -> Result<f64> {
    match value.as_f64() {
        Some(v) => Ok(v),
        None => Err(VeBenchError::Input(format!(
            "Sweep config field {field} must be a number"
        ))),
    }
}

fn optional_f64(value: &JsonValue, field: &str, default: f64) -> Result<f64> {
    if value.is_null() {
        return Ok(default);
    }
    required_f64(value, field)
}

fn u32_list(value: &JsonValue, field: &str) -> Result<Vec<u32>> {
    if !value.is_array() {
        return Err(VeBenchError::Input(format!(
            "Sweep config field {field} must be a list"
        )));
    }
    value
        .members()
        .map(|m| {
            m.as_u32().ok_or_else(|| {
                VeBenchError::Input(format!("Bad value {m} in {field}, expected an integer"))
            })
        })
        .collect()
}

fn f64_list(value: &JsonValue, field: &str) -> Result<Vec<f64>> {
    if !value.is_array() {
        return Err(VeBenchError::Input(format!(
            "Sweep config field {field} must be a list"
        )));
    }
    value
        .members()
        .map(|m| {
            m.as_f64().ok_or_else(|| {
                VeBenchError::Input(format!("Bad value {m} in {field}, expected a number"))
            })
        })
        .collect()
}

/// Resolves a path from the config relative to the config file's directory
fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Parses the run axes
///
/// # Arguments
/// * `axes` - The `axes` object of the sweep config
///
/// # Returns
/// The axis values, with defaults filled in
fn parse_axes(axes: &JsonValue) -> Result<Axes> {
    if !axes.is_object() {
        return Err(VeBenchError::Input(
            "Sweep config missing axes field".to_string(),
        ));
    }

    let refinement = u32_list(&axes["refinement"], "axes.refinement")?;
    let timestep = f64_list(&axes["timestep"], "axes.timestep")?;
    let elastic_timestep = if axes.has_key("elastic_timestep") {
        f64_list(&axes["elastic_timestep"], "axes.elastic_timestep")?
    } else {
        Vec::new()
    };

    let mut particles: Vec<ParticleMode> = Vec::new();
    if axes.has_key("particles") {
        if !axes["particles"].is_array() {
            return Err(VeBenchError::Input(
                "Sweep config field axes.particles must be a list".to_string(),
            ));
        }
        for member in axes["particles"].members() {
            if member.as_str() == Some("fields") {
                particles.push(ParticleMode::Fields);
            } else if let Some(n) = member.as_u32().filter(|n| *n > 0) {
                particles.push(ParticleMode::Particles(n));
            } else {
                return Err(VeBenchError::Input(format!(
                    "Bad value {member} in axes.particles, expected \"fields\" or a positive integer"
                )));
            }
        }
    }
    if particles.is_empty() {
        particles.push(ParticleMode::Fields);
    }

    let mut interpolator: Vec<String> = Vec::new();
    for member in axes["interpolator"].members() {
        match member.as_str() {
            Some(s) => interpolator.push(s.to_string()),
            None => {
                return Err(VeBenchError::Input(format!(
                    "Bad value {member} in axes.interpolator, expected a string"
                )))
            }
        }
    }

    let repeats = if axes.has_key("repeats") {
        u32_list(&axes["repeats"], "axes.repeats")?
    } else {
        Vec::new()
    };

    if refinement.is_empty() || timestep.is_empty() {
        return Err(VeBenchError::Input(
            "Sweep config needs at least one refinement level and one timestep".to_string(),
        ));
    }
    if timestep.iter().chain(elastic_timestep.iter()).any(|t| *t <= 0.0) {
        return Err(VeBenchError::Input(
            "Sweep config timesteps must be positive".to_string(),
        ));
    }

    Ok(Axes {
        refinement,
        elastic_timestep: if elastic_timestep.is_empty() {
            timestep.clone()
        } else {
            elastic_timestep
        },
        timestep,
        particles,
        interpolator,
        repeats,
    })
}

fn parse_keys(keys: &JsonValue) -> Result<ParameterKeys> {
    let mut parsed = ParameterKeys::default();
    if keys.is_null() {
        return Ok(parsed);
    }

    for (name, value) in keys.entries() {
        let selector = if value.is_null() {
            None
        } else {
            Some(required_str(value, &format!("keys.{name}"))?)
        };
        let slot = match name {
            "output_directory" => &mut parsed.output_directory,
            "refinement" => &mut parsed.refinement,
            "timestep" => &mut parsed.timestep,
            "elastic_timestep" => &mut parsed.elastic_timestep,
            "use_fixed_elastic_timestep" => &mut parsed.use_fixed_elastic_timestep,
            "particles_per_direction" => &mut parsed.particles_per_direction,
            "min_particles" => &mut parsed.min_particles,
            "max_particles" => &mut parsed.max_particles,
            "interpolator" => &mut parsed.interpolator,
            other => {
                return Err(VeBenchError::Input(format!(
                    "Unknown parameter rule '{other}' in keys"
                )))
            }
        };
        *slot = selector;
    }

    Ok(parsed)
}

fn parse_initial_stress(rule: &JsonValue) -> Result<Option<InitialStressRule>> {
    if rule.is_null() {
        return Ok(None);
    }

    let key = required_str(&rule["key"], "initial_stress.key")?;
    let defaults = InitialStressRule::relaxation_benchmark(&key);

    let on_unknown = match rule["on_unknown"].as_str() {
        None if rule["on_unknown"].is_null() => defaults.on_unknown,
        Some(name) => MissPolicy::parse(name).ok_or_else(|| {
            VeBenchError::Input(format!(
                "Unknown initial_stress.on_unknown policy '{name}', expected abort, keep, placeholder or formula"
            ))
        })?,
        None => {
            return Err(VeBenchError::Input(
                "initial_stress.on_unknown must be a string".to_string(),
            ))
        }
    };

    let timestep_unit = match rule["timestep_unit"].as_str() {
        None => defaults.timestep_unit,
        Some("years") => TimeUnit::JulianYears,
        Some(name) => TimeUnit::parse(name).ok_or_else(|| {
            VeBenchError::Input(format!("Unknown initial_stress.timestep_unit '{name}'"))
        })?,
    };

    let mut table: Vec<TableEntry> = Vec::new();
    for (i, e) in rule["table"].members().enumerate() {
        let field = format!("initial_stress.table[{i}]");
        let elastic_timestep = if e["elastic_timestep"].is_null() {
            None
        } else {
            Some(required_f64(&e["elastic_timestep"], &field)?)
        };
        table.push(TableEntry {
            timestep: required_f64(&e["timestep"], &field)?,
            elastic_timestep,
            value: required_f64(&e["value"], &field)?,
        });
    }

    Ok(Some(InitialStressRule {
        stress: optional_f64(&rule["stress"], "initial_stress.stress", defaults.stress)?,
        shear_modulus: optional_f64(
            &rule["shear_modulus"],
            "initial_stress.shear_modulus",
            defaults.shear_modulus,
        )?,
        viscosity: optional_f64(
            &rule["viscosity"],
            "initial_stress.viscosity",
            defaults.viscosity,
        )?,
        timestep_unit,
        on_unknown,
        table,
        use_builtin_table: rule["builtin_table"].as_bool().unwrap_or(true),
        key,
    }))
}

fn parse_scheduler(scheduler: &JsonValue) -> Result<SchedulerConfig> {
    let mut resources: Vec<ResourceOverride> = Vec::new();
    for (i, r) in scheduler["resources"].members().enumerate() {
        let refinement = match r["refinement"].as_u32() {
            Some(v) => v,
            None => {
                return Err(VeBenchError::Input(format!(
                    "scheduler.resources[{i}] is missing an integer refinement"
                )))
            }
        };
        let mut directives: Vec<(String, String)> = Vec::new();
        for (flag, value) in r["directives"].entries() {
            let value = match value.as_str() {
                Some(s) => s.to_string(),
                None if value.is_number() => value.dump(),
                None => {
                    return Err(VeBenchError::Input(format!(
                        "scheduler.resources[{i}] directive {flag} must be a string"
                    )))
                }
            };
            directives.push((flag.to_string(), value));
        }
        resources.push(ResourceOverride {
            refinement,
            directives,
        });
    }

    Ok(SchedulerConfig {
        submit_command: optional_str(
            &scheduler["submit_command"],
            "scheduler.submit_command",
            "sbatch",
        )?,
        directive_prefix: optional_str(
            &scheduler["directive_prefix"],
            "scheduler.directive_prefix",
            "#SBATCH",
        )?,
        job_name_flag: optional_str(&scheduler["job_name_flag"], "scheduler.job_name_flag", "-J")?,
        resources,
    })
}

impl SweepConfig {
    /// Parses a sweep config from JSON text
    ///
    /// # Arguments
    /// * `contents` - The JSON text
    /// * `base_dir` - The directory relative template paths are resolved against
    pub fn parse(contents: &str, base_dir: &Path) -> Result<SweepConfig> {
        let root = match json::parse(contents) {
            Ok(j) => j,
            Err(err) => {
                return Err(VeBenchError::Input(format!(
                    "Error in sweep config json: {err}"
                )))
            }
        };

        let benchmark = required_str(&root["benchmark"], "benchmark")?;
        let base_label = optional_str(&root["base_label"], "base_label", &format!("{benchmark}_"))?;
        let label_tag = if root["label_tag"].is_null() {
            None
        } else {
            Some(required_str(&root["label_tag"], "label_tag")?)
        };

        let output_root = resolve(base_dir, &required_str(&root["output_root"], "output_root")?);
        let parameter_template = resolve(
            base_dir,
            &required_str(&root["templates"]["parameter_file"], "templates.parameter_file")?,
        );
        let job_template = resolve(
            base_dir,
            &required_str(&root["templates"]["job_script"], "templates.job_script")?,
        );

        let solver = SolverConfig {
            executable: required_str(&root["solver"]["executable"], "solver.executable")?,
            launcher: optional_str(&root["solver"]["launcher"], "solver.launcher", "mpirun")?,
            log_file: optional_str(&root["solver"]["log_file"], "solver.log_file", "opla")?,
        };
        if solver.launcher.split_whitespace().next().is_none() {
            return Err(VeBenchError::Input(
                "solver.launcher must not be empty".to_string(),
            ));
        }

        let config = SweepConfig {
            benchmark,
            base_label,
            label_tag,
            output_root,
            parameter_template,
            job_template,
            solver,
            scheduler: parse_scheduler(&root["scheduler"])?,
            axes: parse_axes(&root["axes"])?,
            keys: parse_keys(&root["keys"])?,
            initial_stress: parse_initial_stress(&root["initial_stress"])?,
        };

        Ok(config)
    }

    /// Reads a sweep config from disk
    pub fn load(path: &Path) -> Result<SweepConfig> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_err) => {
                return Err(VeBenchError::Input(format!(
                    "Unable to open sweep config {}",
                    path.display()
                )))
            }
        };
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = SweepConfig::parse(&contents, base_dir)?;

        info!(
            benchmark = %config.benchmark,
            refinements = config.axes.refinement.len(),
            timesteps = config.axes.timestep.len(),
            elastic_timesteps = config.axes.elastic_timestep.len(),
            "loaded sweep config from {}",
            path.display()
        );

        Ok(config)
    }
}
