use std::io::Write;
use std::path::Path;

use nalgebra::DVector;
use tracing::info;

use crate::{
    datatypes::{BenchmarkSeries, TopographyProfile},
    error::{Result, VeBenchError},
};

/// Relative tolerance used when matching a requested time to a sample
pub const SAMPLE_TOLERANCE: f64 = 1e-9;

/// Deviation of one simulated sample from the analytical solution
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub run: String,
    /// Sample time, in the series' own unit
    pub time: f64,
    pub simulated: f64,
    pub analytical: f64,
    /// `None` where the analytical value is zero or not finite
    pub error_percent: Option<f64>,
}

/// Deviation of one surface point from the analytical profile
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileErrorRecord {
    pub run: String,
    pub step: u32,
    pub x: f64,
    /// Elevation relative to the reference height
    pub simulated: f64,
    pub analytical: f64,
    pub error_percent: Option<f64>,
}

/// Relative error in percent, `(sim - ana) / ana * 100`
pub fn relative_error(simulated: f64, analytical: f64) -> Option<f64> {
    if analytical == 0. || !analytical.is_finite() || !simulated.is_finite() {
        return None;
    }
    Some((simulated - analytical) / analytical * 100.)
}

/// Elementwise relative errors of two equally long vectors
pub fn relative_errors(
    simulated: &DVector<f64>,
    analytical: &DVector<f64>,
) -> Result<Vec<Option<f64>>> {
    if simulated.len() != analytical.len() {
        return Err(VeBenchError::Data(format!(
            "cannot compare {} simulated samples with {} analytical values",
            simulated.len(),
            analytical.len()
        )));
    }
    Ok(simulated
        .iter()
        .zip(analytical.iter())
        .map(|(s, a)| relative_error(*s, *a))
        .collect())
}

fn same_time(a: f64, b: f64) -> bool {
    (a - b).abs() <= SAMPLE_TOLERANCE * a.abs().max(b.abs())
}

/// Value of the first sample taken at `time`
///
/// # Arguments
/// * `series` - The simulated series
/// * `time` - The requested time, in the series' unit
pub fn sample_at(series: &BenchmarkSeries, time: f64) -> Result<f64> {
    series
        .time
        .iter()
        .position(|t| same_time(*t, time))
        .map(|idx| series.values[idx])
        .ok_or(VeBenchError::NoSampleAtTime(time))
}

/// Compares every sample of a series with an analytical solution
///
/// # Arguments
/// * `run` - Name of the run the series comes from
/// * `series` - The simulated series
/// * `solution` - Analytical value as a function of time in seconds
pub fn compare_series(
    run: &str,
    series: &BenchmarkSeries,
    solution: impl Fn(f64) -> f64,
) -> Vec<ErrorRecord> {
    series
        .time
        .iter()
        .zip(series.values.iter())
        .map(|(t, simulated)| {
            let analytical = solution(series.time_unit.to_seconds(*t));
            ErrorRecord {
                run: run.to_string(),
                time: *t,
                simulated: *simulated,
                analytical,
                error_percent: relative_error(*simulated, analytical),
            }
        })
        .collect()
}

/// Compares the sample taken at one time with an analytical solution
pub fn compare_at(
    run: &str,
    series: &BenchmarkSeries,
    time: f64,
    solution: impl Fn(f64) -> f64,
) -> Result<ErrorRecord> {
    let simulated = sample_at(series, time)?;
    let analytical = solution(series.time_unit.to_seconds(time));
    Ok(ErrorRecord {
        run: run.to_string(),
        time,
        simulated,
        analytical,
        error_percent: relative_error(simulated, analytical),
    })
}

/// Compares a topography profile with the analytical surface
///
/// # Arguments
/// * `run` - Name of the run the profile comes from
/// * `profile` - The simulated profile
/// * `reference_height` - Domain height removed from the elevations
/// * `analytical` - Analytical topography at the profile's positions
pub fn compare_profile(
    run: &str,
    profile: &TopographyProfile,
    reference_height: f64,
    analytical: &DVector<f64>,
) -> Result<Vec<ProfileErrorRecord>> {
    let simulated = profile.relative_to(reference_height);
    let errors = relative_errors(&simulated, analytical)?;

    Ok(errors
        .into_iter()
        .enumerate()
        .map(|(i, error_percent)| ProfileErrorRecord {
            run: run.to_string(),
            step: profile.step,
            x: profile.x[i],
            simulated: simulated[i],
            analytical: analytical[i],
            error_percent,
        })
        .collect())
}

fn max_abs(errors: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    errors
        .flatten()
        .map(f64::abs)
        .fold(None, |max, e| match max {
            Some(m) if m >= e => Some(m),
            _ => Some(e),
        })
}

/// Largest absolute relative error among the defined ones
pub fn max_abs_error(records: &[ErrorRecord]) -> Option<f64> {
    max_abs(records.iter().map(|r| r.error_percent))
}

pub fn max_abs_profile_error(records: &[ProfileErrorRecord]) -> Option<f64> {
    max_abs(records.iter().map(|r| r.error_percent))
}

fn create(path: &Path) -> Result<std::fs::File> {
    match std::fs::File::create(path) {
        Ok(f) => Ok(f),
        Err(err) => Err(VeBenchError::Data(format!(
            "Failed to create {}: {err}",
            path.display()
        ))),
    }
}

/// Writes error records to a CSV file
///
/// # Arguments
/// * `records` - The records, in output order
/// * `output` - The filename of the output csv
pub fn write_error_records(records: &[ErrorRecord], output: &Path) -> Result<()> {
    let mut file = create(output)?;

    writeln!(file, "run,time,simulated,analytical,error_percent")?;
    for record in records {
        let error = match record.error_percent {
            Some(e) => e.to_string(),
            None => String::new(),
        };
        writeln!(
            file,
            "{run},{time},{simulated},{analytical},{error}",
            run = record.run,
            time = record.time,
            simulated = record.simulated,
            analytical = record.analytical,
        )?;
    }

    info!("wrote {} error records to {}", records.len(), output.display());
    Ok(())
}

/// Writes profile error records to a CSV file
pub fn write_profile_records(records: &[ProfileErrorRecord], output: &Path) -> Result<()> {
    let mut file = create(output)?;

    writeln!(file, "run,step,x,simulated,analytical,error_percent")?;
    for r in records {
        let error = match r.error_percent {
            Some(e) => e.to_string(),
            None => String::new(),
        };
        writeln!(
            file,
            "{},{},{},{},{},{error}",
            r.run, r.step, r.x, r.simulated, r.analytical
        )?;
    }

    info!("wrote {} profile records to {}", records.len(), output.display());
    Ok(())
}

/// Writes an evaluated analytical solution to a CSV file
///
/// # Arguments
/// * `times` - Evaluation times
/// * `values` - Analytical values at those times
/// * `output` - The filename of the output csv
pub fn write_evaluation(times: &DVector<f64>, values: &DVector<f64>, output: &Path) -> Result<()> {
    let mut file = create(output)?;

    writeln!(file, "time,value")?;
    for (t, v) in times.iter().zip(values.iter()) {
        writeln!(file, "{t},{v}")?;
    }

    info!("wrote output to {}", output.display());
    Ok(())
}
