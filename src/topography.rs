//! Surface topography output: `topography.NNNNN` files with x, elevation
//! columns in a run's output directory.

use std::path::{Path, PathBuf};

use nalgebra::DVector;

use crate::datatypes::TopographyProfile;
use crate::error::{Result, VeBenchError};

pub fn topography_path(output_dir: &Path, step: u32) -> PathBuf {
    output_dir.join(format!("topography.{step:05}"))
}

/// Parses topography text; columns past the second are ignored
pub fn parse_topography(contents: &str, step: u32, source: &str) -> Result<TopographyProfile> {
    let mut x: Vec<f64> = Vec::new();
    let mut elevation: Vec<f64> = Vec::new();

    for (line_no, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let cells: Vec<&str> = trimmed.split_whitespace().collect();
        if cells.len() < 2 {
            return Err(VeBenchError::Shape {
                path: source.to_string(),
                line: line_no + 1,
                message: format!("expected at least 2 columns, found {}", cells.len()),
            });
        }

        let parse = |cell: &str| {
            cell.parse::<f64>().map_err(|_| VeBenchError::Shape {
                path: source.to_string(),
                line: line_no + 1,
                message: format!("'{cell}' is not a number"),
            })
        };
        x.push(parse(cells[0])?);
        elevation.push(parse(cells[1])?);
    }

    Ok(TopographyProfile {
        step,
        x: DVector::from_vec(x),
        elevation: DVector::from_vec(elevation),
    })
}

/// Reads the topography written at one output step
///
/// # Arguments
/// * `output_dir` - The run's output directory
/// * `step` - The output step number
pub fn read_topography(output_dir: &Path, step: u32) -> Result<TopographyProfile> {
    let path = topography_path(output_dir, step);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(err) => {
            return Err(VeBenchError::Data(format!(
                "Unable to read topography file {}: {err}",
                path.display()
            )))
        }
    };
    parse_topography(&contents, step, &path.display().to_string())
}
