use std::fmt::Display;

use nalgebra::DVector;

use crate::units::{julian_years_to_seconds, years_to_seconds};

/// How stresses are carried in a run: on compositional fields only, or
/// on particles with a fixed number of particles per cell per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleMode {
    Fields,
    Particles(u32),
}

impl Display for ParticleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticleMode::Fields => write!(f, "fields"),
            ParticleMode::Particles(n) => write!(f, "{n} particles per direction"),
        }
    }
}

/// One point of the run matrix. Maps to exactly one output directory and one
/// solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub refinement: u32,
    pub timestep: f64,
    pub elastic_timestep: f64,
    pub particles: ParticleMode,
    pub interpolator: Option<String>,
    pub repeat: Option<u32>,
}

impl RunSpec {
    /// The solver needs a fixed elastic timestep whenever it differs from
    /// the computational one.
    pub fn uses_fixed_elastic_timestep(&self) -> bool {
        self.timestep != self.elastic_timestep
    }

    /// Builds the run label from every axis value
    ///
    /// # Arguments
    /// * `tag` - An optional constant tag placed before the repeat index
    ///
    /// # Returns
    /// A label such as `interpolatorcell_average_dtc250_dte500_GR2_np8_g0_1`
    pub fn label(&self, tag: Option<&str>) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(interpolator) = &self.interpolator {
            parts.push(format!("interpolator{interpolator}"));
        }
        parts.push(format!("dtc{}", self.timestep));
        parts.push(format!("dte{}", self.elastic_timestep));
        parts.push(format!("GR{}", self.refinement));
        if let ParticleMode::Particles(n) = self.particles {
            parts.push(format!("np{n}"));
        }
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            parts.push(tag.to_string());
        }
        if let Some(repeat) = self.repeat {
            parts.push(repeat.to_string());
        }

        parts.join("_")
    }
}

/// Unit of a time column
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TimeUnit {
    Seconds,
    Years,
    JulianYears,
}

impl TimeUnit {
    pub fn to_seconds(&self, value: f64) -> f64 {
        match self {
            TimeUnit::Seconds => value,
            TimeUnit::Years => years_to_seconds(value),
            TimeUnit::JulianYears => julian_years_to_seconds(value),
        }
    }

    pub fn parse(name: &str) -> Option<TimeUnit> {
        match name.trim() {
            "seconds" | "s" => Some(TimeUnit::Seconds),
            "years" | "yr" => Some(TimeUnit::Years),
            "julian_years" => Some(TimeUnit::JulianYears),
            _ => None,
        }
    }
}

/// A named (time, value) sequence loaded from solver output
#[derive(Debug, Clone)]
pub struct BenchmarkSeries {
    pub name: String,
    pub time: DVector<f64>,
    pub values: DVector<f64>,
    pub time_unit: TimeUnit,
}

impl BenchmarkSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Sample times converted to seconds
    pub fn seconds(&self) -> DVector<f64> {
        self.time.map(|t| self.time_unit.to_seconds(t))
    }
}

/// Surface elevation along the top boundary at one output step
#[derive(Debug, Clone)]
pub struct TopographyProfile {
    pub step: u32,
    pub x: DVector<f64>,
    pub elevation: DVector<f64>,
}

impl TopographyProfile {
    /// Elevation with a reference height (usually the domain height) removed
    pub fn relative_to(&self, reference_height: f64) -> DVector<f64> {
        self.elevation.add_scalar(-reference_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RunSpec {
        RunSpec {
            refinement: 2,
            timestep: 250.0,
            elastic_timestep: 500.0,
            particles: ParticleMode::Fields,
            interpolator: None,
            repeat: None,
        }
    }

    #[test]
    fn label_for_field_run() {
        assert_eq!(spec().label(Some("g0")), "dtc250_dte500_GR2_g0");
        assert_eq!(spec().label(None), "dtc250_dte500_GR2");
    }

    #[test]
    fn label_for_particle_run_keeps_fractional_timesteps() {
        let run = RunSpec {
            timestep: 62.5,
            elastic_timestep: 0.0025,
            particles: ParticleMode::Particles(8),
            interpolator: Some("cell_average".to_string()),
            repeat: Some(3),
            ..spec()
        };
        assert_eq!(
            run.label(Some("g0")),
            "interpolatorcell_average_dtc62.5_dte0.0025_GR2_np8_g0_3"
        );
    }

    #[test]
    fn fixed_elastic_timestep_only_when_different() {
        assert!(spec().uses_fixed_elastic_timestep());
        let same = RunSpec {
            elastic_timestep: 250.0,
            ..spec()
        };
        assert!(!same.uses_fixed_elastic_timestep());
    }

    #[test]
    fn relative_topography() {
        let profile = TopographyProfile {
            step: 0,
            x: DVector::from_vec(vec![0.0, 0.5, 1.0]),
            elevation: DVector::from_vec(vec![1.0, 1.075, 1.0]),
        };
        let relative = profile.relative_to(1.0);
        assert!((relative[1] - 0.075).abs() < 1e-12);
        assert_eq!(relative[0], 0.0);
    }
}
