//! Initial-stress correction for the stress relaxation benchmark.
//!
//! The solver advects the old stresses once before the first timestep, so the
//! stored initial stresses are pre-scaled to land on the intended value. The
//! correction depends on the timestep; measured values are kept in a table and
//! the closed form `σ0 · exp(μ · dtc / η)` covers the equal-timestep case.

use tracing::{debug, warn};

use crate::datatypes::{RunSpec, TimeUnit};
use crate::error::{Result, VeBenchError};

/// Written in place of the corrected stress under the placeholder policy
pub const PLACEHOLDER: &str = "UNKNOWN_INITIAL_STRESS";

/// What to do when no table entry matches a run's timesteps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    /// Stop the whole generation
    Abort,
    /// Report and leave the template value untouched
    Keep,
    /// Report and write a value the solver will reject
    Placeholder,
    /// Use the closed-form correction
    Formula,
}

impl MissPolicy {
    pub fn parse(name: &str) -> Option<MissPolicy> {
        match name.trim() {
            "abort" => Some(MissPolicy::Abort),
            "keep" => Some(MissPolicy::Keep),
            "placeholder" => Some(MissPolicy::Placeholder),
            "formula" => Some(MissPolicy::Formula),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    pub timestep: f64,
    /// Restricts the entry to one elastic timestep; `None` matches any
    pub elastic_timestep: Option<f64>,
    pub value: f64,
}

const fn entry(timestep: f64, elastic_timestep: Option<f64>, value: f64) -> TableEntry {
    TableEntry {
        timestep,
        elastic_timestep,
        value,
    }
}

/// Corrections used by the relaxation runs (20 MPa, μ = 1e10 Pa, η = 1e22 Pa s,
/// timesteps in years). 125 and 250 depend on the elastic timestep and are
/// listed as pairs only.
pub const BUILTIN_TABLE: [TableEntry; 14] = [
    entry(125., Some(125.), 20079050.),
    entry(125., Some(250.), 20079206.),
    entry(125., Some(500.), 20238559.),
    entry(250., Some(250.), 20158412.),
    entry(250., Some(500.), 20159039.5),
    entry(0.01, None, 20000006.),
    entry(0.1, None, 20000063.),
    entry(1., None, 20000631.),
    entry(5., None, 20003156.),
    entry(25., None, 20015785.),
    entry(62.5, None, 20039486.),
    entry(500., None, 20318079.),
    entry(2500., None, 21641792.),
    entry(25000., None, 44021241.),
];

/// Outcome of resolving the corrected stress for one run
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    Value(f64),
    Keep,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct InitialStressRule {
    /// Parameter selector of the function expression carrying the stresses
    pub key: String,
    pub stress: f64,
    pub shear_modulus: f64,
    pub viscosity: f64,
    pub timestep_unit: TimeUnit,
    pub on_unknown: MissPolicy,
    /// Searched before `BUILTIN_TABLE`
    pub table: Vec<TableEntry>,
    pub use_builtin_table: bool,
}

impl InitialStressRule {
    pub fn relaxation_benchmark(key: &str) -> InitialStressRule {
        InitialStressRule {
            key: key.to_string(),
            stress: 20e6,
            shear_modulus: 1e10,
            viscosity: 1e22,
            timestep_unit: TimeUnit::JulianYears,
            on_unknown: MissPolicy::Abort,
            table: Vec::new(),
            use_builtin_table: true,
        }
    }

    /// Closed-form correction for equal computational and elastic timesteps
    pub fn formula(&self, timestep: f64) -> f64 {
        let dt = self.timestep_unit.to_seconds(timestep);
        self.stress * (self.shear_modulus * dt / self.viscosity).exp()
    }

    /// Table lookup
    ///
    /// An exact (dtc, dte) pair wins over a timestep-only entry. A timestep
    /// that has any pair entry is pair-only: other elastic timesteps miss.
    pub fn lookup(&self, timestep: f64, elastic_timestep: f64) -> Option<f64> {
        let builtin: &[TableEntry] = if self.use_builtin_table {
            &BUILTIN_TABLE
        } else {
            &[]
        };
        let candidates = || {
            self.table
                .iter()
                .chain(builtin.iter())
                .filter(move |e| e.timestep == timestep)
        };

        if let Some(pair) = candidates().find(|e| e.elastic_timestep == Some(elastic_timestep)) {
            return Some(pair.value);
        }
        if candidates().any(|e| e.elastic_timestep.is_some()) {
            return None;
        }
        candidates()
            .find(|e| e.elastic_timestep.is_none())
            .map(|e| e.value)
    }

    /// Resolves the correction for a run, applying the miss policy
    pub fn resolve(&self, spec: &RunSpec) -> Result<Correction> {
        if let Some(value) = self.lookup(spec.timestep, spec.elastic_timestep) {
            return Ok(Correction::Value(value));
        }

        match self.on_unknown {
            MissPolicy::Abort => Err(VeBenchError::UnknownInitialStress {
                timestep: spec.timestep,
                elastic_timestep: spec.elastic_timestep,
            }),
            MissPolicy::Keep => {
                warn!(
                    timestep = spec.timestep,
                    elastic_timestep = spec.elastic_timestep,
                    "unknown timestep, keeping template initial stress"
                );
                Ok(Correction::Keep)
            }
            MissPolicy::Placeholder => {
                warn!(
                    timestep = spec.timestep,
                    elastic_timestep = spec.elastic_timestep,
                    "unknown timestep, writing placeholder initial stress"
                );
                Ok(Correction::Placeholder)
            }
            MissPolicy::Formula => {
                if spec.timestep != spec.elastic_timestep {
                    warn!(
                        timestep = spec.timestep,
                        elastic_timestep = spec.elastic_timestep,
                        "closed-form initial stress assumes equal timesteps"
                    );
                }
                let value = self.formula(spec.timestep);
                debug!(timestep = spec.timestep, value, "closed-form initial stress");
                Ok(Correction::Value(value))
            }
        }
    }

    /// Renders the new function expression from the template's one
    ///
    /// # Arguments
    /// * `template_value` - The existing expression, at least three `;`-separated components
    /// * `correction` - The resolved correction
    ///
    /// # Returns
    /// The new expression, or `None` when the template value is kept
    pub fn render(&self, template_value: &str, correction: &Correction) -> Result<Option<String>> {
        let components: Vec<&str> = template_value.split(';').map(|c| c.trim()).collect();
        if components.len() < 3 {
            return Err(VeBenchError::Template(format!(
                "initial stress expression '{template_value}' has fewer than 3 components"
            )));
        }
        let head = components[..3].join("; ");

        Ok(match correction {
            Correction::Keep => None,
            Correction::Placeholder => Some(format!("{head}; {PLACEHOLDER}; -{PLACEHOLDER}; 0")),
            Correction::Value(value) => Some(format!("{head}; {value}; -{value}; 0")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ParticleMode;
    use approx::assert_relative_eq;

    const KEY: &str = "Initial composition model/Function/Function expression";

    fn run(timestep: f64, elastic_timestep: f64) -> RunSpec {
        RunSpec {
            refinement: 2,
            timestep,
            elastic_timestep,
            particles: ParticleMode::Fields,
            interpolator: None,
            repeat: None,
        }
    }

    #[test]
    fn pair_entry_wins_over_timestep_entry() {
        let rule = InitialStressRule::relaxation_benchmark(KEY);
        assert_eq!(rule.lookup(125., 250.), Some(20079206.));
        assert_eq!(rule.lookup(125., 125.), Some(20079050.));
        assert_eq!(rule.lookup(62.5, 62.5), Some(20039486.));
        assert_eq!(rule.lookup(62.5, 125.), Some(20039486.));
        assert_eq!(rule.lookup(1000., 1000.), None);
    }

    #[test]
    fn unlisted_elastic_timestep_of_a_paired_timestep_misses() {
        let rule = InitialStressRule::relaxation_benchmark(KEY);
        assert_eq!(rule.lookup(125., 1000.), None);
        assert_eq!(rule.lookup(250., 125.), None);
        assert!(matches!(
            rule.resolve(&run(125., 1000.)),
            Err(VeBenchError::UnknownInitialStress { .. })
        ));
    }

    #[test]
    fn user_table_takes_precedence() {
        let mut rule = InitialStressRule::relaxation_benchmark(KEY);
        rule.table.push(entry(62.5, None, 1.0));
        assert_eq!(rule.lookup(62.5, 1000.), Some(1.0));
        rule.table.push(entry(125., Some(1000.), 2.0));
        assert_eq!(rule.lookup(125., 1000.), Some(2.0));
        rule.use_builtin_table = false;
        assert_eq!(rule.lookup(250., 250.), None);
    }

    #[test]
    fn formula_reproduces_timestep_entries() {
        let rule = InitialStressRule::relaxation_benchmark(KEY);
        for e in BUILTIN_TABLE
            .iter()
            .filter(|e| e.elastic_timestep.map_or(true, |dte| dte == e.timestep))
        {
            assert!(
                (rule.formula(e.timestep) - e.value).abs() < 1.0,
                "dtc = {}",
                e.timestep
            );
        }
        assert_relative_eq!(rule.formula(0.0), 20e6);
    }

    #[test]
    fn miss_policies() {
        let mut rule = InitialStressRule::relaxation_benchmark(KEY);
        let unknown = run(1000., 1000.);

        assert!(matches!(
            rule.resolve(&unknown),
            Err(VeBenchError::UnknownInitialStress { .. })
        ));

        rule.on_unknown = MissPolicy::Keep;
        assert_eq!(rule.resolve(&unknown).unwrap(), Correction::Keep);

        rule.on_unknown = MissPolicy::Placeholder;
        assert_eq!(rule.resolve(&unknown).unwrap(), Correction::Placeholder);

        rule.on_unknown = MissPolicy::Formula;
        match rule.resolve(&unknown).unwrap() {
            Correction::Value(v) => assert_relative_eq!(v, rule.formula(1000.)),
            other => panic!("unexpected correction {other:?}"),
        }
    }

    #[test]
    fn render_keeps_the_leading_components() {
        let rule = InitialStressRule::relaxation_benchmark(KEY);
        let rendered = rule
            .render("20e6; -20e6; 0; 0; 0; 0", &Correction::Value(20158412.))
            .unwrap();
        assert_eq!(
            rendered.as_deref(),
            Some("20e6; -20e6; 0; 20158412; -20158412; 0")
        );
        assert_eq!(
            rule.render("20e6;-20e6;0", &Correction::Keep).unwrap(),
            None
        );
        assert!(rule
            .render("20e6", &Correction::Value(1.0))
            .is_err());
        assert!(rule
            .render("20e6; -20e6; 0", &Correction::Placeholder)
            .unwrap()
            .unwrap()
            .contains(PLACEHOLDER));
    }
}
