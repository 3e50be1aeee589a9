//! Closed-form reference solutions for the viscoelastic benchmarks.
//!
//! Times are in seconds and lengths in metres unless a constructor says
//! otherwise. Evaluation is pure; the vector forms map the scalar form over
//! their input.

use std::f64::consts::PI;

use nalgebra::DVector;

use crate::datatypes::TimeUnit;
use crate::error::{Result, VeBenchError};
use crate::units::SECONDS_PER_JULIAN_YEAR;

/// Fewest Fourier terms accepted for the zero-flux topography series
pub const MIN_SERIES_TERMS: usize = 500;

/// A solution depending on time only
pub trait TimeSolution {
    fn value(&self, t: f64) -> f64;

    fn evaluate(&self, times: &DVector<f64>) -> DVector<f64> {
        times.map(|t| self.value(t))
    }
}

/// A solution depending on a horizontal position and time
pub trait SurfaceSolution {
    fn value(&self, x: f64, t: f64) -> f64;

    /// History at one position
    fn evaluate_at(&self, x: f64, times: &DVector<f64>) -> DVector<f64> {
        times.map(|t| self.value(x, t))
    }

    /// Profile along the surface at one time
    fn profile(&self, xs: &DVector<f64>, t: f64) -> DVector<f64> {
        xs.map(|x| self.value(x, t))
    }
}

/// Maxwell relaxation of an initial stress with no applied deformation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressRelaxation {
    pub initial_stress: f64,
    pub shear_modulus: f64,
    pub viscosity: f64,
}

impl StressRelaxation {
    pub fn benchmark() -> StressRelaxation {
        StressRelaxation {
            initial_stress: 20e6,
            shear_modulus: 1e10,
            viscosity: 1e22,
        }
    }

    /// Maxwell relaxation time η/μ
    pub fn relaxation_time(&self) -> f64 {
        self.viscosity / self.shear_modulus
    }
}

impl TimeSolution for StressRelaxation {
    fn value(&self, t: f64) -> f64 {
        self.initial_stress * (-self.shear_modulus * t / self.viscosity).exp()
    }
}

/// Stress growth under a constant strain rate, starting from zero stress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressBuildUp {
    pub strain_rate: f64,
    pub shear_modulus: f64,
    pub viscosity: f64,
}

impl StressBuildUp {
    /// 0.03154 m/yr applied across a 100 km wide box
    pub fn benchmark() -> StressBuildUp {
        StressBuildUp {
            strain_rate: 0.03154 / SECONDS_PER_JULIAN_YEAR / 1e5,
            shear_modulus: 1e10,
            viscosity: 1e22,
        }
    }

    /// Viscous limit the stress approaches, 2ε̇η
    pub fn steady_state(&self) -> f64 {
        2. * self.strain_rate * self.viscosity
    }
}

impl TimeSolution for StressBuildUp {
    fn value(&self, t: f64) -> f64 {
        self.steady_state() * (1. - (-self.shear_modulus * t / self.viscosity).exp())
    }
}

/// Shear stress of a layer sheared at a constant velocity until `switch_time`,
/// then left to relax
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatoryShear {
    pub velocity: f64,
    pub shear_modulus: f64,
    pub viscosity: f64,
    pub height: f64,
    pub switch_time: f64,
}

impl OscillatoryShear {
    /// Simple-shear benchmark in non-dimensional units
    pub fn simple_shear() -> OscillatoryShear {
        OscillatoryShear {
            velocity: 0.3,
            shear_modulus: 1e2,
            viscosity: 1e2,
            height: 1.,
            switch_time: 0.5,
        }
    }

    /// The sheared-torsion benchmark shares the simple-shear constants
    pub fn sheared_torsion() -> OscillatoryShear {
        OscillatoryShear::simple_shear()
    }

    /// Integration constants (C1, C2) of the loading phase
    pub fn coefficients(&self) -> (f64, f64) {
        let v = self.velocity;
        let mu = self.shear_modulus;
        let eta = self.viscosity;
        let h = self.height;

        let denominator = mu * mu * h * h + v * v * eta * eta;
        let c1 = -v * v * eta * eta * mu / denominator;
        let c2 = -v * h * eta * mu * mu / denominator;
        (c1, c2)
    }

    fn loading(&self, t: f64) -> f64 {
        let (c1, c2) = self.coefficients();
        let omega = self.velocity / self.height;
        let decay = (-self.shear_modulus * t / self.viscosity).exp();
        decay * (c2 * (omega * t).cos() - c1 * (omega * t).sin()) - c2
    }
}

impl TimeSolution for OscillatoryShear {
    fn value(&self, t: f64) -> f64 {
        if t <= self.switch_time {
            self.loading(t)
        } else {
            let relaxed = -self.shear_modulus * (t - self.switch_time) / self.viscosity;
            self.loading(self.switch_time) * relaxed.exp()
        }
    }
}

/// Relaxation of a cosine-shaped surface bump with zero-flux sides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroFluxTopography {
    amplitude: f64,
    domain_width: f64,
    diffusivity: f64,
    terms: usize,
}

impl ZeroFluxTopography {
    /// Creates the truncated series
    ///
    /// # Arguments
    /// * `amplitude` - Peak height of the initial bump
    /// * `domain_width` - Width of the domain
    /// * `diffusivity` - Hillslope diffusivity
    /// * `terms` - Number of Fourier terms, at least `MIN_SERIES_TERMS`
    pub fn new(
        amplitude: f64,
        domain_width: f64,
        diffusivity: f64,
        terms: usize,
    ) -> Result<ZeroFluxTopography> {
        if terms < MIN_SERIES_TERMS {
            return Err(VeBenchError::Input(format!(
                "topography series needs at least {MIN_SERIES_TERMS} terms, got {terms}"
            )));
        }
        if domain_width <= 0. {
            return Err(VeBenchError::Input(format!(
                "domain width must be positive, got {domain_width}"
            )));
        }
        Ok(ZeroFluxTopography {
            amplitude,
            domain_width,
            diffusivity,
            terms,
        })
    }

    pub fn benchmark() -> ZeroFluxTopography {
        ZeroFluxTopography {
            amplitude: 0.075,
            domain_width: 1.,
            diffusivity: 0.25,
            terms: 5000,
        }
    }

    pub fn terms(&self) -> usize {
        self.terms
    }
}

impl SurfaceSolution for ZeroFluxTopography {
    fn value(&self, x: f64, t: f64) -> f64 {
        let a = self.amplitude;
        let w = self.domain_width;

        let series: f64 = (1..=self.terms)
            .map(|n| {
                let n = n as f64;
                let spatial = (2. * n * PI * x / w).cos();
                let temporal = (-4. * self.diffusivity * n * n * PI * PI * t / (w * w)).exp();
                spatial * temporal / (4. * n * n - 1.)
            })
            .sum();

        2. * a / PI - 4. * a / PI * series
    }
}

/// Relaxation of a sine-shaped surface bump with fixed-height sides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantHeightTopography {
    pub amplitude: f64,
    pub domain_width: f64,
    pub diffusivity: f64,
}

impl ConstantHeightTopography {
    pub fn benchmark() -> ConstantHeightTopography {
        ConstantHeightTopography {
            amplitude: 0.075,
            domain_width: 1.,
            diffusivity: 0.25,
        }
    }
}

impl SurfaceSolution for ConstantHeightTopography {
    fn value(&self, x: f64, t: f64) -> f64 {
        let w = self.domain_width;
        self.amplitude
            * (PI * x / w).sin()
            * (-self.diffusivity * PI * PI * t / (w * w)).exp()
    }
}

/// Benchmark families with a closed-form reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Benchmark {
    StressRelaxation,
    StressBuildUp,
    SimpleShear,
    ShearedTorsion,
    TopographyZeroFlux,
    TopographyConstantHeight,
}

impl Benchmark {
    /// Reference value as a function of time in seconds; surface benchmarks
    /// are evaluated at the horizontal position `x`
    pub fn reference(&self, x: f64) -> Box<dyn Fn(f64) -> f64> {
        match self {
            Benchmark::StressRelaxation => {
                let solution = StressRelaxation::benchmark();
                Box::new(move |t| solution.value(t))
            }
            Benchmark::StressBuildUp => {
                let solution = StressBuildUp::benchmark();
                Box::new(move |t| solution.value(t))
            }
            Benchmark::SimpleShear => {
                let solution = OscillatoryShear::simple_shear();
                Box::new(move |t| solution.value(t))
            }
            Benchmark::ShearedTorsion => {
                let solution = OscillatoryShear::sheared_torsion();
                Box::new(move |t| solution.value(t))
            }
            Benchmark::TopographyZeroFlux => {
                let solution = ZeroFluxTopography::benchmark();
                Box::new(move |t| solution.value(x, t))
            }
            Benchmark::TopographyConstantHeight => {
                let solution = ConstantHeightTopography::benchmark();
                Box::new(move |t| solution.value(x, t))
            }
        }
    }

    /// Unit of the time column the solver writes for this benchmark
    pub fn time_unit(&self) -> TimeUnit {
        match self {
            Benchmark::StressRelaxation | Benchmark::StressBuildUp => TimeUnit::Years,
            _ => TimeUnit::Seconds,
        }
    }

    pub fn time_column(&self) -> &'static str {
        match self.time_unit() {
            TimeUnit::Seconds => "Time (seconds)",
            TimeUnit::Years | TimeUnit::JulianYears => "Time (years)",
        }
    }

    /// Analytical surface profile at time `t` (seconds); `None` for
    /// benchmarks without a surface solution
    pub fn profile(&self, xs: &DVector<f64>, t: f64) -> Option<DVector<f64>> {
        match self {
            Benchmark::TopographyZeroFlux => Some(ZeroFluxTopography::benchmark().profile(xs, t)),
            Benchmark::TopographyConstantHeight => {
                Some(ConstantHeightTopography::benchmark().profile(xs, t))
            }
            _ => None,
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(
            self,
            Benchmark::TopographyZeroFlux | Benchmark::TopographyConstantHeight
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::SECONDS_PER_YEAR;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn relaxation_matches_closed_form() {
        let relaxation = StressRelaxation::benchmark();
        let t = 10000. * SECONDS_PER_YEAR;
        let expected = 20e6 * (-1e10 * 10000. * SECONDS_PER_YEAR / 1e22).exp();
        assert_relative_eq!(relaxation.value(t), expected, max_relative = 1e-9);
        assert_relative_eq!(relaxation.value(0.), 20e6);
        assert_relative_eq!(
            relaxation.value(relaxation.relaxation_time()),
            20e6 / std::f64::consts::E,
            max_relative = 1e-12
        );
    }

    #[test]
    fn relaxation_is_monotone_over_a_vector() {
        let relaxation = StressRelaxation::benchmark();
        let times = DVector::from_fn(50, |i, _| i as f64 * 1000. * SECONDS_PER_YEAR);
        let stresses = relaxation.evaluate(&times);
        assert_eq!(stresses.len(), 50);
        for i in 1..stresses.len() {
            assert!(stresses[i] < stresses[i - 1]);
        }
    }

    #[test]
    fn build_up_starts_at_zero_and_approaches_steady_state() {
        let build_up = StressBuildUp::benchmark();
        assert_abs_diff_eq!(build_up.value(0.), 0.);
        let steady = build_up.steady_state();
        assert_relative_eq!(steady, 2. * 0.03154 / SECONDS_PER_JULIAN_YEAR / 1e5 * 1e22);
        let late = build_up.value(100. * 1e12);
        assert_relative_eq!(late, steady, max_relative = 1e-12);
        assert!(build_up.value(1e12) < steady);
    }

    #[test]
    fn oscillatory_shear_is_continuous_at_switch_time() {
        let shear = OscillatoryShear::simple_shear();
        assert_abs_diff_eq!(shear.value(0.), 0., epsilon = 1e-12);

        let ts = shear.switch_time;
        assert_relative_eq!(shear.value(ts), shear.value(ts + 1e-12), max_relative = 1e-9);
        assert_relative_eq!(
            shear.value(ts + 0.1),
            shear.value(ts) * (-1e2 * 0.1 / 1e2_f64).exp(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn oscillatory_shear_coefficients() {
        let shear = OscillatoryShear::sheared_torsion();
        let (c1, c2) = shear.coefficients();
        // μ = η = 100, V = 0.3, h = 1
        let denominator = 1e4 + 0.09 * 1e4;
        assert_relative_eq!(c1, -0.09 * 1e4 * 1e2 / denominator);
        assert_relative_eq!(c2, -0.3 * 1e2 * 1e4 / denominator);
    }

    #[test]
    fn zero_flux_topography_is_symmetric_and_converges() {
        let coarse = ZeroFluxTopography::new(0.075, 1., 0.25, MIN_SERIES_TERMS).unwrap();
        let fine = ZeroFluxTopography::new(0.075, 1., 0.25, 2000).unwrap();

        let xs = DVector::from_vec(vec![0.1, 0.25, 0.4]);
        let mirrored = xs.map(|x| 1. - x);
        let t = 1e-3;
        let profile = fine.profile(&xs, t);
        let mirror = fine.profile(&mirrored, t);
        for i in 0..xs.len() {
            assert_relative_eq!(profile[i], mirror[i], max_relative = 1e-9);
            assert_abs_diff_eq!(coarse.value(xs[i], t), profile[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_flux_topography_starts_as_a_bump() {
        let topography = ZeroFluxTopography::benchmark();
        assert_eq!(topography.terms(), 5000);
        // |sin(πx)| scaled by A at t = 0
        assert_abs_diff_eq!(topography.value(0.5, 0.), 0.075, epsilon = 1e-4);
        assert_abs_diff_eq!(topography.value(0.25, 0.), 0.075 * 0.5_f64.sqrt(), epsilon = 1e-4);
        // Mass is conserved, so the profile flattens towards its mean
        assert_relative_eq!(topography.value(0.3, 10.), 2. * 0.075 / PI, max_relative = 1e-9);
    }

    #[test]
    fn zero_flux_topography_matches_at_both_sides() {
        let topography = ZeroFluxTopography::benchmark();
        for t in [0., 1e-4, 1e-2] {
            assert_abs_diff_eq!(topography.value(0., t), topography.value(1., t), epsilon = 1e-9);
        }
    }

    #[test]
    fn benchmark_references() {
        let relaxation = Benchmark::StressRelaxation.reference(0.);
        assert_relative_eq!(relaxation(0.), 20e6);
        let topography = Benchmark::TopographyConstantHeight.reference(0.5);
        assert_relative_eq!(topography(0.), 0.075);
        assert_eq!(Benchmark::StressBuildUp.time_column(), "Time (years)");
        assert_eq!(Benchmark::SimpleShear.time_unit(), TimeUnit::Seconds);
        assert!(Benchmark::TopographyZeroFlux.is_surface());

        let xs = DVector::from_vec(vec![0.25, 0.5]);
        let profile = Benchmark::TopographyConstantHeight.profile(&xs, 0.).unwrap();
        assert_relative_eq!(profile[1], 0.075);
        assert!(Benchmark::StressRelaxation.profile(&xs, 0.).is_none());
    }

    #[test]
    fn zero_flux_topography_rejects_short_series() {
        assert!(ZeroFluxTopography::new(0.075, 1., 0.25, 100).is_err());
        assert!(ZeroFluxTopography::new(0.075, 0., 0.25, 500).is_err());
    }

    #[test]
    fn constant_height_topography() {
        let topography = ConstantHeightTopography::benchmark();
        assert_relative_eq!(topography.value(0.5, 0.), 0.075);
        assert_abs_diff_eq!(topography.value(0., 1.), 0.);
        let times = DVector::from_vec(vec![0., 0.1, 1.]);
        let history = topography.evaluate_at(0.5, &times);
        assert_relative_eq!(history[2], 0.075 * (-0.25 * PI * PI).exp());
        assert!(history[1] < history[0]);
    }
}
