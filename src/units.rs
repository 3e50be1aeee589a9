//! Time unit constants shared by the solver inputs and the comparison scripts.

/// Gregorian year, used when converting statistics-file times for comparison
pub const SECONDS_PER_YEAR: f64 = 3600. * 24. * 365.2425;

/// Julian year, the solver's own definition of a year
pub const SECONDS_PER_JULIAN_YEAR: f64 = 3600. * 24. * 365.25;

pub fn years_to_seconds(years: f64) -> f64 {
    years * SECONDS_PER_YEAR
}

pub fn julian_years_to_seconds(years: f64) -> f64 {
    years * SECONDS_PER_JULIAN_YEAR
}
