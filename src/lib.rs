//! Run-matrix generation and analytical comparison for viscoelastic
//! geodynamics benchmarks.
//!
//! `generator` expands a sweep config into solver parameter files and batch
//! job scripts and submits them. `analytical`, `statistics`, `topography` and
//! `post_processor` compare the solver's output with closed-form solutions.

pub mod analytical;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod generator;
pub mod initial_stress;
pub mod jobscript;
pub mod parameters;
pub mod post_processor;
pub mod statistics;
pub mod topography;
pub mod units;
