use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeBenchError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Submit error: {0}")]
    Submit(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Template file {} not found", .0.display())]
    MissingTemplate(PathBuf),

    #[error("No parameter matches '{0}'")]
    MissingKey(String),

    #[error("Parameter selector '{selector}' is ambiguous ({matches} matches)")]
    AmbiguousKey { selector: String, matches: usize },

    #[error("No initial stress known for dtc = {timestep}, dte = {elastic_timestep}")]
    UnknownInitialStress { timestep: f64, elastic_timestep: f64 },

    #[error("Run '{0}' appears more than once in the run matrix")]
    DuplicateRun(String),

    #[error("No column named '{0}'")]
    MissingColumn(String),

    #[error("Column fragment '{fragment}' is ambiguous: {candidates:?}")]
    AmbiguousColumn {
        fragment: String,
        candidates: Vec<String>,
    },

    #[error("Malformed data in {path} line {line}: {message}")]
    Shape {
        path: String,
        line: usize,
        message: String,
    },

    #[error("No matching sample at time {0}")]
    NoSampleAtTime(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VeBenchError {
    /// Errors that must stop a whole sweep rather than a single run
    pub fn aborts_generation(&self) -> bool {
        matches!(
            self,
            VeBenchError::UnknownInitialStress { .. } | VeBenchError::DuplicateRun(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VeBenchError>;
