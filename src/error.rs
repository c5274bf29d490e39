use std::fmt::{self, Display, Formatter};
use std::io;

/// Every failure the model can report. Configuration and table problems are found before the
/// first monthly step; `TableError` can also surface mid-run when a lookup runs past the end of a
/// tabulated range, which means the data does not match the run.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum HpvError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    ConfigError(String),
    TableError(String),
    LoggingError(String),
}

impl From<io::Error> for HpvError {
    fn from(error: io::Error) -> Self {
        HpvError::IoError(error)
    }
}

impl From<serde_json::Error> for HpvError {
    fn from(error: serde_json::Error) -> Self {
        HpvError::JsonError(error)
    }
}

impl From<csv::Error> for HpvError {
    fn from(error: csv::Error) -> Self {
        HpvError::CsvError(error)
    }
}

impl std::error::Error for HpvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HpvError::IoError(error) => Some(error),
            HpvError::JsonError(error) => Some(error),
            HpvError::CsvError(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for HpvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HpvError::IoError(error) => write!(f, "I/O error: {error}"),
            HpvError::JsonError(error) => write!(f, "invalid parameter file: {error}"),
            HpvError::CsvError(error) => write!(f, "invalid table file: {error}"),
            HpvError::ConfigError(message) => write!(f, "configuration error: {message}"),
            HpvError::TableError(message) => write!(f, "reference table error: {message}"),
            HpvError::LoggingError(message) => write!(f, "logging error: {message}"),
        }
    }
}
