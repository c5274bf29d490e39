/*!

Logging setup. Library code only talks to the `log` facade (`trace!` for per-person events,
`debug!` for monthly summaries, `info!` for run milestones); a driver decides whether and how
loudly to print by calling one of the functions here, which install a `log4rs` console logger.

*/

use crate::error::HpvError;
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    Handle,
};
use std::sync::Mutex;

pub use log::LevelFilter;

const DEFAULT_PATTERN: &str = "{h({l})} {M} - {m}{n}";

// `log` only accepts one global logger, so later calls reconfigure through the handle.
static LOG_HANDLE: Mutex<Option<Handle>> = Mutex::new(None);

fn build_config(level: LevelFilter) -> Result<Config, HpvError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(DEFAULT_PATTERN)))
        .build();

    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|error| HpvError::LoggingError(error.to_string()))
}

/// Installs the console logger, or changes its level if it is already installed.
pub fn set_log_level(level: LevelFilter) -> Result<(), HpvError> {
    let config = build_config(level)?;
    let mut handle = LOG_HANDLE
        .lock()
        .map_err(|error| HpvError::LoggingError(error.to_string()))?;

    match handle.as_ref() {
        Some(handle) => handle.set_config(config),
        None => {
            let new_handle = log4rs::init_config(config)
                .map_err(|error| HpvError::LoggingError(error.to_string()))?;
            *handle = Some(new_handle);
        }
    }
    Ok(())
}

/// Logs everything down to `trace`.
pub fn enable_logging() -> Result<(), HpvError> {
    set_log_level(LevelFilter::Trace)
}

pub fn disable_logging() -> Result<(), HpvError> {
    set_log_level(LevelFilter::Off)
}
