#![deny(missing_docs)]
//! Shared logging utilities for the artmark workspace.
//!
//! Every crate logs through the `artmark_*` macros so the output can be filtered
//! by the single `artmark` target. A logging failure never reaches control flow:
//! the macros forward to the `log` facade, which drops records when no logger is set.

use std::fs::File;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

#[doc(hidden)]
pub use log;

/// Log target shared by all engine records.
pub const TARGET: &str = "artmark";

/// Logs a trace-level message under the `artmark` target.
#[macro_export]
macro_rules! artmark_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs a debug-level message under the `artmark` target.
#[macro_export]
macro_rules! artmark_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs an info-level message under the `artmark` target.
#[macro_export]
macro_rules! artmark_info {
    ($($arg:tt)*) => {{
        $crate::log::info!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs a warn-level message under the `artmark` target.
#[macro_export]
macro_rules! artmark_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs an error-level message under the `artmark` target.
#[macro_export]
macro_rules! artmark_error {
    ($($arg:tt)*) => {{
        $crate::log::error!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    /// Write to ./artmark.log in current directory.
    File,
    /// Write to terminal (stderr for warnings and errors, stdout otherwise).
    Terminal,
    /// Write to both file and terminal.
    Both,
}

/// Initialize the global logger with the given destination and level.
///
/// Calling this twice is harmless: the second call leaves the first logger in place.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = build_config();

    let loggers: Vec<Box<dyn SharedLogger>> = match destination {
        LogDestination::File => match create_file_logger(level, config) {
            Some(file_logger) => vec![file_logger],
            None => return,
        },
        LogDestination::Terminal => {
            vec![TermLogger::new(
                level,
                config,
                TerminalMode::Mixed,
                ColorChoice::Auto,
            )]
        }
        LogDestination::Both => {
            let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
                level,
                config.clone(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            )];
            if let Some(file_logger) = create_file_logger(level, config) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    let _ = CombinedLogger::init(loggers);
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(level: LevelFilter, config: Config) -> Option<Box<WriteLogger<File>>> {
    let log_path = PathBuf::from("./artmark.log");
    match File::create(&log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}
