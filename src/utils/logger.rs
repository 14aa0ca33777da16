//! Logger utility for application-wide logging
//!
//! The `log` facade is backed by `env_logger`. A `Logger` value also keeps
//! an optional report file that commands append their results to.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use log::LevelFilter;

/// Report sink shared by the CLI commands
pub struct Logger {
    /// File handle for report output
    file: Mutex<Option<File>>,
}

impl Logger {
    /// Creates a logger that writes reports to `log_file`
    pub fn new(log_file: &str) -> io::Result<Self> {
        let file = File::create(Path::new(log_file))?;
        Ok(Logger {
            file: Mutex::new(Some(file)),
        })
    }

    /// Logger that only reports through the `log` facade
    pub fn disabled() -> Self {
        Logger {
            file: Mutex::new(None),
        }
    }

    /// Appends a line to the report file
    pub fn log(&self, message: &str) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "logger mutex poisoned"))?;
        if let Some(file) = guard.as_mut() {
            writeln!(file, "{}", message)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Maps `-v` occurrences to a level filter
    pub fn level_for(verbosity: u8) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Installs the global `env_logger` backend
    ///
    /// `RUST_LOG` still overrides the level per module. When `log_file` is
    /// given, records go there instead of stderr.
    pub fn init_global_logger(verbosity: u8, log_file: Option<&str>) -> io::Result<()> {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(Self::level_for(verbosity)).parse_default_env();
        if let Some(path) = log_file {
            let file = File::create(Path::new(path))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        if builder.try_init().is_err() {
            eprintln!("Warning: Global logger was already initialized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Logger::level_for(0), LevelFilter::Warn);
        assert_eq!(Logger::level_for(2), LevelFilter::Debug);
        assert_eq!(Logger::level_for(9), LevelFilter::Trace);
    }

    #[test]
    fn test_report_lines_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.log");
        let logger = Logger::new(path.to_str().unwrap()).unwrap();
        logger.log("first").unwrap();
        logger.log("second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert!(Logger::disabled().log("dropped").is_ok());
    }
}
