use core::fmt::Display;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Where the messages of a [Logger] go, and how verbose they are.
///
/// Every enabled destination receives every message.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// File receiving the messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Keep the previous content of `file`. Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Print messages to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Print messages to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Forward messages to the `log` crate at the given level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogCrateLevel>,

    /// Verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

fn append_default() -> bool {
    true
}

/// Level used when forwarding messages to the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// `log::info!`
    #[default]
    #[serde(rename = "info")]
    Info,
    /// `log::debug!`
    #[serde(rename = "debug")]
    Debug,
    /// `log::trace!`
    #[serde(rename = "trace")]
    Trace,
}

/// Verbosity levels of a [LoggerConfig].
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
    /// Whether nothing should be logged at this level.
    fn is_disabled(&self) -> bool;
}

/// Writes messages to the destinations of a [LoggerConfig].
#[derive(Debug, Default)]
pub struct Logger {
    sinks: Vec<Sink>,
}

#[derive(Debug)]
enum Sink {
    File(BufWriter<File>),
    Stdout,
    Stderr,
    Log(LogCrateLevel),
}

impl Logger {
    /// Opens the destinations of `config`, or none when its level is disabled.
    ///
    /// A file that can't be opened is skipped with a warning.
    pub fn new<L: LogLevel>(config: &LoggerConfig<L>) -> Self {
        if config.level.is_disabled() {
            return Self::default();
        }

        let mut sinks = Vec::new();
        if let Some(path) = &config.file {
            match open_file(path, config.append) {
                Ok(file) => sinks.push(Sink::File(BufWriter::new(file))),
                Err(err) => log::warn!("Can't open log file {}: {err}", path.display()),
            }
        }
        if config.stdout {
            sinks.push(Sink::Stdout);
        }
        if config.stderr {
            sinks.push(Sink::Stderr);
        }
        if let Some(level) = config.log {
            sinks.push(Sink::Log(level));
        }

        Self { sinks }
    }

    /// Whether messages go anywhere.
    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Writes `message` to every destination.
    pub fn log<S: Display>(&mut self, message: &S) {
        for sink in self.sinks.iter_mut() {
            match sink {
                Sink::File(writer) => {
                    // Flushed per message, the file is read while the program runs.
                    if let Err(err) = writeln!(writer, "{message}").and_then(|_| writer.flush()) {
                        log::warn!("Can't write to the log file: {err}");
                    }
                }
                Sink::Stdout => println!("{message}"),
                Sink::Stderr => eprintln!("{message}"),
                Sink::Log(LogCrateLevel::Info) => log::info!("{message}"),
                Sink::Log(LogCrateLevel::Debug) => log::debug!("{message}"),
                Sink::Log(LogCrateLevel::Trace) => log::trace!("{message}"),
            }
        }
    }
}

fn open_file(path: &Path, append: bool) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .append(append)
        .truncate(!append)
        .create(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profiling::ProfilingLogLevel;

    #[test]
    fn every_destination_is_opened() {
        let config = LoggerConfig {
            stdout: true,
            log: Some(LogCrateLevel::Debug),
            level: ProfilingLogLevel::Basic,
            ..Default::default()
        };

        let logger = Logger::new(&config);

        assert_eq!(logger.sinks.len(), 2);
    }

    #[test]
    fn disabled_level_has_no_destination() {
        let config = LoggerConfig::<ProfilingLogLevel> {
            stdout: true,
            ..Default::default()
        };

        assert!(!Logger::new(&config).is_enabled());
    }

    #[test]
    fn file_receives_messages() {
        let path = std::env::temp_dir().join(format!("cubeprim-logger-{}.log", std::process::id()));
        let config = LoggerConfig {
            file: Some(path.clone()),
            append: false,
            level: ProfilingLogLevel::Basic,
            ..Default::default()
        };

        let mut logger = Logger::new(&config);
        logger.log(&"scan_kernel 12µs");

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(content.trim(), "scan_kernel 12µs");
    }
}
