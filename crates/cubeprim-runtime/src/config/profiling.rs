use super::logger::{LogLevel, LoggerConfig};

/// Configuration for profiling settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProfilingConfig {
    /// Logger configuration for profiling logs, using profiling-specific log levels.
    #[serde(default)]
    pub logger: LoggerConfig<ProfilingLogLevel>,
}

/// Log levels for profiling.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProfilingLogLevel {
    /// Profiling logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// Logs every executed kernel with its duration.
    #[serde(rename = "basic")]
    Basic,

    /// Also logs the cube count and offset of every launch.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for ProfilingLogLevel {
    fn is_disabled(&self) -> bool {
        matches!(self, ProfilingLogLevel::Disabled)
    }
}
