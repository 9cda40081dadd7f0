use crate::CubeCount;
use crate::config::{GlobalConfig, Logger, profiling::ProfilingLogLevel};
use std::sync::Arc;
use std::time::Instant;

/// Logs executed kernels when profiling is enabled.
#[derive(Debug)]
pub struct ServerLogger {
    level: ProfilingLogLevel,
    logger: spin::Mutex<Logger>,
}

impl Default for ServerLogger {
    fn default() -> Self {
        Self::new(GlobalConfig::get())
    }
}

impl ServerLogger {
    /// Create a logger from the given configuration.
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let logger = Logger::new(&config.profiling.logger);
        let level = match logger.is_enabled() {
            true => config.profiling.logger.level,
            false => ProfilingLogLevel::Disabled,
        };

        Self {
            level,
            logger: spin::Mutex::new(logger),
        }
    }

    /// The configured profiling level.
    pub fn profile_level(&self) -> ProfilingLogLevel {
        self.level
    }

    /// Starts timing an execution, if profiling is enabled.
    pub fn start(&self) -> Option<Instant> {
        match self.level {
            ProfilingLogLevel::Disabled => None,
            _ => Some(Instant::now()),
        }
    }

    /// Logs a kernel execution started with [ServerLogger::start].
    pub fn register_execution(
        &self,
        start: Option<Instant>,
        name: &str,
        cube_count: CubeCount,
        cube_offset: u64,
    ) {
        let Some(start) = start else {
            return;
        };
        let duration = start.elapsed();

        let message = match self.level {
            ProfilingLogLevel::Disabled => return,
            ProfilingLogLevel::Basic => format!("{name} took {duration:?}"),
            ProfilingLogLevel::Full => format!(
                "{name} took {duration:?} with cube count ({}, {}, {}) at offset {cube_offset}",
                cube_count.x, cube_count.y, cube_count.z
            ),
        };
        self.logger.lock().log(&message);
    }
}
