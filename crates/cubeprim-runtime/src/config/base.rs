use super::{device::DeviceConfig, profiling::ProfilingConfig};
use std::path::Path;
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static PRIM_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// The global configuration of cubeprim, combining device limits and profiling settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Device limits and worker settings used by the default compute client.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Configuration for profiling executed kernels.
    #[serde(default)]
    pub profiling: ProfilingConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `cubeprim.toml` or `CubePrim.toml`
    /// in the current directory or its parents. If no file is found, a default configuration is
    /// used. Environment variables are applied on top, see [GlobalConfig::override_from_env].
    pub fn get() -> Arc<Self> {
        let mut state = PRIM_GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Warning
    ///
    /// This method must be called at the start of the program, before any calls to `get`.
    /// Attempting to set the configuration after it has been initialized will cause a panic.
    pub fn set(config: Self) {
        let mut state = PRIM_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref()).map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }

    /// Overrides configuration fields based on environment variables.
    ///
    /// - `CUBEPRIM_DEBUG_LOG`: `stdout`, `stderr`, `1`/`true` (log to `/tmp/cubeprim.log`),
    ///   `0`/`false` (disable), or a file path.
    /// - `CUBEPRIM_DEBUG_OPTION`: `profile` or `profile-full`.
    /// - `CUBEPRIM_WORKERS`: number of worker threads.
    pub fn override_from_env(self) -> Self {
        self.override_from(|key| std::env::var(key).ok())
    }

    fn override_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        use super::profiling::ProfilingLogLevel;

        if let Some(val) = var("CUBEPRIM_DEBUG_LOG") {
            self.profiling.logger.level = ProfilingLogLevel::Basic;

            match val.as_str() {
                "stdout" => self.profiling.logger.stdout = true,
                "stderr" => self.profiling.logger.stderr = true,
                "1" | "true" => self.profiling.logger.file = Some("/tmp/cubeprim.log".into()),
                "0" | "false" => self.profiling.logger.level = ProfilingLogLevel::Disabled,
                file_path => self.profiling.logger.file = Some(file_path.into()),
            }
        }

        if let Some(val) = var("CUBEPRIM_DEBUG_OPTION") {
            match val.as_str() {
                "profile" => self.profiling.logger.level = ProfilingLogLevel::Basic,
                "profile-full" => self.profiling.logger.level = ProfilingLogLevel::Full,
                _ => {}
            }
        }

        if let Some(val) = var("CUBEPRIM_WORKERS") {
            match val.parse::<usize>() {
                Ok(workers) if workers > 0 => self.device.workers = Some(workers),
                _ => log::warn!("Ignoring invalid CUBEPRIM_WORKERS value {val:?}"),
            }
        }

        self
    }

    // Loads configuration from `cubeprim.toml` or `CubePrim.toml` in the current directory or its
    // parents, falling back to the default configuration.
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            for name in ["cubeprim.toml", "CubePrim.toml"] {
                if let Some(config) = Self::from_file_path(dir.join(name)) {
                    return config;
                }
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    fn from_file_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let content = std::fs::read_to_string(path.as_ref()).ok()?;

        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                log::warn!(
                    "Ignoring {}, it doesn't have the right format => {err}",
                    path.as_ref().display()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profiling::ProfilingLogLevel;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: GlobalConfig = toml::from_str(
            r#"
            [device]
            plane_dim = 64
            max_cube_count = [16, 4, 2]

            [profiling.logger]
            level = "full"
            stderr = true
            "#,
        )
        .unwrap();

        assert_eq!(config.device.plane_dim, 64);
        assert_eq!(config.device.max_cube_count, (16, 4, 2));
        assert_eq!(config.device.max_units_per_cube, 1024);
        assert_eq!(config.profiling.logger.level, ProfilingLogLevel::Full);
        assert!(config.profiling.logger.stderr);
        assert!(config.profiling.logger.append);
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars = HashMap::from([
            ("CUBEPRIM_DEBUG_LOG", "stdout"),
            ("CUBEPRIM_DEBUG_OPTION", "profile-full"),
            ("CUBEPRIM_WORKERS", "3"),
        ]);
        let config = GlobalConfig::default()
            .override_from(|key| vars.get(key).map(|val| val.to_string()));

        assert!(config.profiling.logger.stdout);
        assert_eq!(config.profiling.logger.level, ProfilingLogLevel::Full);
        assert_eq!(config.device.workers, Some(3));
    }

    #[test]
    fn invalid_worker_count_is_ignored() {
        let config = GlobalConfig::default().override_from(|key| {
            (key == "CUBEPRIM_WORKERS").then(|| "zero".to_string())
        });

        assert_eq!(config.device.workers, None);
    }

    #[test]
    #[serial_test::serial]
    fn global_config_is_loaded_once() {
        let first = GlobalConfig::get();
        let second = GlobalConfig::get();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn roundtrips_through_toml() {
        let mut config = GlobalConfig::default();
        config.device.workers = Some(2);

        let content = toml::to_string_pretty(&config).unwrap();
        let parsed: GlobalConfig = toml::from_str(&content).unwrap();

        assert_eq!(parsed.device.workers, Some(2));
        assert_eq!(parsed.device.max_cube_count, config.device.max_cube_count);
    }
}
