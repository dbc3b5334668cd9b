use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration loaded from TOML config file.
/// All fields have defaults, so the config file is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base directory everything else is resolved against.
    pub data_dir: PathBuf,
    /// Subdirectory of `data_dir` holding the input MIDI files.
    pub midi_subdir: String,
    /// Subdirectory of `data_dir` receiving one feature table per song.
    pub representations_subdir: String,
    /// Combined PCA table, relative to `data_dir`.
    pub output_file: String,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    pub extract: ExtractConfig,
    pub reduce: ReduceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            midi_subdir: "midi_files".to_string(),
            representations_subdir: "song_representations".to_string(),
            output_file: "pcas.csv".to_string(),
            workers: 0,
            extract: ExtractConfig::default(),
            reduce: ReduceConfig::default(),
        }
    }
}

/// Feature extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Window size in MIDI ticks.
    pub tick_window: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { tick_window: 100 }
    }
}

/// PCA reduction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceConfig {
    /// Principal components kept per song (rows of the summary matrix).
    pub components: usize,
    /// Feature columns kept per component (columns of the summary matrix).
    pub column_cap: usize,
    /// What to do when one song's table can't be reduced.
    pub on_error: FailurePolicy,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            components: 30,
            column_cap: 200,
            on_error: FailurePolicy::ZeroRow,
        }
    }
}

impl ReduceConfig {
    /// Length of every flattened summary vector.
    pub fn vector_len(&self) -> usize {
        self.components * self.column_cap
    }
}

/// Per-song failure handling for the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log and emit the filename with an all-zero vector.
    ZeroRow,
    /// Log and leave the song out of the combined table.
    Skip,
    /// Stop the whole reduction at the first failure.
    Abort,
}

impl AppConfig {
    /// Load config from `~/.config/midiprep/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("{}. Using defaults.", e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], errors are returned.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str::<AppConfig>(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extract.tick_window == 0 {
            return Err(ConfigError::Invalid("extract.tick_window must be > 0".into()));
        }
        if self.reduce.components == 0 {
            return Err(ConfigError::Invalid("reduce.components must be > 0".into()));
        }
        if self.reduce.column_cap == 0 {
            return Err(ConfigError::Invalid("reduce.column_cap must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    pub fn midi_dir(&self) -> PathBuf {
        self.data_dir.join(&self.midi_subdir)
    }

    pub fn representations_dir(&self) -> PathBuf {
        self.data_dir.join(&self.representations_subdir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(&self.output_file)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.extract.tick_window, 100);
        assert_eq!(config.reduce.components, 30);
        assert_eq!(config.reduce.column_cap, 200);
        assert_eq!(config.reduce.vector_len(), 6000);
        assert_eq!(config.reduce.on_error, FailurePolicy::ZeroRow);
        assert_eq!(config.midi_dir(), PathBuf::from("data").join("midi_files"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            data_dir = "/corpus"

            [reduce]
            components = 10
            on_error = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/corpus"));
        assert_eq!(config.reduce.components, 10);
        assert_eq!(config.reduce.column_cap, 200);
        assert_eq!(config.reduce.on_error, FailurePolicy::Skip);
        assert_eq!(config.extract.tick_window, 100);
        assert_eq!(config.output_path(), PathBuf::from("/corpus").join("pcas.csv"));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = AppConfig::default();
        config.extract.tick_window = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = AppConfig::load_from(Path::new("/nonexistent/midiprep.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.reduce.column_cap, config.reduce.column_cap);
        assert_eq!(back.representations_subdir, config.representations_subdir);
    }

    #[test]
    fn test_resolve_workers_explicit() {
        let config = AppConfig {
            workers: 3,
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_workers(), 3);
        assert!(AppConfig::default().resolve_workers() >= 1);
    }
}
