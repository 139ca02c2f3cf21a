//! Compiler configuration: parse options and logging loaded from ~/.tdl/config.yaml.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::dsl::ParseOptions;
use crate::timeline::{BeatUnit, Tempo};

/// Compiler configuration loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdlConfig {
    /// Log level for the command-line front end (`off`, `error` ... `trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Frame rate for SMPTE timecodes.
    #[serde(default = "default_fps")]
    pub smpte_fps: f64,
    /// Fail on bar positions and event references that resolve to nothing.
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Quarter-note BPM used before the first tempo mark.
    #[serde(default = "default_bpm")]
    pub default_bpm: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fps() -> f64 {
    25.0
}

fn default_strict() -> bool {
    true
}

fn default_bpm() -> f64 {
    crate::timeline::DEFAULT_BPM
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Yaml(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Yaml(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e)
    }
}

impl TdlConfig {
    /// Standard config path (~/.tdl/config.yaml).
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::home_dir()?.join(".tdl").join("config.yaml"))
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist or doesn't parse (graceful fallback).
    pub fn load() -> Option<Self> {
        Self::load_optional(&Self::default_path()?)
    }

    fn load_optional(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.smpte_fps.is_finite() && self.smpte_fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "smpte_fps must be positive, got {}",
                self.smpte_fps
            )));
        }
        if Tempo::new(self.default_bpm, BeatUnit::QUARTER).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default_bpm must be positive, got {}",
                self.default_bpm
            )));
        }
        self.level_filter().map(|_| ())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }

    /// Options for [`Compiler::with_options`](crate::dsl::Compiler::with_options).
    ///
    /// Out-of-range values fall back to the defaults.
    pub fn parse_options(&self) -> ParseOptions {
        let defaults = ParseOptions::default();
        ParseOptions {
            smpte_fps: if self.smpte_fps.is_finite() && self.smpte_fps > 0.0 {
                self.smpte_fps
            } else {
                defaults.smpte_fps
            },
            strict: self.strict,
            default_tempo: Tempo::new(self.default_bpm, BeatUnit::QUARTER)
                .unwrap_or(defaults.default_tempo),
        }
    }
}

impl Default for TdlConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            smpte_fps: default_fps(),
            strict: default_strict(),
            default_bpm: default_bpm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config() {
        let config = TdlConfig::default();
        assert_eq!(config.log_level, "info");
        assert_approx_eq!(config.smpte_fps, 25.0);
        assert!(config.strict);
        assert_approx_eq!(config.default_bpm, 60.0);
        assert_eq!(config.parse_options(), ParseOptions::default());
    }

    #[test]
    fn serialize_deserialize() {
        let config = TdlConfig {
            smpte_fps: 30.0,
            strict: false,
            ..TdlConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: TdlConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: TdlConfig = serde_yaml::from_str("strict: false\n").unwrap();
        assert!(!config.strict);
        assert_eq!(config.log_level, "info");
        assert_approx_eq!(config.smpte_fps, 25.0);
    }

    #[test]
    fn parse_options_carry_values() {
        let config = TdlConfig {
            smpte_fps: 24.0,
            strict: false,
            default_bpm: 120.0,
            ..TdlConfig::default()
        };
        let options = config.parse_options();
        assert_approx_eq!(options.smpte_fps, 24.0);
        assert!(!options.strict);
        assert_approx_eq!(options.default_tempo.beat_ms(), 500.0);
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log_level: debug\nsmpte_fps: 30").unwrap();
        let config = TdlConfig::load_from(file.path()).unwrap();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);
        assert_approx_eq!(config.smpte_fps, 30.0);
    }

    #[test]
    fn load_from_rejects_bad_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "smpte_fps: 0").unwrap();
        assert!(matches!(
            TdlConfig::load_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log_level: loud").unwrap();
        assert!(matches!(
            TdlConfig::load_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "strict: [").unwrap();
        assert!(matches!(
            TdlConfig::load_from(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TdlConfig::load_from(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn load_optional_falls_back_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.yaml");
        assert!(TdlConfig::load_optional(&missing).is_none());
        assert_eq!(
            TdlConfig::load_optional(&missing).unwrap_or_default(),
            TdlConfig::default()
        );

        std::fs::write(&missing, "strict: [").unwrap();
        assert!(TdlConfig::load_optional(&missing).is_none());

        std::fs::write(&missing, "strict: false\n").unwrap();
        let config = TdlConfig::load_optional(&missing).unwrap();
        assert!(!config.strict);
    }
}
