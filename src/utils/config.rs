use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::level_filters::LevelFilter;

use crate::core::{DEFAULT_JPEG_QUALITY, DEFAULT_SENSITIVITY};
use crate::validation::ConfigError;

/// System-wide configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Change detector settings
    #[serde(default)]
    pub change_detection: ChangeDetectionConfig,
    /// Log verbosity used when no environment filter is set
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Change detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectionConfig {
    /// Fraction of the frame that must change before a capture is flagged (0-1)
    pub sensitivity: f64,
    /// Quality of re-encoded JPEG output (1-100)
    pub jpeg_quality: u8,
    /// RGB color of the boxes drawn around changed regions
    pub annotation_color: [u8; 3],
}

/// Logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    /// No logging
    None,
    /// Error messages only
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and info messages
    #[default]
    Info,
    /// All messages including debug
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::None => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            change_detection: ChangeDetectionConfig::default(),
            log_level: LogLevel::Info,
        }
    }
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            annotation_color: [0, 255, 0],
        }
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Whether configuration is valid
    pub is_valid: bool,
    /// Validation errors
    pub errors: Vec<ConfigError>,
    /// Validation warnings
    pub warnings: Vec<String>,
}

/// Loads, validates and persists the system configuration
#[derive(Debug, Default)]
pub struct ConfigurationManager {
    /// Current system configuration
    system_config: SystemConfig,
    /// Configuration file path
    config_file_path: Option<String>,
    /// Whether configuration has been modified
    is_modified: bool,
}

impl ConfigurationManager {
    /// Create a new configuration manager with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration manager and load from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    /// Get current system configuration
    pub fn get_system_config(&self) -> &SystemConfig {
        &self.system_config
    }

    /// Replace the system configuration after validation
    pub fn update_system_config(&mut self, config: SystemConfig) -> Result<(), ConfigError> {
        Self::ensure_valid(Self::validate_system_config(&config))?;
        self.system_config = config;
        self.is_modified = true;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: SystemConfig = serde_json::from_str(&content).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to parse config file '{}': {}", path_str, e),
        })?;

        Self::ensure_valid(Self::validate_system_config(&config))?;

        self.system_config = config;
        self.config_file_path = Some(path_str);
        self.is_modified = false;
        Ok(())
    }

    /// Save configuration to JSON file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = serde_json::to_string_pretty(&self.system_config).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::Io {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })?;

        self.config_file_path = Some(path_str);
        self.is_modified = false;
        Ok(())
    }

    /// Save to the currently loaded file path
    pub fn save(&mut self) -> Result<(), ConfigError> {
        match self.config_file_path.clone() {
            Some(path) => self.save_to_file(path),
            None => Err(ConfigError::Io {
                message: "No file path set for saving configuration".to_string(),
            }),
        }
    }

    /// Check if configuration has been modified since last save
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    /// Update change sensitivity, returning the previous value
    pub fn set_sensitivity(&mut self, sensitivity: f64) -> Result<f64, ConfigError> {
        if let Some(error) = Self::check_sensitivity(sensitivity) {
            return Err(error);
        }
        let old_value = self.system_config.change_detection.sensitivity;
        self.system_config.change_detection.sensitivity = sensitivity;
        self.is_modified = true;
        Ok(old_value)
    }

    /// Validate a configuration, collecting every problem
    pub fn validate_system_config(config: &SystemConfig) -> ValidationResult {
        let mut result = ValidationResult::default();
        let detection = &config.change_detection;

        if let Some(error) = Self::check_sensitivity(detection.sensitivity) {
            result.errors.push(error);
        } else if detection.sensitivity < 0.01 {
            result.warnings.push(format!(
                "Sensitivity {} flags almost any capture as changed",
                detection.sensitivity
            ));
        }

        if detection.jpeg_quality == 0 || detection.jpeg_quality > 100 {
            result.errors.push(ConfigError::InvalidParameter {
                parameter: "change_detection.jpeg_quality".to_string(),
                value: detection.jpeg_quality.to_string(),
                reason: "JPEG quality must be between 1 and 100".to_string(),
            });
        } else if detection.jpeg_quality < 50 {
            result.warnings.push("Low JPEG quality may hide annotations".to_string());
        }

        result.is_valid = result.errors.is_empty();
        result
    }

    fn check_sensitivity(sensitivity: f64) -> Option<ConfigError> {
        if sensitivity > 0.0 && sensitivity < 1.0 {
            None
        } else {
            Some(ConfigError::InvalidParameter {
                parameter: "change_detection.sensitivity".to_string(),
                value: sensitivity.to_string(),
                reason: "Sensitivity must lie strictly between 0 and 1".to_string(),
            })
        }
    }

    fn ensure_valid(validation: ValidationResult) -> Result<(), ConfigError> {
        match validation.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
