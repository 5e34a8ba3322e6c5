//! Renderer configuration
//!
//! Stored as RON so it can be edited by hand next to the application.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rasterizer::{FrontFace, DEFAULT_CAPACITY};

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    #[error("Serialize error: {0}")]
    SerializeError(#[from] ron::Error),
}

/// Settings a context is created with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Vertices cached by the immediate-mode stream before it flushes,
    /// at least 3
    pub immediate_capacity: usize,
    /// Largest accepted texture width or height
    pub max_texture_size: usize,
    /// Initial state of perspective-correct texturing
    pub perspective_correct: bool,
    /// Initial state of the depth test
    pub depth_test: bool,
    pub front_face: FrontFace,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            immediate_capacity: DEFAULT_CAPACITY,
            max_texture_size: 4096,
            perspective_correct: true,
            depth_test: false,
            front_face: FrontFace::Ccw,
        }
    }
}

impl RenderConfig {
    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    /// Load a configuration from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let config = ron::ser::PrettyConfig::new().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Save the configuration to a RON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = RenderConfig::from_ron_str("(immediate_capacity: 8, front_face: Cw)").unwrap();
        assert_eq!(config.immediate_capacity, 8);
        assert_eq!(config.front_face, FrontFace::Cw);
        assert_eq!(config.max_texture_size, 4096);
        assert!(config.perspective_correct);
        assert!(!config.depth_test);
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let config = RenderConfig { depth_test: true, max_texture_size: 256, ..Default::default() };
        let text = config.to_ron_string().unwrap();
        assert!(text.contains("max_texture_size: 256"));
        assert_eq!(RenderConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = RenderConfig::from_ron_str("(immediate_capacity: \"many\")").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RenderConfig::load("/nonexistent/pico-raster.ron").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
