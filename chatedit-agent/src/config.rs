//! Orchestrator limits

use chatedit_runtime::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::warn;

pub const EDIT_CYCLES_RANGE: RangeInclusive<usize> = 1..=7;
pub const CHAT_CYCLES_RANGE: RangeInclusive<usize> = 10..=20;
pub const PROMPT_ATTEMPTS_RANGE: RangeInclusive<usize> = 1..=3;

/// Configuration for the orchestrator.
///
/// Every limit is clamped into its allowed range on construction and after
/// loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Edit cycles per chat cycle
    pub max_edit_cycles: usize,
    /// Completed chat cycles shown to the model
    pub max_chat_cycles: usize,
    /// Model replies per edit cycle
    pub max_prompt_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_edit_cycles: 4,
            max_chat_cycles: 15,
            max_prompt_attempts: 2,
        }
    }
}

impl Config {
    pub fn new(max_edit_cycles: usize, max_chat_cycles: usize, max_prompt_attempts: usize) -> Self {
        Self {
            max_edit_cycles,
            max_chat_cycles,
            max_prompt_attempts,
        }
        .clamped()
    }

    /// Pull every limit into its range
    pub fn clamped(self) -> Self {
        Self {
            max_edit_cycles: clamp("max_edit_cycles", self.max_edit_cycles, EDIT_CYCLES_RANGE),
            max_chat_cycles: clamp("max_chat_cycles", self.max_chat_cycles, CHAT_CYCLES_RANGE),
            max_prompt_attempts: clamp(
                "max_prompt_attempts",
                self.max_prompt_attempts,
                PROMPT_ATTEMPTS_RANGE,
            ),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json).map_err(|e| {
            Error::config_invalid(format!("invalid config: {}", e))
                .with_operation("Config::from_json")
                .set_source(e)
        })?;
        Ok(config.clamped())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("Config::from_file")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_json(&json)
    }
}

fn clamp(name: &str, value: usize, range: RangeInclusive<usize>) -> usize {
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        warn!(
            setting = name,
            value,
            clamped,
            "config value out of range {}..={}",
            range.start(),
            range.end()
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatedit_runtime::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_edit_cycles, 4);
        assert_eq!(config.max_chat_cycles, 15);
        assert_eq!(config.max_prompt_attempts, 2);
        assert_eq!(config, config.clamped());
    }

    #[test]
    fn test_clamping() {
        let config = Config::new(0, 100, 9);
        assert_eq!(config, Config::new(1, 20, 3));
        assert_eq!(Config::new(7, 10, 1).max_edit_cycles, 7);
    }

    #[test]
    fn test_from_json() {
        let config = Config::from_json(r#"{"max_edit_cycles": 12}"#).unwrap();
        assert_eq!(config.max_edit_cycles, 7);
        assert_eq!(config.max_chat_cycles, 15);

        let err = Config::from_json("{\"max_edit_cycles\": \"many\"}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_prompt_attempts": 3, "max_chat_cycles": 12}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config, Config::new(4, 12, 3));

        let err = Config::from_file("/nonexistent/chatedit.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }
}
