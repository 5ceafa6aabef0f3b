use edvm_types::constants::DEFAULT_MEMORY_SIZE;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IOError: {0}")]
    Io(#[from] io::Error),
    #[error("SerdeJsonError: {0}")]
    Json(#[from] serde_json::Error),
}

/// Construction-time machine settings. The debug toggles are observability
/// only and never change execution semantics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VmConfig {
    /// RAM size in octets.
    pub memory_size: usize,
    /// Default base address for program loads.
    pub load_base: u64,
    /// Raise per-instruction trace verbosity.
    pub debug: bool,
    /// Pause between instructions while running.
    pub step_by_step: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            load_base: 0,
            debug: false,
            step_by_step: false,
        }
    }
}

impl VmConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
