//! JSON setup files: dictionary location plus calibration tuning.

use crate::{CalibrationConfig, CalibrationOrchestrator, ConfigError};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tapatan_vision_aruco::{Dictionary, DictionaryError};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything needed to calibrate one installation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSetup {
    /// Marker dictionary JSON. Relative paths are resolved against the
    /// directory of the setup file when loaded with [`load_json`](Self::load_json).
    pub dictionary_path: PathBuf,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl CalibrationSetup {
    pub fn new(dictionary_path: impl Into<PathBuf>, calibration: CalibrationConfig) -> Self {
        Self {
            dictionary_path: dictionary_path.into(),
            calibration,
        }
    }

    /// Load a JSON setup from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut setup: Self = serde_json::from_str(&raw)?;
        if setup.dictionary_path.is_relative() {
            if let Some(dir) = path.parent() {
                setup.dictionary_path = dir.join(&setup.dictionary_path);
            }
        }
        Ok(setup)
    }

    /// Write this setup to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_dictionary(&self) -> Result<Dictionary, IoError> {
        Ok(Dictionary::load_json(&self.dictionary_path)?)
    }

    /// Load the dictionary and build a validated orchestrator.
    pub fn build_orchestrator(&self) -> Result<CalibrationOrchestrator, IoError> {
        let dictionary = self.load_dictionary()?;
        Ok(CalibrationOrchestrator::new(
            self.calibration.clone(),
            dictionary,
        )?)
    }
}
