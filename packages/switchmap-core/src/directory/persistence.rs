//! JSON file store for the device directory.
//!
//! The file is replaced atomically on save so a failed pass never leaves a
//! half-written directory behind.

use super::{DeviceDirectory, DirectoryStore, StoreError};
use std::path::{Path, PathBuf};

const DIRECTORY_FILE: &str = "directory.json";

/// `<data dir>/switchmap/directory.json`
pub fn default_directory_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("switchmap").join(DIRECTORY_FILE))
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform default location
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(default_directory_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl DirectoryStore for JsonFileStore {
    fn load(&self) -> Result<DeviceDirectory, StoreError> {
        if !self.path.exists() {
            tracing::debug!("No directory file at {:?}, starting empty", self.path);
            return Ok(DeviceDirectory::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let directory: DeviceDirectory =
            serde_json::from_str(&content).map_err(|e| StoreError::Json {
                path: self.path.display().to_string(),
                source: e,
            })?;

        tracing::info!(
            "Loaded directory: {} switches, {} devices, last discovery: {}",
            directory.switches().len(),
            directory.devices().len(),
            directory
                .last_discovery()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );

        Ok(directory)
    }

    fn save(&self, directory: &DeviceDirectory) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(directory).map_err(|e| StoreError::Json {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(
            "Saved directory: {} devices to {:?}",
            directory.devices().len(),
            self.path
        );

        Ok(())
    }
}
