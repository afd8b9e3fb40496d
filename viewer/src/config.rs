//! Viewer configuration.

use std::path::PathBuf;

use crate::loader::ProjectionMode;
use crate::permission::PermissionPreset;

/// Application id used for the settings deep link.
pub const DEFAULT_PACKAGE_ID: &str = "pkg.myapp";

/// Panorama shown when the activation intent does not name one.
pub const DEFAULT_FILE_NAME: &str = "sample.jpg";

/// Runtime configuration for one viewer process.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Application package id.
    pub package_id: String,
    /// Root of the bundled asset namespace.
    pub asset_root: PathBuf,
    /// Asset named in the default activation intent.
    pub file_name: String,
    /// Projection the panorama is encoded in. Never inferred.
    pub projection_mode: ProjectionMode,
    /// How the simulated user answers permission prompts (headless only).
    pub permission: PermissionPreset,
    /// Event loop poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Exit after N seconds.
    pub exit_after: Option<u64>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            package_id: DEFAULT_PACKAGE_ID.to_string(),
            asset_root: PathBuf::from("assets"),
            file_name: DEFAULT_FILE_NAME.to_string(),
            projection_mode: ProjectionMode::Mono,
            permission: PermissionPreset::Granted,
            poll_interval_ms: 100,
            exit_after: None,
        }
    }
}
