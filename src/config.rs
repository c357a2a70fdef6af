//! Session configuration.
//!
//! Well-known paths of the device the payload runs on. The defaults match
//! the stock firmware layout; integrators override them for models that
//! place the settings partition elsewhere.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Settings/backup partition device node.
    pub settings_device: PathBuf,
    /// Mount point for the settings partition.
    pub settings_mount: PathBuf,
    /// Directory the Android-data backup archive is mounted at.
    pub android_mount: PathBuf,
    /// Two-byte firmware version file on the settings partition.
    pub firmware_version_file: PathBuf,
    /// Pause after the dispatcher exits, before the carrier is released,
    /// so the host can collect the final response.
    pub exit_linger: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            settings_device: PathBuf::from("/dev/nflasha2"),
            settings_mount: PathBuf::from("/setting"),
            android_mount: PathBuf::from("/mnt"),
            firmware_version_file: PathBuf::from("/setting/updater/dat4"),
            exit_linger: Duration::from_millis(500),
        }
    }
}
