//! Device identification for `INFO`.
//!
//! The 27-byte record is assembled from three backup registers plus the
//! two-byte firmware version file on the settings partition.

use std::path::PathBuf;

use crate::adapters::backup_props::{
    BACKUP_ID_MODEL_CODE, BACKUP_ID_MODEL_NAME, BACKUP_ID_SERIAL,
};
use crate::caps::{CapError, CapResult, DeviceInfoSource, SharedBackup};
use crate::shell::wire::DeviceInfoRecord;

pub struct BackupDeviceInfo {
    backup: SharedBackup,
    version_file: PathBuf,
}

impl BackupDeviceInfo {
    pub fn new(backup: SharedBackup, version_file: PathBuf) -> Self {
        Self {
            backup,
            version_file,
        }
    }

    fn read_fixed<const N: usize>(&mut self, id: u32) -> CapResult<[u8; N]> {
        let data = self.backup.borrow_mut().read(id)?;
        data.try_into()
            .map_err(|_| CapError::Failed("unexpected register size"))
    }
}

impl DeviceInfoSource for BackupDeviceInfo {
    fn device_info(&mut self) -> CapResult<DeviceInfoRecord> {
        let model = self.read_fixed::<16>(BACKUP_ID_MODEL_NAME)?;
        let product = self.read_fixed::<5>(BACKUP_ID_MODEL_CODE)?;
        let serial = self.read_fixed::<4>(BACKUP_ID_SERIAL)?;

        let version = std::fs::read(&self.version_file)?;
        let version: [u8; 2] = version
            .try_into()
            .map_err(|_| CapError::Failed("wrong version file size"))?;

        Ok(DeviceInfoRecord {
            model,
            product,
            serial,
            firmware: u16::from_le_bytes(version),
        })
    }
}
