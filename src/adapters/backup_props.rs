//! Backup-register-backed properties and tweaks.
//!
//! Device identity and a handful of user-visible toggles live in the
//! persistent backup registers. The register ids and value layouts below
//! follow the stock register map shared across the supported camera
//! generations; anything more exotic (region-dependent language tables,
//! the protection toggle) is device data and comes in through
//! integrator-supplied trait impls instead.

use std::path::{Path, PathBuf};

use crate::caps::{
    BackupError, Property, PropertyEntry, SharedBackup, Tweak, TweakEntry,
};

pub const BACKUP_ID_MODEL_NAME: u32 = 0x003e_0005;
pub const BACKUP_ID_MODEL_CODE: u32 = 0x00e7_0000;
pub const BACKUP_ID_SERIAL: u32 = 0x00e7_0003;
pub const BACKUP_ID_REC_LIMIT: u32 = 0x003c_0373;
pub const BACKUP_ID_REC_LIMIT_4K: u32 = 0x003c_04b6;
pub const BACKUP_ID_PAL_NTSC_SELECTOR: u32 = 0x0107_0148;
pub const BACKUP_ID_USB_APP_INSTALLER: u32 = 0x0164_0001;

pub const MODEL_NAME_LEN: usize = 16;
pub const MODEL_CODE_LEN: usize = 5;
pub const SERIAL_LEN: usize = 4;

/// Read a register and check it has the expected size.
fn read_register(backup: &SharedBackup, id: u32, size: usize) -> Option<Vec<u8>> {
    let data = backup.borrow_mut().read(id).ok()?;
    (data.len() == size).then_some(data)
}

// ── Properties ────────────────────────────────────────────────

/// NUL-padded string register (model name).
pub struct StrBackupProperty {
    backup: SharedBackup,
    id: u32,
    size: usize,
}

impl StrBackupProperty {
    pub fn new(backup: SharedBackup, id: u32, size: usize) -> Self {
        Self { backup, id, size }
    }
}

impl Property for StrBackupProperty {
    fn is_available(&self) -> bool {
        read_register(&self.backup, self.id, self.size).is_some()
    }

    fn string_value(&self) -> String {
        match read_register(&self.backup, self.id, self.size) {
            Some(data) => {
                let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                String::from_utf8_lossy(&data[..end]).into_owned()
            }
            None => String::new(),
        }
    }
}

/// Binary register rendered as hex with leading zeros stripped
/// (product code, serial number).
pub struct HexBackupProperty {
    backup: SharedBackup,
    id: u32,
    size: usize,
}

impl HexBackupProperty {
    pub fn new(backup: SharedBackup, id: u32, size: usize) -> Self {
        Self { backup, id, size }
    }
}

impl Property for HexBackupProperty {
    fn is_available(&self) -> bool {
        read_register(&self.backup, self.id, self.size).is_some()
    }

    fn string_value(&self) -> String {
        match read_register(&self.backup, self.id, self.size) {
            Some(data) => {
                let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
                hex.trim_start_matches('0').to_string()
            }
            None => String::new(),
        }
    }
}

/// Firmware version from the two-byte version file on the settings
/// partition, rendered `major.minor`.
pub struct FirmwareVersionProperty {
    version_file: PathBuf,
}

impl FirmwareVersionProperty {
    pub fn new(version_file: PathBuf) -> Self {
        Self { version_file }
    }

    fn read(&self) -> Option<[u8; 2]> {
        let data = std::fs::read(&self.version_file).ok()?;
        data.try_into().ok()
    }
}

impl Property for FirmwareVersionProperty {
    fn is_available(&self) -> bool {
        self.read().is_some()
    }

    fn string_value(&self) -> String {
        match self.read() {
            Some([minor, major]) => format!("{major:x}.{minor:02x}"),
            None => String::new(),
        }
    }
}

// ── Tweaks ────────────────────────────────────────────────────

/// Single-byte on/off register. Available only while the stored value is
/// one of the two known states.
pub struct BoolBackupTweak {
    backup: SharedBackup,
    id: u32,
}

impl BoolBackupTweak {
    pub fn new(backup: SharedBackup, id: u32) -> Self {
        Self { backup, id }
    }
}

impl Tweak for BoolBackupTweak {
    fn is_available(&self) -> bool {
        matches!(
            read_register(&self.backup, self.id, 1).as_deref(),
            Some([0]) | Some([1])
        )
    }

    fn string_value(&self) -> String {
        let state = if self.is_enabled() { "Enabled" } else { "Disabled" };
        state.to_string()
    }

    fn is_enabled(&self) -> bool {
        read_register(&self.backup, self.id, 1).as_deref() == Some(&[1])
    }

    fn set_enabled(&mut self, enable: bool) -> Result<(), BackupError> {
        self.backup
            .borrow_mut()
            .write(self.id, &[enable as u8])
    }
}

/// Video recording limit: three consecutive one-byte registers holding
/// hours/minutes/seconds. "Enabled" lifts the limit to 13h01m00s.
pub struct RecLimitTweak {
    backup: SharedBackup,
}

const REC_LIMIT_OFF: [u8; 3] = [0, 29, 50];
const REC_LIMIT_ON: [u8; 3] = [13, 1, 0];

impl RecLimitTweak {
    pub fn new(backup: SharedBackup) -> Self {
        Self { backup }
    }

    fn read(&self) -> Option<[u8; 3]> {
        let mut value = [0u8; 3];
        for (i, slot) in value.iter_mut().enumerate() {
            *slot = read_register(&self.backup, BACKUP_ID_REC_LIMIT + i as u32, 1)?[0];
        }
        Some(value)
    }

    fn write(&mut self, value: [u8; 3]) -> Result<(), BackupError> {
        for (i, byte) in value.iter().enumerate() {
            self.backup
                .borrow_mut()
                .write(BACKUP_ID_REC_LIMIT + i as u32, &[*byte])?;
        }
        Ok(())
    }
}

impl Tweak for RecLimitTweak {
    fn is_available(&self) -> bool {
        self.read().is_some()
    }

    fn string_value(&self) -> String {
        match self.read() {
            Some([hours, minutes, seconds]) => {
                format!("{hours}h {minutes:02}m {seconds:02}s")
            }
            None => String::new(),
        }
    }

    fn is_enabled(&self) -> bool {
        self.read() == Some(REC_LIMIT_ON)
    }

    fn set_enabled(&mut self, enable: bool) -> Result<(), BackupError> {
        self.write(if enable { REC_LIMIT_ON } else { REC_LIMIT_OFF })
    }
}

/// 4K recording limit: one u16 register holding seconds.
pub struct RecLimit4kTweak {
    backup: SharedBackup,
}

const REC_LIMIT_4K_OFF: u16 = 5 * 60;
const REC_LIMIT_4K_ON: u16 = 0x7fff;

impl RecLimit4kTweak {
    pub fn new(backup: SharedBackup) -> Self {
        Self { backup }
    }

    fn read(&self) -> Option<u16> {
        let data = read_register(&self.backup, BACKUP_ID_REC_LIMIT_4K, 2)?;
        Some(u16::from_le_bytes([data[0], data[1]]))
    }
}

impl Tweak for RecLimit4kTweak {
    fn is_available(&self) -> bool {
        self.read().is_some()
    }

    fn string_value(&self) -> String {
        match self.read() {
            Some(limit) => {
                let limit = limit as u32;
                format!(
                    "{}h {:02}m {:02}s",
                    limit / 3600,
                    (limit % 3600) / 60,
                    limit % 60
                )
            }
            None => String::new(),
        }
    }

    fn is_enabled(&self) -> bool {
        self.read() == Some(REC_LIMIT_4K_ON)
    }

    fn set_enabled(&mut self, enable: bool) -> Result<(), BackupError> {
        let value = if enable {
            REC_LIMIT_4K_ON
        } else {
            REC_LIMIT_4K_OFF
        };
        self.backup
            .borrow_mut()
            .write(BACKUP_ID_REC_LIMIT_4K, &value.to_le_bytes())
    }
}

// ── Default tables ────────────────────────────────────────────

/// The stock property table, in emission order.
pub fn default_property_table(
    backup: &SharedBackup,
    firmware_version_file: &Path,
) -> Vec<PropertyEntry> {
    vec![
        PropertyEntry {
            id: *b"MODL",
            property: Box::new(StrBackupProperty::new(
                backup.clone(),
                BACKUP_ID_MODEL_NAME,
                MODEL_NAME_LEN,
            )),
        },
        PropertyEntry {
            id: *b"PROD",
            property: Box::new(HexBackupProperty::new(
                backup.clone(),
                BACKUP_ID_MODEL_CODE,
                MODEL_CODE_LEN,
            )),
        },
        PropertyEntry {
            id: *b"SERN",
            property: Box::new(HexBackupProperty::new(
                backup.clone(),
                BACKUP_ID_SERIAL,
                SERIAL_LEN,
            )),
        },
        PropertyEntry {
            id: *b"FIRM",
            property: Box::new(FirmwareVersionProperty::new(
                firmware_version_file.to_path_buf(),
            )),
        },
    ]
}

/// The stock tweak table, in emission order.
pub fn default_tweak_table(backup: &SharedBackup) -> Vec<TweakEntry> {
    vec![
        TweakEntry {
            id: *b"RECL",
            tweak: Box::new(RecLimitTweak::new(backup.clone())),
        },
        TweakEntry {
            id: *b"RL4K",
            tweak: Box::new(RecLimit4kTweak::new(backup.clone())),
        },
        TweakEntry {
            id: *b"NTSC",
            tweak: Box::new(BoolBackupTweak::new(
                backup.clone(),
                BACKUP_ID_PAL_NTSC_SELECTOR,
            )),
        },
        TweakEntry {
            id: *b"UAPP",
            tweak: Box::new(BoolBackupTweak::new(
                backup.clone(),
                BACKUP_ID_USB_APP_INSTALLER,
            )),
        },
    ]
}

// ── Tests ────────────────────────────────────────────────────
