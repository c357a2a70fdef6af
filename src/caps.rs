//! Capability traits: the boundary between the dispatcher and the device.
//!
//! ```text
//!   Driver adapter ──▶ capability trait ──▶ dispatcher (protocol core)
//! ```
//!
//! The dispatcher is written entirely against these traits; device-specific
//! drivers (the backup kernel driver, the bootloader node, the Android-data
//! backup archive) plug in from outside. A capability that is absent on a
//! build simply leaves its commands answering like unknown commands.

use std::cell::RefCell;
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::rc::Rc;

use crate::shell::wire::DeviceInfoRecord;

// ── Error taxonomies ──────────────────────────────────────────

/// Generic capability failure, reported to the host as result `-1`.
#[derive(Debug)]
pub enum CapError {
    /// The backing driver rejected the operation or returned bad data.
    Failed(&'static str),
    /// I/O error from the underlying device or filesystem.
    Io(io::Error),
}

impl fmt::Display for CapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(msg) => write!(f, "{msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<io::Error> for CapError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type CapResult<T> = Result<T, CapError>;

/// Failure writing protection-aware storage. The two tiers map directly to
/// the response codes `-2` (protected) and `-1` (anything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupError {
    /// The target region is write-protected.
    Protected,
    Failed,
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protected => write!(f, "region is write-protected"),
            Self::Failed => write!(f, "backup access failed"),
        }
    }
}

// ── Properties and tweaks ─────────────────────────────────────

/// A read-only device property exposed by `PROP`.
pub trait Property {
    /// Whether the backing data is present and well-formed on this device.
    fn is_available(&self) -> bool;

    /// Human-readable value shown in the host's property listing.
    /// Rendered best-effort: a value that disappears between the
    /// availability probe and this call reads as empty.
    fn string_value(&self) -> String;
}

/// A toggleable device setting exposed by `TLST`/`TSET`.
pub trait Tweak {
    fn is_available(&self) -> bool;
    fn string_value(&self) -> String;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enable: bool) -> Result<(), BackupError>;
}

/// One row of the static property table; emission order follows the table.
pub struct PropertyEntry {
    pub id: [u8; 4],
    pub property: Box<dyn Property>,
}

/// One row of the static tweak table.
pub struct TweakEntry {
    pub id: [u8; 4],
    pub tweak: Box<dyn Tweak>,
}

// ── Bootloader ────────────────────────────────────────────────

/// One readable unit of the bootloader flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootBlock {
    pub offset: u64,
    pub len: usize,
}

/// Access to the bootloader device node.
pub trait Bootloader {
    /// Whole-ROM dump, served by `BROM`.
    fn read_rom(&mut self) -> CapResult<Vec<u8>>;

    /// Open a per-block dump session for `BLDR`. The returned handle owns
    /// the underlying device node and releases it when dropped.
    fn open(&mut self) -> CapResult<Box<dyn BootloaderDump>>;
}

pub trait BootloaderDump {
    fn blocks(&mut self) -> CapResult<Vec<BootBlock>>;
    fn read_block(&mut self, block: &BootBlock) -> CapResult<Vec<u8>>;
}

// ── Backup store ──────────────────────────────────────────────

/// The persistent backup-register store.
pub trait BackupStore {
    fn read(&mut self, id: u32) -> CapResult<Vec<u8>>;
    fn write(&mut self, id: u32, data: &[u8]) -> Result<(), BackupError>;
    fn sync_all(&mut self);
}

/// Shared handle to the backup store. The core is single-threaded, so
/// interior mutability is enough for the store to back both the raw
/// `BKRD`/`BKWR` commands and the register-based properties and tweaks.
pub type SharedBackup = Rc<RefCell<dyn BackupStore>>;

// ── Android-data backup ───────────────────────────────────────

/// The Android-data backup archive on models that carry one.
pub trait AndroidData {
    /// Session-start preparation (best-effort, before the first command).
    fn prepare(&mut self) -> CapResult<()> {
        Ok(())
    }

    /// Mount the backup archive; returns the mount directory the host
    /// should use.
    fn mount(&mut self) -> CapResult<String>;

    fn unmount(&mut self, commit_backup: bool) -> CapResult<()>;
}

// ── Device info ───────────────────────────────────────────────

pub trait DeviceInfoSource {
    fn device_info(&mut self) -> CapResult<DeviceInfoRecord>;
}

// ── Filesystem ────────────────────────────────────────────────

/// File access for `PULL`/`PUSH`/`STAT`.
pub trait FileAccess {
    fn file_size(&mut self, path: &Path) -> CapResult<u64>;
    fn open_read(&mut self, path: &Path) -> CapResult<File>;
    /// Create-or-truncate for writing, mode 0755, synchronous writes.
    fn open_write(&mut self, path: &Path) -> CapResult<File>;
}

// ── Process spawning ──────────────────────────────────────────

/// A spawned child with its pipe ends. `stdout` also carries the child's
/// stderr.
pub struct SpawnedChild {
    pub pid: i32,
    pub stdin: Option<File>,
    pub stdout: File,
}

pub trait ProcessSpawner {
    /// Spawn `argv` with stdout and stderr merged into one pipe.
    /// `want_stdin` selects whether a stdin pipe is opened (`SHEL`) or the
    /// child reads from the null device (`EXEC`).
    fn spawn(&mut self, argv: &[&OsStr], want_stdin: bool) -> CapResult<SpawnedChild>;
}

// ── Registry ──────────────────────────────────────────────────

/// Everything the dispatcher can reach on this device.
pub struct CapabilitySet {
    pub properties: Vec<PropertyEntry>,
    pub tweaks: Vec<TweakEntry>,
    pub bootloader: Option<Box<dyn Bootloader>>,
    pub backup: Option<SharedBackup>,
    pub android: Option<Box<dyn AndroidData>>,
    pub device_info: Option<Box<dyn DeviceInfoSource>>,
    pub files: Box<dyn FileAccess>,
    pub spawner: Box<dyn ProcessSpawner>,
}

impl CapabilitySet {
    /// A set with file access and process spawning only; property tables
    /// and driver-backed capabilities start empty.
    pub fn new(files: Box<dyn FileAccess>, spawner: Box<dyn ProcessSpawner>) -> Self {
        Self {
            properties: Vec::new(),
            tweaks: Vec::new(),
            bootloader: None,
            backup: None,
            android: None,
            device_info: None,
            files,
            spawner,
        }
    }

    pub fn find_tweak(&mut self, id: [u8; 4]) -> Option<&mut (dyn Tweak + '_)> {
        for e in self.tweaks.iter_mut() {
            if e.id == id {
                return Some(e.tweak.as_mut());
            }
        }
        None
    }
}
