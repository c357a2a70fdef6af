//! Adapters: concrete implementations of the capability traits.
//!
//! | Adapter          | Implements       | Connects to                    |
//! |------------------|------------------|--------------------------------|
//! | `files`          | FileAccess       | device filesystem              |
//! | `process`        | ProcessSpawner   | `sh` children with piped stdio |
//! | `mounts`         | (session helper) | vfat mount/umount syscalls     |
//! | `backup_props`   | Property, Tweak  | backup registers               |
//! | `device_info`    | DeviceInfoSource | backup registers + version file|
//!
//! Device-specific drivers (the backup kernel driver, the bootloader node,
//! the Android-data backup archive) stay outside the crate; integrators
//! supply them through the same traits.

pub mod backup_props;
pub mod device_info;
pub mod files;
pub mod mounts;
pub mod process;
