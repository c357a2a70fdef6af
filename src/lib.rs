//! Device-resident USB updater-shell payload.
//!
//! Loaded by the camera's firmware-update executor, the payload opens a
//! private channel on a vendor USB control feature and serves a
//! master-driven request/response protocol: device inspection, backup
//! register access, bootloader dumps, file push/pull and interactive or
//! one-shot subprocesses.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Capability adapters                        │
//! │                                                               │
//! │  LocalFiles   LocalSpawner   backup_props   BackupDeviceInfo  │
//! │  (FileAccess) (ProcessSpawner) (Property/Tweak) (DeviceInfo)  │
//! │                                                               │
//! │  ─────────────── capability trait boundary ────────────────   │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │  shell: dispatcher · streaming · sequence transfer      │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! │                                                               │
//! │  body: mount /setting · serve session · unmount · linger      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The core is strictly single-threaded and blocking; the only peer
//! activity is the child process spawned for `SHEL`/`EXEC`.

#![deny(unused_must_use)]

pub mod adapters;
pub mod body;
pub mod caps;
pub mod config;
pub mod error;
pub mod shell;

pub use body::UpdaterBody;
pub use config::ShellConfig;
pub use error::{ShellError, ShellResult};
