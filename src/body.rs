//! Session lifecycle: the updater-body entry point.
//!
//! The firmware-update executor loads the payload, obtains a body and runs
//! it to completion. The body mounts the scoped filesystems, serves the
//! shell session and cleans up. The loader only learns that the session
//! terminated, never why, so every failure is swallowed here and the
//! body reports success unconditionally.

use std::thread;

use log::{info, warn};

use crate::adapters::mounts::MountTable;
use crate::caps::CapabilitySet;
use crate::config::ShellConfig;
use crate::shell::dispatch::run_command_loop;
use crate::shell::transfer::{SequenceTransfer, UsbCmd};

pub struct UpdaterBody {
    caps: CapabilitySet,
    config: ShellConfig,
}

impl UpdaterBody {
    pub fn new(caps: CapabilitySet, config: ShellConfig) -> Self {
        Self { caps, config }
    }

    /// Run one shell session over `cmd`. Always reports success to the
    /// loader; the loader's parameters carry nothing the shell needs.
    pub fn execute<C: UsbCmd>(&mut self, cmd: C) -> bool {
        let _ = env_logger::Builder::from_env(env_logger::Env::default()).try_init();

        let mut mounts = MountTable::new();
        if let Err(e) = mounts.mount_vfat(&self.config.settings_device, &self.config.settings_mount)
        {
            warn!(
                "usbshell: mounting {} failed: {e}",
                self.config.settings_mount.display()
            );
        }

        if let Some(android) = self.caps.android.as_mut() {
            if let Err(e) = android.prepare() {
                warn!("usbshell: android-data preparation failed: {e}");
            }
        }

        info!("usbshell: session start");
        let mut transfer = SequenceTransfer::new(cmd);
        match run_command_loop(&mut transfer, &mut self.caps) {
            Ok(()) => info!("usbshell: session closed by host"),
            Err(e) => warn!("usbshell: session aborted: {e}"),
        }

        mounts.unmount_all();

        // Give the host time to collect the final response before the
        // carrier (dropped with `transfer`) goes away.
        thread::sleep(self.config.exit_linger);
        true
    }
}
