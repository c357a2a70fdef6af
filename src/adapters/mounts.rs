//! Scoped vfat mounts for the session.
//!
//! The settings partition is a vfat filesystem mounted synchronous and
//! noatime for the duration of the session. Unmounting is best-effort and
//! happens in reverse mount order; a partition that refuses to unmount
//! must not keep the session from completing.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::warn;

const VFAT_OPTIONS: &std::ffi::CStr = c"posix_attr,shortname=mixed";

/// Mount `source` at `target` as vfat, synchronous + noatime.
pub fn mount_vfat(source: &Path, target: &Path) -> io::Result<()> {
    let src = path_cstring(source)?;
    let tgt = path_cstring(target)?;
    // SAFETY: all pointers reference NUL-terminated buffers that outlive
    // the call.
    let rc = unsafe {
        libc::mount(
            src.as_ptr(),
            tgt.as_ptr(),
            c"vfat".as_ptr(),
            libc::MS_NOATIME | libc::MS_SYNCHRONOUS,
            VFAT_OPTIONS.as_ptr().cast(),
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn unmount(target: &Path) -> io::Result<()> {
    let tgt = path_cstring(target)?;
    // SAFETY: `tgt` is a NUL-terminated buffer valid for the call.
    let rc = unsafe { libc::umount(tgt.as_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn path_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
}

/// Session-scoped mount bookkeeping.
pub struct MountTable {
    mounted: Vec<PathBuf>,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            mounted: Vec::new(),
        }
    }

    /// Mount and record the target for later cleanup.
    pub fn mount_vfat(&mut self, source: &Path, target: &Path) -> io::Result<()> {
        mount_vfat(source, target)?;
        self.mounted.push(target.to_path_buf());
        Ok(())
    }

    /// Unmount everything in reverse mount order, best-effort.
    pub fn unmount_all(&mut self) {
        for target in self.mounted.drain(..).rev() {
            if let Err(e) = unmount(&target) {
                warn!("unmounting {} failed: {e}", target.display());
            }
        }
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}
