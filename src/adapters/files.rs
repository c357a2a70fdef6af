//! Local filesystem access for `PULL`/`PUSH`/`STAT`.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::caps::{CapResult, FileAccess};

pub struct LocalFiles;

impl FileAccess for LocalFiles {
    fn file_size(&mut self, path: &Path) -> CapResult<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn open_read(&mut self, path: &Path) -> CapResult<File> {
        Ok(File::open(path)?)
    }

    fn open_write(&mut self, path: &Path) -> CapResult<File> {
        // Synchronous writes: the host expects pushed files to be on flash
        // by the time the stream terminator is acknowledged.
        Ok(OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o755)
            .custom_flags(libc::O_SYNC)
            .open(path)?)
    }
}
