//! Child-process spawning with piped stdio.
//!
//! The shell commands want one pipe carrying everything the child prints:
//! stdout and stderr share a single pipe whose read end goes to the
//! streaming sub-protocol. `SHEL` additionally gets a stdin pipe; `EXEC`
//! children read the null device.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::process::{Command, Stdio};

use log::debug;

use crate::caps::{CapError, CapResult, ProcessSpawner, SpawnedChild};

pub struct LocalSpawner;

impl ProcessSpawner for LocalSpawner {
    fn spawn(&mut self, argv: &[&OsStr], want_stdin: bool) -> CapResult<SpawnedChild> {
        let (program, args) = argv.split_first().ok_or(CapError::Failed("empty argv"))?;

        let (pipe_read, pipe_write) = output_pipe()?;
        let stderr_end = pipe_write.try_clone()?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(if want_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::from(pipe_write))
            .stderr(Stdio::from(stderr_end))
            .spawn()?;

        let pid = child.id() as i32;
        debug!("spawned {program:?} (pid {pid})");

        let stdin = child.stdin.take().map(|s| File::from(OwnedFd::from(s)));
        // No wait(): children outlive their command and are reaped with
        // the updater process.
        Ok(SpawnedChild {
            pid,
            stdin,
            stdout: File::from(pipe_read),
        })
    }
}

fn output_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid two-element array; pipe2 fills it on success.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 returned two freshly created descriptors we now own.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}
