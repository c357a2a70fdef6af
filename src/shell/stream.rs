//! Streaming sub-protocols layered on the sequence transfer.
//!
//! Four patterns carry bulk data after a command has been accepted. All of
//! them are host-paced: within a stream the device always performs one
//! `read` then one `write` per round, so request/response alternation is
//! preserved end to end.
//!
//! | Pattern                | Used by            | Direction        |
//! |------------------------|--------------------|------------------|
//! | [`stream_fd_to_host`]  | `PULL`             | device → host    |
//! | [`stream_host_to_fd`]  | `PUSH`             | host → device    |
//! | [`stream_buffer_to_host`] | `BROM`/`BLDR`   | device → host    |
//! | [`stream_pipe_socket`] | `SHEL`/`EXEC`      | full duplex      |
//!
//! The pipe socket multiplexes a full-duplex child-process pipe pair over
//! the half-duplex carrier. The device advertises a full receive window
//! only while its receive buffer is empty, which forces the host to drain
//! and refill in whole rounds; that one-at-a-time policy is what makes
//! the flow control sound.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use crate::error::{ShellError, ShellResult};
use crate::shell::transfer::{SequenceTransfer, UsbCmd};
use crate::shell::wire::{
    self, SocketHeader, DATA_CHUNK_LEN, DATA_MSG_LEN, SOCKET_BUF_LEN, SOCKET_HEADER_LEN,
    STATUS_DONE, STATUS_MSG_LEN,
};

// ── Process-wide signal state ─────────────────────────────────

/// Scoped `SIGPIPE` suppression.
///
/// A write to a pipe whose reader has exited must surface as `EPIPE`, not
/// kill the process. The previous disposition is restored on drop, so
/// every exit path of the pipe socket, including stream failures,
/// leaves the process state as it found it.
struct SigpipeGuard {
    prev: libc::sighandler_t,
}

impl SigpipeGuard {
    fn ignore() -> SigpipeGuard {
        // SAFETY: SIG_IGN is a valid disposition for SIGPIPE; the core is
        // single-threaded while the shell session runs.
        let prev = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
        SigpipeGuard { prev }
    }
}

impl Drop for SigpipeGuard {
    fn drop(&mut self) {
        // SAFETY: restores the disposition saved by `ignore`.
        unsafe {
            libc::signal(libc::SIGPIPE, self.prev);
        }
    }
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file` and stays open across both calls.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

// ── Shared helpers ────────────────────────────────────────────

fn read_status<C: UsbCmd>(t: &mut SequenceTransfer<C>) -> ShellResult<u32> {
    let frame = t.read_frame(STATUS_MSG_LEN)?;
    Ok(wire::parse_status_msg(&frame).unwrap_or(0))
}

fn read_socket_header<C: UsbCmd>(t: &mut SequenceTransfer<C>) -> ShellResult<SocketHeader> {
    let frame = t.read_frame(SOCKET_HEADER_LEN)?;
    SocketHeader::parse(&frame).ok_or_else(|| {
        ShellError::Stream(io::Error::new(
            io::ErrorKind::InvalidData,
            "truncated socket header",
        ))
    })
}

fn read_retry(src: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

// ── Device-emitting streams ───────────────────────────────────

/// Stream `src` to the host until EOF or host cancel.
///
/// Each round exchanges one `(status, data)` pair; the EOF round carries
/// `size == 0`, so the host always receives a well-formed frame per poll.
pub fn stream_fd_to_host<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    src: &mut impl Read,
) -> ShellResult<()> {
    let mut chunk = vec![0u8; DATA_CHUNK_LEN];
    loop {
        let n = read_retry(src, &mut chunk).map_err(ShellError::Stream)?;
        let status = read_status(t)?;
        t.write_frame(&wire::encode_data_msg(&chunk[..n]))?;
        if n == 0 || status == STATUS_DONE {
            return Ok(());
        }
    }
}

/// Receive a host-pushed byte stream into `dst` until the empty terminator.
pub fn stream_host_to_fd<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    dst: &mut impl Write,
) -> ShellResult<()> {
    loop {
        let frame = t.read_frame(DATA_MSG_LEN)?;
        t.write_frame(&wire::encode_status_msg(0))?;
        let data = wire::parse_data_msg(&frame).ok_or_else(|| {
            ShellError::Stream(io::Error::new(
                io::ErrorKind::InvalidData,
                "data size overruns frame",
            ))
        })?;
        dst.write_all(data).map_err(ShellError::Stream)?;
        if data.is_empty() {
            return Ok(());
        }
    }
}

/// Stream an in-memory buffer to the host in data-message chunks, always
/// closing with one empty frame. A host cancel stops the chunk walk early;
/// the cancel round still carries its chunk, then only the terminator
/// follows.
pub fn stream_buffer_to_host<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    buf: &[u8],
) -> ShellResult<()> {
    for chunk in buf.chunks(DATA_CHUNK_LEN) {
        let status = read_status(t)?;
        t.write_frame(&wire::encode_data_msg(chunk))?;
        if status == STATUS_DONE {
            break;
        }
    }
    let _ = read_status(t)?;
    t.write_frame(&wire::encode_data_msg(&[]))?;
    Ok(())
}

// ── Pipe socket ───────────────────────────────────────────────

struct PipeBuf {
    data: Box<[u8]>,
    offset: usize,
    size: usize,
}

impl PipeBuf {
    fn new() -> Self {
        Self {
            data: vec![0u8; SOCKET_BUF_LEN].into_boxed_slice(),
            offset: 0,
            size: 0,
        }
    }
}

/// Full-duplex pipe exchange with a spawned child, host-paced.
///
/// `stdin` is absent for `EXEC` children (they read the null device).
/// Both pipe ends are switched to non-blocking for the duration; the
/// exchange terminates only in a round where the host and the device have
/// both advertised `status == 1`.
pub fn stream_pipe_socket<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    mut stdin: Option<File>,
    mut stdout: Option<File>,
) -> ShellResult<()> {
    let _sigpipe = SigpipeGuard::ignore();
    if let Some(f) = &stdin {
        set_nonblocking(f).map_err(ShellError::Stream)?;
    }
    if let Some(f) = &stdout {
        set_nonblocking(f).map_err(ShellError::Stream)?;
    }

    let mut rx = PipeBuf::new(); // host → child stdin
    let mut tx = PipeBuf::new(); // child stdout → host

    loop {
        // Drain pending host data into the child's stdin. EPIPE means the
        // child stopped reading; that closes our end but not the session.
        let mut stdin_broken = false;
        if rx.size > 0 {
            if let Some(f) = stdin.as_mut() {
                match f.write(&rx.data[rx.offset..rx.offset + rx.size]) {
                    Ok(n) => {
                        rx.offset += n;
                        rx.size -= n;
                    }
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => stdin_broken = true,
                    Err(e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(ShellError::Stream(e)),
                }
            }
        }
        if stdin_broken {
            stdin = None;
        }
        if stdin.is_none() {
            rx.size = 0;
        }

        // Refill the outgoing buffer from the child's stdout.
        let mut stdout_eof = false;
        if tx.size == 0 {
            if let Some(f) = stdout.as_mut() {
                match f.read(&mut tx.data) {
                    Ok(0) => stdout_eof = true,
                    Ok(n) => {
                        tx.offset = 0;
                        tx.size = n;
                    }
                    Err(e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(ShellError::Stream(e)),
                }
            }
        }
        if stdout_eof {
            stdout = None;
        }

        // Header exchange: the host opens every round.
        let master = read_socket_header(t)?;
        let slave = SocketHeader {
            status: if stdout.is_some() { 0 } else { STATUS_DONE },
            rx_size: if rx.size == 0 { SOCKET_BUF_LEN as u32 } else { 0 },
            tx_size: tx.size as u32,
        };
        t.write_frame(&slave.to_bytes())?;

        let rx_n = master.tx_size.min(slave.rx_size) as usize;
        let tx_n = master.rx_size.min(slave.tx_size) as usize;

        // Both halves done in the same round: exchange complete.
        if master.status == STATUS_DONE && slave.status == STATUS_DONE {
            break;
        }

        // Host is done sending: close the child's stdin once drained.
        if stdin.is_some() && rx.size == 0 && master.status == STATUS_DONE {
            stdin = None;
        }

        // Data exchange, sizes as negotiated above.
        let data = t.read_frame(rx_n)?;
        if rx_n > 0 {
            rx.data[..rx_n].copy_from_slice(&data);
            rx.offset = 0;
            rx.size = rx_n;
        }
        t.write_frame(&tx.data[tx.offset..tx.offset + tx_n])?;
        tx.offset += tx_n;
        tx.size -= tx_n;
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────
