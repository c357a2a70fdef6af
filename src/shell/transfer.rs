//! Carrier abstraction and the sequence-envelope transfer.
//!
//! The carrier is the vendor-specific USB control feature (id 0x23): a
//! blocking, framed byte channel where each call maps to exactly one
//! control transfer. The [`SequenceTransfer`] wraps every logical frame in
//! a monotonic 32-bit counter so a retransmitted or reordered exchange is
//! detected immediately.
//!
//! The counter counts device→host frames. It is verified on every read and
//! advanced only after a successful write; one read/write exchange moves
//! it forward by exactly one on both endpoints.

use std::io;

use crate::error::{ShellError, ShellResult};

/// Vendor USB feature id the shell is reachable on.
pub const USB_FEATURE_SHELL: u8 = 0x23;

const SEQ_LEN: usize = 4;

/// Blocking framed exchange on the USB control feature.
///
/// Implementations are expected to block until the host performs the
/// matching transfer; a return value different from `buf.len()` is treated
/// as a fatal short transfer by the layer above.
pub trait UsbCmd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Sequence-guarded framing over a [`UsbCmd`] carrier.
pub struct SequenceTransfer<C> {
    cmd: C,
    sequence: u32,
}

impl<C: UsbCmd> SequenceTransfer<C> {
    pub fn new(cmd: C) -> Self {
        Self { cmd, sequence: 0 }
    }

    /// Current counter value (the number of frames sent so far).
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Access the underlying carrier.
    pub fn carrier(&self) -> &C {
        &self.cmd
    }

    /// Receive one frame of exactly `len` payload bytes.
    ///
    /// Does not advance the counter.
    pub fn read_frame(&mut self, len: usize) -> ShellResult<Vec<u8>> {
        let mut buf = vec![0u8; SEQ_LEN + len];
        let n = self.cmd.read(&mut buf).map_err(ShellError::Carrier)?;
        if n != buf.len() {
            return Err(ShellError::ShortTransfer {
                expected: buf.len(),
                got: n,
            });
        }
        let seq = u32::from_le_bytes(buf[..SEQ_LEN].try_into().unwrap());
        if seq != self.sequence {
            return Err(ShellError::SequenceMismatch {
                expected: self.sequence,
                got: seq,
            });
        }
        buf.drain(..SEQ_LEN);
        Ok(buf)
    }

    /// Receive and discard an empty pacing frame (the host's "go ahead"
    /// probe before a device-emitted record).
    pub fn read_empty(&mut self) -> ShellResult<()> {
        self.read_frame(0).map(|_| ())
    }

    /// Send one frame, then advance the counter.
    pub fn write_frame(&mut self, payload: &[u8]) -> ShellResult<()> {
        let mut buf = Vec::with_capacity(SEQ_LEN + payload.len());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(payload);
        let n = self.cmd.write(&buf).map_err(ShellError::Carrier)?;
        if n != buf.len() {
            return Err(ShellError::ShortTransfer {
                expected: buf.len(),
                got: n,
            });
        }
        self.sequence = self.sequence.wrapping_add(1);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────
