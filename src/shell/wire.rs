//! On-wire frame layouts for the updater shell protocol.
//!
//! Every logical frame travels inside a sequence envelope (see
//! [`transfer`](super::transfer)); the layouts here describe the payload
//! that follows the envelope. All multi-byte integers are little-endian.
//!
//! ```text
//! Request (0xFFFC bytes)                Response (4 bytes)
//! ┌──────────┬────────────────────┐     ┌────────────────┐
//! │ cmd (4B) │ payload (0xFFF8 B) │     │ result (i32 LE)│
//! └──────────┴────────────────────┘     └────────────────┘
//!
//! Data message (0xFFFC bytes)           Socket header (12 bytes)
//! ┌───────────┬───────────────────┐     ┌────────┬─────────┬─────────┐
//! │ size (u32)│ data (0xFFF8 B)   │     │ status │ rx_size │ tx_size │
//! └───────────┴───────────────────┘     └────────┴─────────┴─────────┘
//! ```
//!
//! Frames are fixed-size: unused payload bytes are transmitted verbatim.

use std::fmt;

/// Payload region of a request frame.
pub const REQUEST_PAYLOAD_LEN: usize = 0xfff8;

/// Full request frame: 4-byte command code + payload region.
pub const REQUEST_LEN: usize = 4 + REQUEST_PAYLOAD_LEN;

/// Response frame: one signed 32-bit result.
pub const RESPONSE_LEN: usize = 4;

/// Status message carried host→device during device-emitting streams.
pub const STATUS_MSG_LEN: usize = 4;

/// Largest data chunk carried by one data message.
pub const DATA_CHUNK_LEN: usize = 0xfff8;

/// Full data message: size field + data region.
pub const DATA_MSG_LEN: usize = 4 + DATA_CHUNK_LEN;

/// Pipe-socket flow-control header: status, rx_size, tx_size.
pub const SOCKET_HEADER_LEN: usize = 12;

/// Capacity of each pipe-socket scratch buffer.
pub const SOCKET_BUF_LEN: usize = 0xfff4;

/// Value region of a property/tweak list entry.
pub const LIST_VALUE_LEN: usize = 0xfff4;

/// Full list entry: id + status + value region.
pub const LIST_ENTRY_LEN: usize = 8 + LIST_VALUE_LEN;

/// Largest backup register payload accepted by a write request.
pub const BACKUP_DATA_LEN: usize = 0xfff4;

/// Packed device-info record: model[16] + product[5] + serial[4] + firmware u16.
pub const DEVICE_INFO_LEN: usize = 27;

/// "My half of this exchange is done." The protocol uses the same value
/// for host-side cancellation and for end-of-file in the pipe socket.
pub const STATUS_DONE: u32 = 1;

pub const RESULT_SUCCESS: i32 = 0;
pub const RESULT_ERROR: i32 = -1;
pub const RESULT_ERROR_PROTECTION: i32 = -2;

// ── Command codes ─────────────────────────────────────────────

/// Four-byte command code, matched as opaque bytes.
///
/// The host encodes these as ASCII; the device never reinterprets them as
/// integers, so the comparison is endianness-free.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CommandCode(pub [u8; 4]);

impl CommandCode {
    pub const TEST: CommandCode = CommandCode(*b"TEST");
    pub const PROP: CommandCode = CommandCode(*b"PROP");
    pub const TLST: CommandCode = CommandCode(*b"TLST");
    pub const TSET: CommandCode = CommandCode(*b"TSET");
    pub const SHEL: CommandCode = CommandCode(*b"SHEL");
    pub const EXEC: CommandCode = CommandCode(*b"EXEC");
    pub const PULL: CommandCode = CommandCode(*b"PULL");
    pub const PUSH: CommandCode = CommandCode(*b"PUSH");
    pub const STAT: CommandCode = CommandCode(*b"STAT");
    pub const BROM: CommandCode = CommandCode(*b"BROM");
    pub const BLDR: CommandCode = CommandCode(*b"BLDR");
    pub const BKRD: CommandCode = CommandCode(*b"BKRD");
    pub const BKWR: CommandCode = CommandCode(*b"BKWR");
    pub const BKSY: CommandCode = CommandCode(*b"BKSY");
    pub const AMNT: CommandCode = CommandCode(*b"AMNT");
    pub const AUMT: CommandCode = CommandCode(*b"AUMT");
    pub const INFO: CommandCode = CommandCode(*b"INFO");
    pub const EXIT: CommandCode = CommandCode(*b"EXIT");
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            for b in self.0 {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{:08x}", u32::from_le_bytes(self.0))
        }
    }
}

// ── Request ───────────────────────────────────────────────────

/// One decoded shell request: command code plus its payload region.
pub struct Request {
    pub code: CommandCode,
    payload: Vec<u8>,
}

impl Request {
    /// Parse a request frame. Returns `None` if the frame is too short to
    /// carry a command code.
    pub fn parse(frame: &[u8]) -> Option<Request> {
        if frame.len() < 4 {
            return None;
        }
        Some(Request {
            code: CommandCode([frame[0], frame[1], frame[2], frame[3]]),
            payload: frame[4..].to_vec(),
        })
    }

    /// The raw payload region.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload up to (not including) the first NUL byte.
    ///
    /// Path and command-string arguments are NUL-terminated C strings; a
    /// payload with no NUL is taken whole.
    pub fn cstr(&self) -> &[u8] {
        match self.payload.iter().position(|&b| b == 0) {
            Some(n) => &self.payload[..n],
            None => &self.payload,
        }
    }

    /// Build a request frame (used by the test harness).
    pub fn pack(code: CommandCode, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; REQUEST_LEN];
        frame[..4].copy_from_slice(&code.0);
        let n = data.len().min(REQUEST_PAYLOAD_LEN);
        frame[4..4 + n].copy_from_slice(&data[..n]);
        frame
    }
}

// ── Stream messages ───────────────────────────────────────────

/// Parse a host→device status message.
pub fn parse_status_msg(frame: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(frame.get(..4)?.try_into().ok()?))
}

/// Encode a device→host status message.
pub fn encode_status_msg(status: u32) -> [u8; STATUS_MSG_LEN] {
    status.to_le_bytes()
}

/// Encode one data message carrying `chunk` (at most [`DATA_CHUNK_LEN`]
/// bytes); the remainder of the fixed-size data region is zero-filled.
pub fn encode_data_msg(chunk: &[u8]) -> Vec<u8> {
    debug_assert!(chunk.len() <= DATA_CHUNK_LEN);
    let mut frame = vec![0u8; DATA_MSG_LEN];
    frame[..4].copy_from_slice(&(chunk.len() as u32).to_le_bytes());
    frame[4..4 + chunk.len()].copy_from_slice(chunk);
    frame
}

/// Parse a data message; yields the valid prefix of the data region.
/// Returns `None` if the size field overruns the frame.
pub fn parse_data_msg(frame: &[u8]) -> Option<&[u8]> {
    let size = u32::from_le_bytes(frame.get(..4)?.try_into().ok()?) as usize;
    frame.get(4..4 + size)
}

/// Pipe-socket flow-control header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHeader {
    pub status: u32,
    pub rx_size: u32,
    pub tx_size: u32,
}

impl SocketHeader {
    pub fn parse(frame: &[u8]) -> Option<SocketHeader> {
        if frame.len() < SOCKET_HEADER_LEN {
            return None;
        }
        Some(SocketHeader {
            status: u32::from_le_bytes(frame[0..4].try_into().unwrap()),
            rx_size: u32::from_le_bytes(frame[4..8].try_into().unwrap()),
            tx_size: u32::from_le_bytes(frame[8..12].try_into().unwrap()),
        })
    }

    pub fn to_bytes(self) -> [u8; SOCKET_HEADER_LEN] {
        let mut buf = [0u8; SOCKET_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.status.to_le_bytes());
        buf[4..8].copy_from_slice(&self.rx_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.tx_size.to_le_bytes());
        buf
    }
}

/// Encode a property/tweak list entry. The value is NUL-padded (and
/// truncated if longer than the value region).
pub fn encode_list_entry(id: [u8; 4], status: i32, value: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; LIST_ENTRY_LEN];
    frame[..4].copy_from_slice(&id);
    frame[4..8].copy_from_slice(&status.to_le_bytes());
    let n = value.len().min(LIST_VALUE_LEN);
    frame[8..8 + n].copy_from_slice(&value[..n]);
    frame
}

// ── Command argument views ────────────────────────────────────

/// `TSET` arguments: tweak id + enable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweakSetArgs {
    pub id: [u8; 4],
    pub enable: bool,
}

impl TweakSetArgs {
    pub fn parse(payload: &[u8]) -> Option<TweakSetArgs> {
        if payload.len() < 8 {
            return None;
        }
        Some(TweakSetArgs {
            id: payload[..4].try_into().unwrap(),
            enable: u32::from_le_bytes(payload[4..8].try_into().unwrap()) != 0,
        })
    }
}

/// `BKRD` arguments: backup register id.
pub fn parse_backup_read_args(payload: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(payload.get(..4)?.try_into().ok()?))
}

/// `BKWR` arguments: backup register id + sized data.
/// Returns `None` when the size field overruns the payload or the
/// register capacity.
pub fn parse_backup_write_args(payload: &[u8]) -> Option<(u32, &[u8])> {
    if payload.len() < 8 {
        return None;
    }
    let id = u32::from_le_bytes(payload[..4].try_into().unwrap());
    let size = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as usize;
    if size > BACKUP_DATA_LEN {
        return None;
    }
    Some((id, payload.get(8..8 + size)?))
}

/// `AUMT` arguments: commit flag.
pub fn parse_android_unmount_args(payload: &[u8]) -> Option<bool> {
    Some(u32::from_le_bytes(payload.get(..4)?.try_into().ok()?) != 0)
}

// ── Device info ───────────────────────────────────────────────

/// Fixed device identification record served by `INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfoRecord {
    pub model: [u8; 16],
    pub product: [u8; 5],
    pub serial: [u8; 4],
    /// Firmware version, major in the high byte, minor in the low byte.
    pub firmware: u16,
}

impl DeviceInfoRecord {
    pub fn to_bytes(&self) -> [u8; DEVICE_INFO_LEN] {
        let mut buf = [0u8; DEVICE_INFO_LEN];
        buf[..16].copy_from_slice(&self.model);
        buf[16..21].copy_from_slice(&self.product);
        buf[21..25].copy_from_slice(&self.serial);
        buf[25..27].copy_from_slice(&self.firmware.to_le_bytes());
        buf
    }
}

// ── Tests ────────────────────────────────────────────────────
