//! The command dispatcher.
//!
//! Reads one request per iteration, performs the command against the
//! capability set, writes one response, optionally runs the follow-up
//! streaming sub-protocol, and loops until `EXIT`. Capability failures are
//! mapped into the response result; only transfer-level errors propagate
//! out (and abort the session).

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::{debug, info, warn};

use crate::caps::{BackupError, CapabilitySet};
use crate::error::ShellResult;
use crate::shell::stream::{
    stream_buffer_to_host, stream_fd_to_host, stream_host_to_fd, stream_pipe_socket,
};
use crate::shell::transfer::{SequenceTransfer, UsbCmd};
use crate::shell::wire::{
    self, CommandCode, Request, RESULT_ERROR, RESULT_ERROR_PROTECTION, RESULT_SUCCESS,
};

/// Serve requests until `EXIT` or a fatal protocol error.
pub fn run_command_loop<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    loop {
        let frame = t.read_frame(wire::REQUEST_LEN)?;
        let req = match Request::parse(&frame) {
            Some(req) => req,
            None => {
                // Unreachable with fixed-size frames; still answered.
                respond(t, RESULT_ERROR)?;
                continue;
            }
        };

        match req.code {
            CommandCode::TEST => {
                debug!("usbshell: TEST");
                respond(t, RESULT_SUCCESS)?;
            }
            CommandCode::PROP => cmd_list_properties(t, caps)?,
            CommandCode::TLST => cmd_list_tweaks(t, caps)?,
            CommandCode::TSET => cmd_set_tweak(t, caps, &req)?,
            CommandCode::SHEL => cmd_shell(t, caps)?,
            CommandCode::EXEC => cmd_exec(t, caps, &req)?,
            CommandCode::PULL => cmd_pull(t, caps, &req)?,
            CommandCode::PUSH => cmd_push(t, caps, &req)?,
            CommandCode::STAT => cmd_stat(t, caps, &req)?,
            CommandCode::BROM => cmd_read_rom(t, caps)?,
            CommandCode::BLDR => cmd_dump_bootloader(t, caps)?,
            CommandCode::BKRD => cmd_backup_read(t, caps, &req)?,
            CommandCode::BKWR => cmd_backup_write(t, caps, &req)?,
            CommandCode::BKSY => cmd_backup_sync(t, caps)?,
            CommandCode::AMNT => cmd_android_mount(t, caps)?,
            CommandCode::AUMT => cmd_android_unmount(t, caps, &req)?,
            CommandCode::INFO => cmd_device_info(t, caps)?,
            CommandCode::EXIT => {
                info!("usbshell: EXIT");
                respond(t, RESULT_SUCCESS)?;
                return Ok(());
            }
            other => {
                warn!("usbshell: unknown command {other}");
                respond(t, RESULT_ERROR)?;
            }
        }
    }
}

fn respond<C: UsbCmd>(t: &mut SequenceTransfer<C>, result: i32) -> ShellResult<()> {
    t.write_frame(&result.to_le_bytes())
}

fn payload_path(req: &Request) -> &Path {
    Path::new(OsStr::from_bytes(req.cstr()))
}

// ── Enumeration commands ──────────────────────────────────────

fn cmd_list_properties<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    let available: Vec<usize> = caps
        .properties
        .iter()
        .enumerate()
        .filter(|(_, e)| e.property.is_available())
        .map(|(i, _)| i)
        .collect();
    info!("usbshell: PROP ({} available)", available.len());
    respond(t, available.len() as i32)?;

    for i in available {
        let entry = &caps.properties[i];
        t.read_empty()?;
        let value = entry.property.string_value();
        t.write_frame(&wire::encode_list_entry(entry.id, 0, value.as_bytes()))?;
    }
    Ok(())
}

fn cmd_list_tweaks<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    let available: Vec<usize> = caps
        .tweaks
        .iter()
        .enumerate()
        .filter(|(_, e)| e.tweak.is_available())
        .map(|(i, _)| i)
        .collect();
    info!("usbshell: TLST ({} available)", available.len());
    respond(t, available.len() as i32)?;

    for i in available {
        let entry = &caps.tweaks[i];
        t.read_empty()?;
        let status = entry.tweak.is_enabled() as i32;
        let value = entry.tweak.string_value();
        t.write_frame(&wire::encode_list_entry(entry.id, status, value.as_bytes()))?;
    }
    Ok(())
}

fn cmd_set_tweak<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let result = match wire::TweakSetArgs::parse(req.payload()) {
        Some(args) => match caps.find_tweak(args.id) {
            Some(tweak) if tweak.is_available() => match tweak.set_enabled(args.enable) {
                Ok(()) => RESULT_SUCCESS,
                Err(BackupError::Protected) => RESULT_ERROR_PROTECTION,
                Err(BackupError::Failed) => RESULT_ERROR,
            },
            _ => RESULT_ERROR,
        },
        None => RESULT_ERROR,
    };
    info!("usbshell: TSET -> {result}");
    respond(t, result)
}

// ── Subprocess commands ───────────────────────────────────────

fn cmd_shell<C: UsbCmd>(t: &mut SequenceTransfer<C>, caps: &mut CapabilitySet) -> ShellResult<()> {
    info!("usbshell: SHEL");
    match caps
        .spawner
        .spawn(&[OsStr::new("sh"), OsStr::new("-i")], true)
    {
        Ok(child) => {
            respond(t, RESULT_SUCCESS)?;
            stream_pipe_socket(t, child.stdin, Some(child.stdout))
        }
        Err(e) => {
            warn!("usbshell: SHEL spawn failed: {e}");
            respond(t, RESULT_ERROR)
        }
    }
}

fn cmd_exec<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let command = OsStr::from_bytes(req.cstr());
    info!("usbshell: EXEC {command:?}");
    match caps
        .spawner
        .spawn(&[OsStr::new("sh"), OsStr::new("-c"), command], false)
    {
        Ok(child) => {
            respond(t, RESULT_SUCCESS)?;
            stream_pipe_socket(t, None, Some(child.stdout))
        }
        Err(e) => {
            warn!("usbshell: EXEC spawn failed: {e}");
            respond(t, RESULT_ERROR)
        }
    }
}

// ── File commands ─────────────────────────────────────────────

fn cmd_pull<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let path = payload_path(req);
    let size = caps
        .files
        .file_size(path)
        .ok()
        .and_then(|n| i32::try_from(n).ok());
    let opened = match size {
        Some(size) => caps.files.open_read(path).ok().map(|f| (size, f)),
        None => None,
    };
    match opened {
        Some((size, mut file)) => {
            info!("usbshell: PULL {} ({size} bytes)", path.display());
            respond(t, size)?;
            stream_fd_to_host(t, &mut file)
        }
        None => {
            warn!("usbshell: PULL {} failed", path.display());
            respond(t, RESULT_ERROR)
        }
    }
}

fn cmd_push<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let path = payload_path(req);
    match caps.files.open_write(path) {
        Ok(mut file) => {
            info!("usbshell: PUSH {}", path.display());
            respond(t, RESULT_SUCCESS)?;
            stream_host_to_fd(t, &mut file)
        }
        Err(e) => {
            warn!("usbshell: PUSH {} failed: {e}", path.display());
            respond(t, RESULT_ERROR)
        }
    }
}

fn cmd_stat<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let path = payload_path(req);
    let result = caps
        .files
        .file_size(path)
        .ok()
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(RESULT_ERROR);
    debug!("usbshell: STAT {} -> {result}", path.display());
    respond(t, result)
}

// ── Bootloader commands ───────────────────────────────────────

fn cmd_read_rom<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    let rom = caps.bootloader.as_mut().and_then(|bl| bl.read_rom().ok());
    match rom {
        Some(rom) => {
            info!("usbshell: BROM ({} bytes)", rom.len());
            respond(t, rom.len() as i32)?;
            stream_buffer_to_host(t, &rom)
        }
        None => {
            warn!("usbshell: BROM failed");
            respond(t, RESULT_ERROR)
        }
    }
}

fn cmd_dump_bootloader<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    let opened = (|| {
        let mut dump = caps.bootloader.as_mut()?.open().ok()?;
        let blocks = dump.blocks().ok()?;
        Some((dump, blocks))
    })();

    match opened {
        Some((mut dump, blocks)) => {
            info!("usbshell: BLDR ({} blocks)", blocks.len());
            respond(t, blocks.len() as i32)?;
            for block in &blocks {
                // A block that fails to read still streams; the host sees
                // a lone terminator for that slot.
                let data = dump.read_block(block).unwrap_or_default();
                stream_buffer_to_host(t, &data)?;
            }
            Ok(())
        }
        None => {
            warn!("usbshell: BLDR failed");
            respond(t, RESULT_ERROR)
        }
    }
}

// ── Backup commands ───────────────────────────────────────────

fn cmd_backup_read<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let data = (|| {
        let backup = caps.backup.as_ref()?;
        let id = wire::parse_backup_read_args(req.payload())?;
        backup.borrow_mut().read(id).ok()
    })();
    match data {
        Some(data) => {
            info!("usbshell: BKRD ({} bytes)", data.len());
            respond(t, data.len() as i32)?;
            t.read_empty()?;
            t.write_frame(&data)
        }
        None => {
            warn!("usbshell: BKRD failed");
            respond(t, RESULT_ERROR)
        }
    }
}

fn cmd_backup_write<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let result = match (
        caps.backup.as_ref(),
        wire::parse_backup_write_args(req.payload()),
    ) {
        (Some(backup), Some((id, data))) => match backup.borrow_mut().write(id, data) {
            Ok(()) => RESULT_SUCCESS,
            Err(BackupError::Protected) => RESULT_ERROR_PROTECTION,
            Err(BackupError::Failed) => RESULT_ERROR,
        },
        _ => RESULT_ERROR,
    };
    info!("usbshell: BKWR -> {result}");
    respond(t, result)
}

fn cmd_backup_sync<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    match caps.backup.as_ref() {
        Some(backup) => {
            info!("usbshell: BKSY");
            backup.borrow_mut().sync_all();
            respond(t, RESULT_SUCCESS)
        }
        None => respond(t, RESULT_ERROR),
    }
}

// ── Android-data commands ─────────────────────────────────────

fn cmd_android_mount<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    let dir = caps.android.as_mut().and_then(|a| a.mount().ok());
    match dir {
        Some(dir) => {
            info!("usbshell: AMNT -> {dir}");
            respond(t, dir.len() as i32)?;
            t.read_empty()?;
            t.write_frame(dir.as_bytes())
        }
        None => {
            warn!("usbshell: AMNT failed");
            respond(t, RESULT_ERROR)
        }
    }
}

fn cmd_android_unmount<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
    req: &Request,
) -> ShellResult<()> {
    let result = match (
        caps.android.as_mut(),
        wire::parse_android_unmount_args(req.payload()),
    ) {
        (Some(android), Some(commit)) => match android.unmount(commit) {
            Ok(()) => RESULT_SUCCESS,
            Err(e) => {
                warn!("usbshell: AUMT failed: {e}");
                RESULT_ERROR
            }
        },
        _ => RESULT_ERROR,
    };
    info!("usbshell: AUMT -> {result}");
    respond(t, result)
}

// ── Device info ───────────────────────────────────────────────

fn cmd_device_info<C: UsbCmd>(
    t: &mut SequenceTransfer<C>,
    caps: &mut CapabilitySet,
) -> ShellResult<()> {
    let record = caps
        .device_info
        .as_mut()
        .and_then(|d| d.device_info().ok());
    match record {
        Some(rec) => {
            info!("usbshell: INFO");
            respond(t, RESULT_SUCCESS)?;
            t.read_empty()?;
            t.write_frame(&rec.to_bytes())
        }
        None => {
            warn!("usbshell: INFO failed");
            respond(t, RESULT_ERROR)
        }
    }
}
