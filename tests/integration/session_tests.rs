//! Full-session scenarios against the scripted master.
//!
//! Every test drives the real dispatcher over the mock carrier; the mock
//! enforces the sequence envelope on each exchange, so frame parity and
//! counter lockstep are asserted on every test implicitly.

use std::os::unix::ffi::OsStrExt;
use std::rc::Rc;

use proptest::prelude::*;

use updatershell::caps::{BackupError, CapabilitySet};
use updatershell::shell::dispatch::run_command_loop;
use updatershell::shell::transfer::SequenceTransfer;
use updatershell::shell::wire::{
    self, CommandCode, DeviceInfoRecord, DATA_CHUNK_LEN, RESULT_ERROR, RESULT_ERROR_PROTECTION,
    RESULT_SUCCESS,
};

use crate::mock_caps::{
    base_caps, property_entry, tweak_entry, FixedAndroid, FixedBootloader, FixedInfo, MemBackup,
};
use crate::mock_usb::MockHost;

fn run(mut host: MockHost, caps: &mut CapabilitySet) -> MockHost {
    let mut transfer = SequenceTransfer::new(&mut host);
    run_command_loop(&mut transfer, caps).expect("session failed");
    host
}

fn path_bytes(path: &std::path::Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

fn tset_payload(id: [u8; 4], enable: bool) -> Vec<u8> {
    let mut p = id.to_vec();
    p.extend_from_slice(&(enable as u32).to_le_bytes());
    p
}

fn bkwr_payload(id: u32, data: &[u8]) -> Vec<u8> {
    let mut p = id.to_le_bytes().to_vec();
    p.extend_from_slice(&(data.len() as u32).to_le_bytes());
    p.extend_from_slice(data);
    p
}

// ── Basic request/response ────────────────────────────────────

#[test]
fn test_round_trip_with_sequence_lockstep() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::TEST, &[])
        .request(CommandCode::TEST, &[])
        .request(CommandCode::TEST, &[])
        .exit();

    let host = run(host, &mut caps);
    assert!(host.finished());
    assert_eq!(host.results, [0, 0, 0, 0]);
    // One response frame per parity-1 command, nothing else.
    assert_eq!(host.frames.len(), 4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any interleaving of single-response commands keeps the counter in
    /// lockstep and yields exactly one result per request.
    #[test]
    fn parity_one_commands_stay_in_lockstep(cmds in proptest::collection::vec(0u8..3, 1..12)) {
        let mut caps = base_caps();
        let mut host = MockHost::new();
        let mut expected = Vec::new();
        for c in &cmds {
            match c {
                0 => {
                    host = host.request(CommandCode::TEST, &[]);
                    expected.push(RESULT_SUCCESS);
                }
                1 => {
                    host = host.request(CommandCode::STAT, b"/nonexistent/nowhere");
                    expected.push(RESULT_ERROR);
                }
                _ => {
                    host = host.request(CommandCode(*b"????"), &[]);
                    expected.push(RESULT_ERROR);
                }
            }
        }
        host = host.exit();
        expected.push(RESULT_SUCCESS);

        let host = run(host, &mut caps);
        prop_assert!(host.finished());
        prop_assert_eq!(host.results, expected);
    }
}

#[test]
fn unknown_command_answers_error_and_session_continues() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode(0xdeadbeefu32.to_le_bytes()), &[])
        .request(CommandCode::TEST, &[])
        .exit();

    let host = run(host, &mut caps);
    assert_eq!(host.results, [RESULT_ERROR, RESULT_SUCCESS, RESULT_SUCCESS]);
}

// ── Enumeration ───────────────────────────────────────────────

#[test]
fn prop_enumerates_available_in_table_order() {
    let mut caps = base_caps();
    caps.properties = vec![
        property_entry(*b"MODL", "DSC-RX100", true),
        property_entry(*b"PROD", "A123", true),
        property_entry(*b"SERN", "Z9", true),
        property_entry(*b"FIRM", "1.10", false),
    ];

    let host = MockHost::new()
        .request(CommandCode::PROP, &[])
        .probes(3)
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results[0], 3);
    let expected = [(*b"MODL", "DSC-RX100"), (*b"PROD", "A123"), (*b"SERN", "Z9")];
    for (frame, (id, value)) in host.frames[1..4].iter().zip(expected) {
        assert_eq!(frame.len(), wire::LIST_ENTRY_LEN);
        assert_eq!(&frame[..4], &id);
        assert_eq!(&frame[4..8], &0i32.to_le_bytes());
        assert_eq!(&frame[8..8 + value.len()], value.as_bytes());
        assert_eq!(frame[8 + value.len()], 0);
    }
}

#[test]
fn tlst_reports_enabled_state_as_status() {
    let mut caps = base_caps();
    caps.tweaks = vec![
        tweak_entry(*b"RECL", true, true, None),
        tweak_entry(*b"NTSC", true, false, None),
        tweak_entry(*b"UAPP", false, false, None),
    ];

    let host = MockHost::new()
        .request(CommandCode::TLST, &[])
        .probes(2)
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results[0], 2);
    assert_eq!(&host.frames[1][..4], b"RECL");
    assert_eq!(&host.frames[1][4..8], &1i32.to_le_bytes());
    assert_eq!(&host.frames[2][..4], b"NTSC");
    assert_eq!(&host.frames[2][4..8], &0i32.to_le_bytes());
}

#[test]
fn tset_maps_the_protection_taxonomy() {
    let mut caps = base_caps();
    caps.tweaks = vec![
        tweak_entry(*b"UAPP", true, false, None),
        tweak_entry(*b"NTSC", true, false, Some(BackupError::Protected)),
        tweak_entry(*b"RECL", true, false, Some(BackupError::Failed)),
        tweak_entry(*b"RL4K", false, false, None),
    ];

    let host = MockHost::new()
        .request(CommandCode::TSET, &tset_payload(*b"UAPP", true))
        .request(CommandCode::TSET, &tset_payload(*b"NTSC", true))
        .request(CommandCode::TSET, &tset_payload(*b"RECL", true))
        .request(CommandCode::TSET, &tset_payload(*b"RL4K", true))
        .request(CommandCode::TSET, &tset_payload(*b"ZZZZ", true))
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(
        host.results[..5],
        [
            RESULT_SUCCESS,
            RESULT_ERROR_PROTECTION,
            RESULT_ERROR,
            RESULT_ERROR,
            RESULT_ERROR,
        ]
    );
    assert!(caps.find_tweak(*b"UAPP").unwrap().is_enabled());
}

// ── Files ─────────────────────────────────────────────────────

#[test]
fn push_stat_pull_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x");
    let payload = b"hello world";

    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::PUSH, path_bytes(&path))
        .push_data(payload)
        .request(CommandCode::STAT, path_bytes(&path))
        .request(CommandCode::PULL, path_bytes(&path))
        .pull()
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results[0], RESULT_SUCCESS);
    assert_eq!(host.results[1], payload.len() as i32); // STAT
    assert_eq!(host.results[2], payload.len() as i32); // PULL
    assert_eq!(host.pulled[0], payload);
    assert_eq!(std::fs::read(&path).unwrap(), payload);
}

#[test]
fn pull_streams_in_chunks_with_one_terminator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big");
    let data: Vec<u8> = (0..DATA_CHUNK_LEN + 5).map(|i| i as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::PULL, path_bytes(&path))
        .pull()
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.pulled[0], data);
    // Response, full chunk, short chunk, terminator, exit response.
    let sizes: Vec<usize> = host.frames[1..4]
        .iter()
        .map(|f| wire::parse_data_msg(f).unwrap().len())
        .collect();
    assert_eq!(sizes, [DATA_CHUNK_LEN, 5, 0]);
}

#[test]
fn pull_missing_path_answers_error_without_stream() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::PULL, b"/nonexistent/nowhere")
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results, [RESULT_ERROR, RESULT_SUCCESS]);
    assert_eq!(host.frames.len(), 2);
}

#[test]
fn pull_cancel_stops_the_stream_early() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big");
    let data = vec![0x5A; 3 * DATA_CHUNK_LEN];
    std::fs::write(&path, &data).unwrap();

    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::PULL, path_bytes(&path))
        .pull_with_cancel(Some(1))
        .exit();
    let host = run(host, &mut caps);

    // The cancel round still carries its chunk; nothing follows it.
    assert_eq!(host.pulled[0].len(), 2 * DATA_CHUNK_LEN);
}

#[test]
fn stat_missing_path_answers_error() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::STAT, b"/nonexistent/nowhere")
        .exit();
    let host = run(host, &mut caps);
    assert_eq!(host.results[0], RESULT_ERROR);
}

// ── Bootloader ────────────────────────────────────────────────

#[test]
fn brom_streams_the_rom() {
    let rom: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
    let mut caps = base_caps();
    caps.bootloader = Some(Box::new(FixedBootloader {
        rom: Some(rom.clone()),
        blocks: None,
    }));

    let host = MockHost::new()
        .request(CommandCode::BROM, &[])
        .pull()
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results[0], rom.len() as i32);
    assert_eq!(host.pulled[0], rom);
}

#[test]
fn brom_failure_answers_error_without_stream() {
    let mut caps = base_caps();
    caps.bootloader = Some(Box::new(FixedBootloader {
        rom: None,
        blocks: None,
    }));

    let host = MockHost::new().request(CommandCode::BROM, &[]).exit();
    let host = run(host, &mut caps);
    assert_eq!(host.results, [RESULT_ERROR, RESULT_SUCCESS]);
}

#[test]
fn bldr_failed_block_still_emits_a_terminator() {
    let mut caps = base_caps();
    caps.bootloader = Some(Box::new(FixedBootloader {
        rom: None,
        blocks: Some(vec![
            Some(b"block one".to_vec()),
            None, // read failure
            Some(b"block three".to_vec()),
        ]),
    }));

    let host = MockHost::new()
        .request(CommandCode::BLDR, &[])
        .pull()
        .pull()
        .pull()
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results[0], 3);
    assert_eq!(host.pulled[0], b"block one");
    assert_eq!(host.pulled[1], b"");
    assert_eq!(host.pulled[2], b"block three");
}

#[test]
fn bldr_block_list_failure_streams_nothing() {
    let mut caps = base_caps();
    caps.bootloader = Some(Box::new(FixedBootloader {
        rom: None,
        blocks: None,
    }));

    let host = MockHost::new().request(CommandCode::BLDR, &[]).exit();
    let host = run(host, &mut caps);
    assert_eq!(host.results, [RESULT_ERROR, RESULT_SUCCESS]);
}

// ── Backup registers ──────────────────────────────────────────

#[test]
fn backup_write_then_read_roundtrip() {
    let mem = MemBackup::shared(&[(0x10, b"old"), (0x20, b"keep")], &[]);
    let mut caps = base_caps();
    caps.backup = Some(mem.clone());

    let host = MockHost::new()
        .request(CommandCode::BKWR, &bkwr_payload(0x10, b"new"))
        .request(CommandCode::BKRD, &0x10u32.to_le_bytes())
        .probe()
        .request(CommandCode::BKSY, &[])
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results, [0, 3, 0, 0]);
    // The probed record is the raw register contents.
    assert_eq!(host.frames[2], b"new");
    assert_eq!(mem.borrow().syncs, 1);
}

#[test]
fn backup_write_taxonomy() {
    let mem = MemBackup::shared(&[(0x10, b"ok")], &[0x30]);
    mem.borrow_mut().regs.insert(0x30, b"ro".to_vec());
    let mut caps = base_caps();
    caps.backup = Some(mem);

    let host = MockHost::new()
        .request(CommandCode::BKWR, &bkwr_payload(0x30, b"xx"))
        .request(CommandCode::BKWR, &bkwr_payload(0x99, b"xx"))
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(
        host.results[..2],
        [RESULT_ERROR_PROTECTION, RESULT_ERROR]
    );
}

#[test]
fn backup_commands_without_capability_answer_error() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::BKRD, &0u32.to_le_bytes())
        .request(CommandCode::BKWR, &bkwr_payload(0, b"x"))
        .request(CommandCode::BKSY, &[])
        .exit();
    let host = run(host, &mut caps);
    assert_eq!(host.results[..3], [RESULT_ERROR; 3]);
}

// ── Android data ──────────────────────────────────────────────

#[test]
fn amnt_reports_the_mount_directory() {
    let unmounts = Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut caps = base_caps();
    caps.android = Some(Box::new(FixedAndroid {
        dir: "/mnt",
        mount_fails: false,
        unmounts: unmounts.clone(),
    }));

    let host = MockHost::new()
        .request(CommandCode::AMNT, &[])
        .probe()
        .request(CommandCode::AUMT, &1u32.to_le_bytes())
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results, [4, 0, 0]);
    assert_eq!(host.frames[1], b"/mnt");
    assert_eq!(*unmounts.borrow(), [true]);
}

#[test]
fn android_commands_without_capability_answer_error() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::AMNT, &[])
        .request(CommandCode::AUMT, &0u32.to_le_bytes())
        .exit();
    let host = run(host, &mut caps);
    assert_eq!(host.results[..2], [RESULT_ERROR; 2]);
}

// ── Device info ───────────────────────────────────────────────

#[test]
fn info_serves_the_27_byte_record() {
    let record = DeviceInfoRecord {
        model: *b"DSC-RX100\0\0\0\0\0\0\0",
        product: [1, 2, 3, 4, 5],
        serial: [9, 8, 7, 6],
        firmware: 0x0110,
    };
    let mut caps = base_caps();
    caps.device_info = Some(Box::new(FixedInfo(record)));

    let host = MockHost::new()
        .request(CommandCode::INFO, &[])
        .probe()
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results, [0, 0]);
    assert_eq!(host.frames[1], record.to_bytes());
}

#[test]
fn info_without_capability_answers_error() {
    let mut caps = base_caps();
    let host = MockHost::new().request(CommandCode::INFO, &[]).exit();
    let host = run(host, &mut caps);
    assert_eq!(host.results, [RESULT_ERROR, RESULT_SUCCESS]);
}

// ── Subprocesses ──────────────────────────────────────────────

#[test]
fn exec_streams_child_output() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::EXEC, b"echo hi")
        .pipe(None)
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results, [RESULT_SUCCESS, RESULT_SUCCESS]);
    assert_eq!(host.pipe_output, b"hi\n");
}

#[test]
fn exec_empty_command_terminates_cleanly() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::EXEC, b"")
        .pipe(None)
        .exit();
    let host = run(host, &mut caps);

    assert!(host.finished());
    assert!(host.pipe_output.is_empty());
}

#[test]
fn shel_runs_an_interactive_shell() {
    let mut caps = base_caps();
    let host = MockHost::new()
        .request(CommandCode::SHEL, &[])
        .pipe(Some(b"echo from-shell\nexit\n"))
        .exit();
    let host = run(host, &mut caps);

    assert_eq!(host.results[0], RESULT_SUCCESS);
    let output = String::from_utf8_lossy(&host.pipe_output).into_owned();
    assert!(output.contains("from-shell"), "output: {output:?}");
}
