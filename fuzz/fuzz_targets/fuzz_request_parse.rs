//! Fuzz target: request and argument parsers.
//!
//! Drives arbitrary bytes through every parser that faces host-chosen
//! data and asserts that none of them panics and that every returned
//! slice stays within bounds.
//!
//! cargo fuzz run fuzz_request_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use updatershell::shell::wire::{self, Request, SocketHeader, BACKUP_DATA_LEN};

fuzz_target!(|data: &[u8]| {
    if let Some(req) = Request::parse(data) {
        let cstr = req.cstr();
        assert!(cstr.len() <= req.payload().len());
        assert!(!cstr.contains(&0));

        let _ = wire::TweakSetArgs::parse(req.payload());
        let _ = wire::parse_backup_read_args(req.payload());
        let _ = wire::parse_android_unmount_args(req.payload());
        if let Some((_, bytes)) = wire::parse_backup_write_args(req.payload()) {
            assert!(bytes.len() <= BACKUP_DATA_LEN);
        }
    }

    if let Some(payload) = wire::parse_data_msg(data) {
        assert!(payload.len() + 4 <= data.len());
    }
    let _ = SocketHeader::parse(data);
    let _ = wire::parse_status_msg(data);
});
