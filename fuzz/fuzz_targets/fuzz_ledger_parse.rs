#![no_main]

use clickup_sync::sync::SyncLedger;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Unreadable input degrades to an empty ledger; it must never panic.
    let ledger = SyncLedger::from_yaml_str(text);
    let _ = ledger.len();
});
