#![no_main]

use clickup_sync::config::{ConfigLayer, SyncConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(layer) = ConfigLayer::from_yaml_str(text) {
        let _ = SyncConfig::from_layer(&layer);
    }
});
