#![no_main]

use libfuzzer_sys::fuzz_target;
use nandpatch_core::DeviceLayout;

fuzz_target!(|data: &[u8]| {
    // Layout parsing must never panic, and an accepted layout must place
    // every slot inside the image
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(layout) = DeviceLayout::from_json(json) {
        for slot in &layout.slots {
            let offset = layout.byte_offset(slot.block).expect("checked layout overflowed");
            assert!(offset < layout.expected_size);
        }
    }
});
