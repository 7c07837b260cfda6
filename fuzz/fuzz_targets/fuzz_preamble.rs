#![no_main]

use libfuzzer_sys::fuzz_target;
use longerpull::core::preamble::{decode_preamble, start_of_frame};

fuzz_target!(|data: &[u8]| {
    // Any decoded preamble must carry a matching start-of-frame byte
    if let Ok(p) = decode_preamble(data) {
        assert_eq!(data[0], start_of_frame(p.size.wrapping_add(p.msg_id)));
        assert_eq!(p.to_bytes()[..9], data[..9]);
    }
});
