#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use longerpull::core::codec::MessageCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to the server-side stream decoder: no panics, bounded bodies
    let mut codec = MessageCodec::server().with_max_body_size(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        assert!(frame.body.len() <= 64 * 1024);
    }
});
