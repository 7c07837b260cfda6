#![no_main]

use libfuzzer_sys::fuzz_target;
use longerpull::utils::compression::{compress, decompress, CompressionKind};

const LIMIT: usize = 1 << 20;

fuzz_target!(|data: &[u8]| {
    for (kind, level) in [
        (CompressionKind::Zlib, 6),
        (CompressionKind::Lz4, 0),
        (CompressionKind::Zstd, 3),
    ] {
        if let Ok(compressed) = compress(data, &kind, level) {
            if let Ok(out) = decompress(&compressed, &kind, usize::MAX) {
                assert_eq!(out, data);
            }
        }

        // Malformed input must fail cleanly and respect the size limit
        if let Ok(out) = decompress(data, &kind, LIMIT) {
            assert!(out.len() <= LIMIT);
        }
    }
});
