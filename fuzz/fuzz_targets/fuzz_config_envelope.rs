//! Fuzz target: persisted config envelope decoder.
//!
//! Feeds arbitrary bytes to `decode()`: must never panic, and anything
//! that decodes must be re-encodable within the blob limit.
//!
//! cargo fuzz run fuzz_config_envelope

#![no_main]

use libfuzzer_sys::fuzz_target;

use espkit::adapters::nvs::{MAX_BLOB_SIZE, decode, encode};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = decode(data) else {
        return;
    };
    if let Ok(blob) = encode(&doc) {
        assert!(blob.len() <= MAX_BLOB_SIZE);
        assert!(decode(&blob).is_ok());
    }
});
