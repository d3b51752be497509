//! Fuzz target for identification string parsing.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run identification -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use tether_proto::ssh::SshIdentification;

fuzz_target!(|data: &[u8]| {
    if let Ok(id) = SshIdentification::parse(data) {
        // Whatever parsed must survive a trip through the wire form
        let wire = id.to_wire_format();
        let line = &wire[..wire.len() - 2];
        let reparsed = SshIdentification::parse(line).expect("wire form must parse");
        assert_eq!(id, reparsed);
    }
});
