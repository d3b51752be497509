//! Fuzz target for message dispatch and decoding.
//!
//! Every message the authentication phase can see is enabled; the decoder
//! must reject or load arbitrary payloads without panicking.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run message_decode -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use tether_proto::ssh::factory::MessageFactory;

fuzz_target!(|data: &[u8]| {
    let mut factory = MessageFactory::new();
    for name in [
        "SSH_MSG_DISCONNECT",
        "SSH_MSG_IGNORE",
        "SSH_MSG_UNIMPLEMENTED",
        "SSH_MSG_DEBUG",
        "SSH_MSG_SERVICE_ACCEPT",
        "SSH_MSG_USERAUTH_FAILURE",
        "SSH_MSG_USERAUTH_SUCCESS",
        "SSH_MSG_USERAUTH_BANNER",
    ] {
        let _ = factory.enable_and_activate(name);
    }

    let selector = data.first().copied().unwrap_or(0) % 3;
    let shared = match selector {
        0 => "SSH_MSG_USERAUTH_PK_OK",
        1 => "SSH_MSG_USERAUTH_PASSWD_CHANGEREQ",
        _ => "SSH_MSG_USERAUTH_INFO_REQUEST",
    };
    let _ = factory.enable_and_activate(shared);

    if data.len() > 1 {
        let _ = factory.decode(&data[1..]);
    }
});
