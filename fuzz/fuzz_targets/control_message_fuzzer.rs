//! Fuzz target for control message parsing.
//!
//! Feeds arbitrary text to `Inbound::parse`. Malformed input must come back
//! as an error, never a panic.
//!
//! # Invariants
//!
//! - Only the exact probe literal parses as `Probe`
//! - A parsed relay re-encodes to a three element array with the same tag

#![no_main]

use fastsync_core::{Inbound, Outbound, PING_LITERAL};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    let Ok(inbound) = Inbound::parse(text) else {
        return;
    };

    match inbound {
        Inbound::Probe => assert_eq!(text, PING_LITERAL),
        Inbound::Join { .. } => {},
        Inbound::Relay { tag, payload } | Inbound::RelayTargeted { tag, payload, .. } => {
            let encoded = Outbound::Relay { tag: tag.clone(), sender: 7, payload }.encode();

            match Inbound::parse(&encoded) {
                Ok(Inbound::RelayTargeted { tag: reparsed, .. }) => assert_eq!(reparsed, tag),
                other => panic!("relay re-encoded as {other:?}"),
            }
        },
    }
});
