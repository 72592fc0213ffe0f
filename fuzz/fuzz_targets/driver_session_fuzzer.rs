//! Fuzz target for the server driver.
//!
//! Runs arbitrary interleavings of connects, joins, binary frames, relays,
//! heartbeats, sync ticks, and disconnects through `ServerDriver`.
//!
//! # Invariants
//!
//! - Live ids are unique and never 0
//! - Every room's buffer length equals the sum of its members' max payload
//! - Every member of a room records that room as its own
//! - A sync tick leaves every room clean
//! - Errors only ever report unknown sessions

#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use bytes::Bytes;
use fastsync_server::{DriverConfig, DriverError, ServerDriver, ServerEvent};
use libfuzzer_sys::fuzz_target;

const ROOMS: [&str; 3] = ["r1", "r2", "r3"];

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    evict_empty_rooms: bool,
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect,
    Join { session: u8, room: u8 },
    Binary { session: u8, len: u8 },
    Relay { session: u8 },
    Garbage { session: u8, text: String },
    Pong { session: u8 },
    Close { session: u8 },
    Heartbeat,
    Sync,
}

fuzz_target!(|scenario: Scenario| {
    let config = DriverConfig { evict_empty_rooms: scenario.evict_empty_rooms, ..DriverConfig::default() };
    let mut driver = ServerDriver::new(config);

    for op in scenario.ops.into_iter().take(256) {
        let event = match op {
            Op::Connect => {
                let _ = driver.accept();
                None
            },
            Op::Join { session, room } => Some(ServerEvent::TextReceived {
                session_id: u64::from(session % 8),
                text: format!(r#"["HANDSHAKE","{}"]"#, ROOMS[usize::from(room) % ROOMS.len()]),
            }),
            Op::Binary { session, len } => Some(ServerEvent::BinaryReceived {
                session_id: u64::from(session % 8),
                data: Bytes::from(vec![len; usize::from(len)]),
            }),
            Op::Relay { session } => Some(ServerEvent::TextReceived {
                session_id: u64::from(session % 8),
                text: r#"["CHAT","hi"]"#.to_string(),
            }),
            Op::Garbage { session, text } => {
                Some(ServerEvent::TextReceived { session_id: u64::from(session % 8), text })
            },
            Op::Pong { session } => {
                Some(ServerEvent::PongReceived { session_id: u64::from(session % 8) })
            },
            Op::Close { session } => Some(ServerEvent::ConnectionClosed {
                session_id: u64::from(session % 8),
                reason: "fuzz".to_string(),
            }),
            Op::Heartbeat => Some(ServerEvent::HeartbeatTick),
            Op::Sync => Some(ServerEvent::SyncTick),
        };

        let is_sync = matches!(event, Some(ServerEvent::SyncTick));

        if let Some(event) = event {
            match driver.process_event(event) {
                Ok(_) | Err(DriverError::SessionNotFound(_)) => {},
                Err(e) => panic!("unexpected driver error: {e}"),
            }
        }

        check_invariants(&driver, is_sync);
    }
});

fn check_invariants(driver: &ServerDriver, after_sync: bool) {
    let live: BTreeSet<u64> = driver.session_ids().collect();
    assert!(!live.contains(&0));
    assert_eq!(live.len(), driver.connection_count());

    for key in ROOMS {
        let Some(room) = driver.room(key) else {
            continue;
        };

        let mut expected_len = 0;
        for id in room.member_ids() {
            let conn = driver.connection(id).expect("room member must be live");
            assert_eq!(conn.room_key(), Some(key));
            assert_eq!(room.reserved(id), Some(conn.max_payload_size()));
            expected_len += conn.max_payload_size();
        }

        assert_eq!(room.buffer_len(), expected_len);
        if after_sync {
            assert!(room.is_clean());
        }
    }
}
