//! Property-based tests for the server driver.
//!
//! Random interleavings of connects, joins, binary frames, pongs, closes, and
//! timer ticks are fed to a [`ServerDriver`]. Events target live sessions, so
//! every step exercises real state transitions.

use std::collections::HashMap;

use bytes::Bytes;
use fastsync_core::ConnId;
use fastsync_server::{OutboundMessage, ServerAction, ServerDriver, ServerEvent};
use proptest::prelude::*;

const ROOMS: [&str; 3] = ["r1", "r2", "r3"];

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Join(usize, usize),
    Binary(usize, usize),
    Pong(usize),
    Close(usize),
    Heartbeat,
    Sync,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Connect),
        3 => (any::<usize>(), 0..ROOMS.len()).prop_map(|(s, r)| Op::Join(s, r)),
        4 => (any::<usize>(), 0usize..48).prop_map(|(s, len)| Op::Binary(s, len)),
        1 => any::<usize>().prop_map(Op::Pong),
        1 => any::<usize>().prop_map(Op::Close),
        1 => Just(Op::Heartbeat),
        2 => Just(Op::Sync),
    ]
}

/// Pick a live session by index, if any.
fn pick(driver: &ServerDriver, index: usize) -> Option<ConnId> {
    let live: Vec<ConnId> = driver.session_ids().collect();
    if live.is_empty() { None } else { Some(live[index % live.len()]) }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: every room's buffer is exactly the sum of its members'
    /// largest payloads, and every member is a live connection in that room
    #[test]
    fn prop_room_layout_tracks_members(ops in prop::collection::vec(op_strategy(), 1..96)) {
        let mut driver = ServerDriver::default();
        let mut high_water: HashMap<ConnId, usize> = HashMap::new();

        for op in ops {
            let event = match op {
                Op::Connect => {
                    let (id, _) = driver.accept();
                    prop_assert_ne!(id, 0);
                    high_water.insert(id, 0);
                    None
                },
                Op::Join(s, r) => pick(&driver, s).map(|session_id| ServerEvent::TextReceived {
                    session_id,
                    text: format!(r#"["HANDSHAKE","{}"]"#, ROOMS[r]),
                }),
                Op::Binary(s, len) => pick(&driver, s).map(|session_id| {
                    ServerEvent::BinaryReceived { session_id, data: Bytes::from(vec![7u8; len]) }
                }),
                Op::Pong(s) => pick(&driver, s).map(|session_id| ServerEvent::PongReceived { session_id }),
                Op::Close(s) => pick(&driver, s).map(|session_id| ServerEvent::ConnectionClosed {
                    session_id,
                    reason: "test".to_string(),
                }),
                Op::Heartbeat => Some(ServerEvent::HeartbeatTick),
                Op::Sync => Some(ServerEvent::SyncTick),
            };

            if let Some(event) = event {
                driver.process_event(event)?;
            }

            for id in driver.session_ids() {
                let size = driver.connection(id).unwrap().max_payload_size();
                let previous = high_water.insert(id, size).unwrap_or(0);
                prop_assert!(size >= previous, "max payload of {} shrank", id);
            }

            for key in ROOMS {
                let Some(room) = driver.room(key) else { continue };

                let mut total = 0;
                for id in room.member_ids() {
                    let conn = driver.connection(id).unwrap();
                    prop_assert_eq!(conn.room_key(), Some(key));
                    prop_assert_eq!(room.reserved(id), Some(conn.max_payload_size()));
                    total += conn.max_payload_size();
                }
                prop_assert_eq!(room.buffer_len(), total);
            }
        }
    }

    /// Property: a sync tick sends each dirty room's tail to exactly its
    /// members and leaves every room clean
    #[test]
    fn prop_sync_flushes_to_members(
        writes in prop::collection::vec((0usize..4, 0..ROOMS.len(), 1usize..24), 1..32)
    ) {
        let mut driver = ServerDriver::default();
        let ids: Vec<ConnId> = (0..4).map(|_| driver.accept().0).collect();

        for (who, room, len) in writes {
            let session_id = ids[who];
            let text = format!(r#"["HANDSHAKE","{}"]"#, ROOMS[room]);
            driver.process_event(ServerEvent::TextReceived { session_id, text })?;
            driver.process_event(ServerEvent::BinaryReceived {
                session_id,
                data: Bytes::from(vec![who as u8; len]),
            })?;
        }

        let expected: Vec<(Vec<ConnId>, Vec<u8>)> = ROOMS
            .iter()
            .filter_map(|key| driver.room(key))
            .filter_map(|room| {
                let start = room.dirty_start()?;
                Some((room.member_ids(), room.buffer()[start..].to_vec()))
            })
            .collect();

        let actions = driver.process_event(ServerEvent::SyncTick)?;
        let flushed: Vec<(Vec<ConnId>, Vec<u8>)> = actions
            .into_iter()
            .filter_map(|action| match action {
                ServerAction::Broadcast { session_ids, message: OutboundMessage::Binary(data) } => {
                    Some((session_ids, data.to_vec()))
                },
                _ => None,
            })
            .collect();

        prop_assert_eq!(flushed.len(), expected.len());
        for item in &expected {
            prop_assert!(flushed.contains(item));
        }
        for key in ROOMS {
            if let Some(room) = driver.room(key) {
                prop_assert!(room.is_clean());
            }
        }
    }
}
