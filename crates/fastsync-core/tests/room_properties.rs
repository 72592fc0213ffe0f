//! Property-based tests for the room buffer.
//!
//! Random sequences of joins, leaves, and writes are applied to a [`Room`]
//! alongside a plain model of member reservations. After every step the
//! buffer layout must match the model.

use fastsync_core::{ConnId, Room};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Join(ConnId),
    Leave(ConnId),
    Write(ConnId, Vec<u8>),
    Flush,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..6).prop_map(Op::Join),
        (1u64..6).prop_map(Op::Leave),
        ((1u64..6), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(id, data)| Op::Write(id, data)),
        Just(Op::Flush),
    ]
}

/// Members and reservations in join order.
#[derive(Default)]
struct Model {
    members: Vec<(ConnId, usize)>,
}

impl Model {
    fn offset_of(&self, id: ConnId) -> Option<usize> {
        let pos = self.members.iter().position(|(m, _)| *m == id)?;
        Some(self.members[..pos].iter().map(|(_, r)| r).sum())
    }

    fn total(&self) -> usize {
        self.members.iter().map(|(_, r)| r).sum()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: buffer length always equals the sum of reservations, and
    /// offsets are prefix sums in join order
    #[test]
    fn prop_layout_matches_model(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut room = Room::new();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Join(id) => {
                    let joined = room.join(id, 0)?;
                    prop_assert_eq!(joined, model.offset_of(id).is_none());
                    if joined {
                        model.members.push((id, 0));
                    }
                },
                Op::Leave(id) => {
                    let left = room.leave(id)?;
                    prop_assert_eq!(left, model.offset_of(id).is_some());
                    model.members.retain(|(m, _)| *m != id);
                },
                Op::Write(id, data) => {
                    if model.offset_of(id).is_none() {
                        prop_assert!(room.write(id, &data).is_err());
                        continue;
                    }
                    room.reserve(id, data.len())?;
                    if let Some(entry) = model.members.iter_mut().find(|(m, _)| *m == id) {
                        entry.1 = entry.1.max(data.len());
                    }
                    let offset = room.write(id, &data)?;
                    prop_assert_eq!(Some(offset), model.offset_of(id));
                    prop_assert_eq!(&room.buffer()[offset..offset + data.len()], &data[..]);
                },
                Op::Flush => {
                    room.take_dirty();
                    prop_assert!(room.is_clean());
                },
            }

            prop_assert_eq!(room.buffer_len(), model.total());
            prop_assert_eq!(
                room.member_ids(),
                model.members.iter().map(|(m, _)| *m).collect::<Vec<_>>()
            );
            for (id, _) in &model.members {
                prop_assert_eq!(room.offset_of(*id), model.offset_of(*id));
            }
        }
    }

    /// Property: dirty start is the lowest offset written since the last
    /// flush or resize, and the flushed bytes are the buffer tail from there
    #[test]
    fn prop_dirty_start_is_min_written_offset(
        sizes in prop::collection::vec(1usize..16, 1..6),
        writes in prop::collection::vec(any::<prop::sample::Index>(), 1..16)
    ) {
        let mut room = Room::new();
        for (i, size) in sizes.iter().enumerate() {
            room.join(i as ConnId + 1, *size)?;
        }

        let mut lowest = usize::MAX;
        for index in writes {
            let id = index.index(sizes.len()) as ConnId + 1;
            let offset = room.write(id, &[0xAB])?;
            lowest = lowest.min(offset);
            prop_assert_eq!(room.dirty_start(), Some(lowest));
        }

        let expected = room.buffer()[lowest..].to_vec();
        let flushed = room.take_dirty();
        prop_assert_eq!(flushed.as_deref(), Some(&expected[..]));
        prop_assert!(room.take_dirty().is_none());
    }

    /// Property: a resize zero-fills the buffer and marks the room clean
    #[test]
    fn prop_resize_zero_fills(
        data in prop::collection::vec(1u8.., 1..32),
        grow_by in 1usize..16
    ) {
        let mut room = Room::new();
        room.join(1, data.len())?;
        room.join(2, 4)?;
        room.write(1, &data)?;

        room.reserve(2, 4 + grow_by)?;

        prop_assert!(room.is_clean());
        prop_assert!(room.buffer().iter().all(|b| *b == 0));
        prop_assert_eq!(room.buffer_len(), data.len() + 4 + grow_by);
    }
}
