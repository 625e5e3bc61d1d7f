//! Model-based test for the connection registry.
//!
//! Random add/remove sequences are applied to both the registry and a
//! `BTreeSet` model; after every step a snapshot must contain exactly the
//! model's members.

use std::collections::BTreeSet;

use proptest::prelude::*;
use ws_relay::transport::OutboundWriter;
use ws_relay::{ConnectionHandle, ConnectionId, ConnectionRegistry};

const POOL: usize = 8;

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..POOL).prop_map(Op::Add),
        (0..POOL).prop_map(Op::Remove),
    ]
}

fn pool() -> Vec<(ConnectionHandle, OutboundWriter)> {
    (0..POOL)
        .map(|_| ConnectionHandle::channel(ConnectionId::next(), None, 1))
        .collect()
}

proptest! {
    #[test]
    fn snapshot_matches_model(ops in prop::collection::vec(op(), 1..64)) {
        let handles = pool();
        let registry = ConnectionRegistry::new();
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Add(i) => {
                    let id = handles[i].0.id();
                    let inserted = registry.add(handles[i].0.clone());
                    prop_assert_eq!(inserted, model.insert(id));
                }
                Op::Remove(i) => {
                    let id = handles[i].0.id();
                    let removed = registry.remove(id).is_some();
                    prop_assert_eq!(removed, model.remove(&id));
                }
            }

            let snapshot: BTreeSet<_> =
                registry.snapshot().iter().map(ConnectionHandle::id).collect();
            prop_assert_eq!(&snapshot, &model);
            prop_assert_eq!(registry.len(), model.len());
        }
    }
}
