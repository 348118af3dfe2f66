//! Deferred calls run once at the first physical commit

use crate::common::*;
use parking_lot::Mutex;
use polystore::TriggerKey;
use std::sync::Arc;

#[test]
fn trigger_writes_inside_committing_transaction() {
    let t = TwoStores::new();

    let outer = t.coordinator.begin().unwrap();
    insert(&t.store1, 1).unwrap();
    insert(&t.store2, 2).unwrap();

    let inner = t.coordinator.begin().unwrap();
    let added: Vec<bool> = (0..3)
        .map(|_| {
            let store1 = t.store1.clone();
            inner
                .add_trigger(TriggerKey::new("audit").arg(1000i64), move || {
                    insert(&store1, 1000)
                })
                .unwrap()
        })
        .collect();
    assert_eq!(added, vec![true, false, false]);
    assert_eq!(t.coordinator.pending_triggers(), 1);
    inner.commit().unwrap();
    assert!(t.rows(&t.store1).is_empty());

    outer.commit().unwrap();

    assert_eq!(t.rows(&t.store1), vec![1, 1000]);
    assert_eq!(t.rows(&t.store2), vec![2]);
    assert_eq!(t.coordinator.pending_triggers(), 0);
    t.assert_idle();
}

#[test]
fn trigger_skipped_on_rollback() {
    let t = TwoStores::new();
    let fired = Arc::new(Mutex::new(0));

    let txn = t.coordinator.begin().unwrap();
    insert(&t.store1, 1).unwrap();
    let counter = Arc::clone(&fired);
    txn.add_trigger(TriggerKey::new("notify").arg("orders"), move || {
        *counter.lock() += 1;
        Ok(())
    })
    .unwrap();
    txn.rollback().unwrap();

    assert_eq!(*fired.lock(), 0);
    assert_eq!(t.coordinator.pending_triggers(), 0);
    t.assert_idle();
}

#[test]
fn failing_trigger_prevents_physical_commit() {
    let t = TwoStores::new();

    let txn = t.coordinator.begin().unwrap();
    insert(&t.store1, 1).unwrap();
    txn.add_trigger(TriggerKey::new("reject"), || {
        Err(polystore::Error::protocol("rejected by trigger"))
    })
    .unwrap();

    assert!(txn.commit().unwrap_err().is_protocol());
    txn.rollback().unwrap();

    assert!(t.rows(&t.store1).is_empty());
    t.assert_idle();
}
