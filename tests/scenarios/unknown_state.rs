//! A physical commit that fails part way reports an unknown state

use crate::common::*;

/// End the store's physical transaction behind the engine's back
fn terminate_session(store: &polystore::Store<polystore::SqliteDriver>) {
    store.execute(|conn| conn.execute_batch("ROLLBACK")).unwrap();
}

#[test]
fn second_store_failure_keeps_first_store_committed() {
    let t = TwoStores::new();

    let txn = t.coordinator.begin().unwrap();
    insert(&t.store1, 1).unwrap();
    insert(&t.store2, 2).unwrap();
    terminate_session(&t.store2);

    let err = txn.commit().unwrap_err();
    assert!(err.is_unknown_state());

    // No compensation for the store that already committed
    assert_eq!(t.rows(&t.store1), vec![1]);
    assert!(t.rows(&t.store2).is_empty());

    txn.rollback().unwrap();
    t.assert_idle();
}

#[test]
fn first_store_failure_rolls_back_the_rest() {
    let t = TwoStores::new();

    let txn = t.coordinator.begin().unwrap();
    insert(&t.store1, 1).unwrap();
    insert(&t.store2, 2).unwrap();
    terminate_session(&t.store1);

    assert!(txn.commit().unwrap_err().is_unknown_state());
    drop(txn);

    assert!(t.rows(&t.store1).is_empty());
    assert!(t.rows(&t.store2).is_empty());
    t.assert_idle();
}

#[test]
fn begin_refused_until_failed_transaction_is_released() {
    let t = TwoStores::new();

    let txn = t.coordinator.begin().unwrap();
    insert(&t.store2, 2).unwrap();
    terminate_session(&t.store2);
    assert!(txn.commit().unwrap_err().is_unknown_state());

    // Store 1 committed its level, so it is now shallower than the coordinator
    let err = t.coordinator.begin().unwrap_err();
    assert!(err.is_unknown_state());
    assert!(err.to_string().contains("test1"));

    txn.rollback().unwrap();
    t.coordinator.begin().unwrap().commit().unwrap();
    t.assert_idle();
}
