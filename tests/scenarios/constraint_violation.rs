//! A driver error deep inside nested transactions rolls everything back

use crate::common::*;
use polystore::TransactionState;

#[test]
fn duplicate_key_surfaces_unmodified() {
    let t = TwoStores::new();

    let outer = t.coordinator.begin().unwrap();
    insert(&t.store1, 1).unwrap();
    insert(&t.store2, 2).unwrap();

    let middle = t.coordinator.begin().unwrap();
    let inner = t.coordinator.begin().unwrap();
    insert(&t.store2, 3).unwrap();
    inner.commit().unwrap();

    let err = insert(&t.store2, 3).unwrap_err();
    assert!(err.is_driver());
    let cause = err.downcast_driver::<rusqlite::Error>().unwrap();
    assert_eq!(
        cause.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    );

    assert_eq!(middle.state(), TransactionState::RolledBack);
    assert_eq!(outer.state(), TransactionState::RolledBack);
    assert!(middle.commit().unwrap_err().is_protocol());

    assert!(t.rows(&t.store1).is_empty());
    assert!(t.rows(&t.store2).is_empty());
    t.assert_idle();
}

#[test]
fn closure_error_rolls_back_and_is_returned() {
    let t = TwoStores::new();

    let err = t
        .coordinator
        .transaction(|_txn| {
            insert(&t.store1, 1)?;
            insert(&t.store1, 1)?;
            Ok(())
        })
        .unwrap_err();

    assert!(err.is_driver());
    assert!(t.rows(&t.store1).is_empty());
    t.assert_idle();
}
