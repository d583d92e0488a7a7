mod common;

use lodestone_core::{Store, StoreConfig, StoreError};

fn record_count(store: &Store) -> u64 {
    let filter = store.filter("Record").unwrap();
    store.count(&[filter]).unwrap()
}

#[test]
fn committed_batch_is_visible() {
    let mut store = common::memory_store();
    store.open_transaction().unwrap();
    for tag in ["a", "b", "c"] {
        let mut entity = common::tagged(&store, &[tag]);
        store.mass_update(&mut entity).unwrap();
    }
    store.commit().unwrap();

    assert!(!store.in_transaction());
    assert_eq!(record_count(&store), 3);
}

#[test]
fn rolled_back_batch_is_not_visible() {
    let mut store = common::memory_store();
    store.open_transaction().unwrap();
    for tag in ["a", "b"] {
        let mut entity = common::tagged(&store, &[tag]);
        store.mass_update(&mut entity).unwrap();
    }
    store.rollback().unwrap();

    assert_eq!(record_count(&store), 0);
}

#[test]
fn uncommitted_batch_is_discarded_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.db");

    let mut store =
        Store::open(StoreConfig::file(&path), common::catalog(), common::ENTITY_TYPES).unwrap();
    store.open_transaction().unwrap();
    for tag in ["a", "b", "c", "d"] {
        let mut entity = common::tagged(&store, &[tag]);
        store.mass_update(&mut entity).unwrap();
    }
    assert!(matches!(store.close(), Err(StoreError::TransactionLeftOpen)));
    assert!(store.is_closed());

    let reopened =
        Store::open(StoreConfig::file(&path), common::catalog(), common::ENTITY_TYPES).unwrap();
    assert_eq!(record_count(&reopened), 0);
}

#[test]
fn uncommitted_batch_is_discarded_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dropped.db");

    {
        let mut store =
            Store::open(StoreConfig::file(&path), common::catalog(), common::ENTITY_TYPES)
                .unwrap();
        store.open_transaction().unwrap();
        let mut entity = common::tagged(&store, &["a"]);
        store.mass_update(&mut entity).unwrap();
    }

    let reopened =
        Store::open(StoreConfig::file(&path), common::catalog(), common::ENTITY_TYPES).unwrap();
    assert_eq!(record_count(&reopened), 0);
}

#[test]
fn mass_update_and_commit_require_open_transaction() {
    let mut store = common::memory_store();
    let mut entity = common::record(&store);

    assert!(matches!(
        store.mass_update(&mut entity),
        Err(StoreError::NoTransaction)
    ));
    assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
    assert!(matches!(store.rollback(), Err(StoreError::NoTransaction)));
}

#[test]
fn nested_open_transaction_is_rejected() {
    let mut store = common::memory_store();
    store.open_transaction().unwrap();
    assert!(matches!(
        store.open_transaction(),
        Err(StoreError::TransactionAlreadyOpen)
    ));
    store.rollback().unwrap();
}

#[test]
fn persist_inside_open_transaction_follows_the_transaction() {
    let mut store = common::memory_store();
    store.open_transaction().unwrap();
    let mut batch = vec![common::tagged(&store, &["a"])];
    store.persist(&mut batch).unwrap();
    assert_eq!(record_count(&store), 1);
    store.rollback().unwrap();

    assert_eq!(record_count(&store), 0);
}
