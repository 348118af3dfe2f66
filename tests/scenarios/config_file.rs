//! Stores assembled from a polystore.toml file

use crate::common::*;
use polystore::{config::CONFIG_FILE_NAME, open_stores, StoresConfig};
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let first = create_db(dir.path(), "orders.db");
    let second = create_db(dir.path(), "billing.db");
    let content = format!(
        r#"
[[store]]
name = "orders"
driver = "sqlite"
connection = "{}"

[[store]]
name = "billing"
driver = "sqlite"
connection = "{}"
busy_timeout_ms = 500
"#,
        first.display(),
        second.display()
    );
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn configured_stores_commit_together() {
    let dir = TempDir::new().unwrap();
    let config = StoresConfig::from_file(&write_config(&dir)).unwrap();
    let (coordinator, stores) = open_stores(&config).unwrap();

    assert_eq!(coordinator.store_names(), vec!["orders", "billing"]);

    let txn = coordinator.begin().unwrap();
    insert(&stores[0], 1).unwrap();
    insert(&stores[1], 1).unwrap();
    txn.commit().unwrap();

    assert_eq!(rows(stores[0].driver().path()), vec![1]);
    assert_eq!(rows(stores[1].driver().path()), vec![1]);
    assert_eq!(coordinator.transactions_count(), 0);
}

#[test]
fn duplicate_store_names_rejected() {
    let content = r#"
[[store]]
name = "orders"
driver = "sqlite"
connection = "a.db"

[[store]]
name = "orders"
driver = "sqlite"
connection = "b.db"
"#;
    let err = StoresConfig::from_toml_str(content).unwrap_err();
    assert!(err.is_configuration());
}
