//! End-to-end scenarios over real SQLite databases

#[path = "../common/mod.rs"]
mod common;

mod config_file;
mod constraint_violation;
mod triggers;
mod unknown_state;
