//! Tests for the SQL account repository on the embedded engine.

use std::sync::Arc;
use std::thread;

use diesel::prelude::*;
use diesel::sql_types::BigInt;
use tempfile::TempDir;

use strictly_ledger::{
    AccountRepository, ConnectionFactory, DATABASE_FILE, DbErrorKind, INITIAL_SCHEMA_VERSION,
    SaveOutcome, SchemaNames, SqlRepository, SqliteFactory, StorageConfig,
};

/// Creates a temporary data directory and an initialized repository in it.
/// The directory handle must stay in scope to keep the files alive.
fn setup_repo() -> (TempDir, SqlRepository<SqliteFactory>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = StorageConfig::default()
        .with_data_dir(dir.path())
        .with_default_balance(30.0);
    let repo = SqlRepository::sqlite(&config).expect("Failed to create repository");
    repo.init().expect("Init failed");
    (dir, repo)
}

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

/// Counts rows through a separate raw connection.
fn count_rows(dir: &TempDir, table: &str) -> i64 {
    let path = dir.path().join(DATABASE_FILE);
    let mut conn =
        SqliteConnection::establish(path.to_str().expect("Invalid path")).expect("Failed to connect");
    diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table}"))
        .get_result::<Count>(&mut conn)
        .expect("Count failed")
        .n
}

#[test]
fn test_embedded_engine_capabilities() {
    let (dir, repo) = setup_repo();
    assert_eq!(repo.backend_name(), "SQLite");
    assert!(!repo.supports_modification());
    assert_eq!(
        repo.factory().database_path(),
        dir.path().join(DATABASE_FILE).as_path()
    );
    assert!(dir.path().join(DATABASE_FILE).exists());
}

#[test]
fn test_init_is_idempotent() {
    let (dir, repo) = setup_repo();
    repo.save_account("Alice", None, 10.0).expect("Save failed");
    repo.init().expect("Second init failed");
    repo.init().expect("Third init failed");
    assert_eq!(count_rows(&dir, "fe_accounts"), 1);
    assert_eq!(count_rows(&dir, "fe_version"), 1);
}

#[test]
fn test_fresh_connection_seeds_version() {
    let (_dir, repo) = setup_repo();
    assert_eq!(repo.version().expect("Version failed"), Some(INITIAL_SCHEMA_VERSION));
}

#[test]
fn test_set_version_keeps_one_row() {
    let (dir, repo) = setup_repo();
    repo.set_version(3).expect("Set failed");
    assert_eq!(repo.version().expect("Version failed"), Some(3));
    repo.set_version(4).expect("Set failed");
    assert_eq!(repo.version().expect("Version failed"), Some(4));
    assert_eq!(count_rows(&dir, "fe_version"), 1);
}

#[test]
fn test_version_survives_reopen() {
    let (dir, repo) = setup_repo();
    repo.set_version(7).expect("Set failed");
    repo.close();

    let config = StorageConfig::default().with_data_dir(dir.path());
    let reopened = SqlRepository::sqlite(&config).expect("Failed to reopen");
    reopened.init().expect("Init failed");
    assert_eq!(reopened.version().expect("Version failed"), Some(7));
}

#[test]
fn test_version_none_when_table_empty() {
    let (dir, repo) = setup_repo();
    let path = dir.path().join(DATABASE_FILE);
    let mut raw = SqliteConnection::establish(path.to_str().expect("Invalid path"))
        .expect("Failed to connect");
    diesel::sql_query("DELETE FROM fe_version")
        .execute(&mut raw)
        .expect("Delete failed");

    assert_eq!(repo.version().expect("Version failed"), None);
}

#[test]
fn test_save_then_load_round_trip() {
    let (_dir, repo) = setup_repo();
    let outcome = repo
        .save_account("Alice", Some("uuid-a"), 42.5)
        .expect("Save failed");
    assert_eq!(outcome, SaveOutcome::Inserted);

    let account = repo
        .load_account("Alice", Some("uuid-a"))
        .expect("Load failed")
        .expect("Account missing");
    assert_eq!(account.display_name(), "Alice");
    assert_eq!(account.identifier().as_deref(), Some("uuid-a"));
    assert_eq!(*account.balance(), 42.5);
}

#[test]
fn test_repeated_saves_keep_one_row_per_identity() {
    let (dir, repo) = setup_repo();
    for _ in 0..5 {
        repo.save_account("Bob", None, 5.0).expect("Save failed");
    }
    for _ in 0..5 {
        repo.save_account("Carol", Some("uuid-c"), 8.0).expect("Save failed");
    }
    assert_eq!(count_rows(&dir, "fe_accounts"), 2);
    assert_eq!(
        repo.save_account("Bob", None, 6.0).expect("Save failed"),
        SaveOutcome::Updated(1)
    );
}

#[test]
fn test_save_by_identifier_updates_display_name() {
    let (dir, repo) = setup_repo();
    repo.save_account("OldName", Some("uuid-d"), 1.0).expect("Save failed");
    repo.save_account("NewName", Some("UUID-D"), 2.0).expect("Save failed");

    assert_eq!(count_rows(&dir, "fe_accounts"), 1);
    let account = repo
        .load_account("whatever", Some("uuid-d"))
        .expect("Load failed")
        .expect("Account missing");
    assert_eq!(account.display_name(), "NewName");
    assert_eq!(*account.balance(), 2.0);
}

#[test]
fn test_identifier_takes_precedence_over_name() {
    let (_dir, repo) = setup_repo();
    repo.save_account("Eve", Some("uuid-e"), 3.0).expect("Save failed");
    repo.save_account("Mallory", None, 9.0).expect("Save failed");

    let found = repo
        .load_account("Mallory", Some("uuid-e"))
        .expect("Load failed")
        .expect("Account missing");
    assert_eq!(found.display_name(), "Eve");

    let missing = repo
        .load_account("Eve", Some("uuid-unknown"))
        .expect("Load failed");
    assert!(missing.is_none());
}

#[test]
fn test_lookup_is_case_insensitive() {
    let (_dir, repo) = setup_repo();
    repo.save_account("Alice", None, 12.0).expect("Save failed");
    let account = repo
        .load_account("alice", None)
        .expect("Load failed")
        .expect("Account missing");
    assert_eq!(account.display_name(), "Alice");
    assert_eq!(*account.balance(), 12.0);
}

#[test]
fn test_name_match_is_not_a_pattern() {
    let (_dir, repo) = setup_repo();
    repo.save_account("abc", None, 1.0).expect("Save failed");
    assert!(repo.load_account("a_c", None).expect("Load failed").is_none());
    assert!(repo.load_account("a%", None).expect("Load failed").is_none());
}

#[test]
fn test_load_missing_account() {
    let (_dir, repo) = setup_repo();
    assert!(repo.load_account("Nobody", None).expect("Load failed").is_none());
}

#[test]
fn test_accounts_lists_everything() {
    let (_dir, repo) = setup_repo();
    assert!(repo.accounts().expect("List failed").is_empty());
    repo.save_account("A", None, 1.0).expect("Save failed");
    repo.save_account("B", Some("uuid-b"), 2.0).expect("Save failed");

    let mut names: Vec<String> = repo
        .accounts()
        .expect("List failed")
        .iter()
        .map(|a| a.display_name().clone())
        .collect();
    names.sort();
    assert_eq!(names, ["A", "B"]);
}

#[test]
fn test_top_accounts_sorted_and_limited() {
    let (_dir, repo) = setup_repo();
    repo.save_account("Fifty", None, 50.0).expect("Save failed");
    repo.save_account("Ten", None, 10.0).expect("Save failed");
    repo.save_account("Ninety", None, 90.0).expect("Save failed");

    let top = repo.top_accounts(2).expect("Top failed");
    let balances: Vec<f64> = top.iter().map(|a| *a.balance()).collect();
    assert_eq!(balances, [90.0, 50.0]);

    assert_eq!(repo.top_accounts(10).expect("Top failed").len(), 3);
    assert!(repo.top_accounts(0).expect("Top failed").is_empty());
}

#[test]
fn test_remove_account() {
    let (dir, repo) = setup_repo();
    repo.save_account("Gone", None, 1.0).expect("Save failed");
    repo.save_account("Stays", Some("uuid-s"), 1.0).expect("Save failed");

    assert_eq!(repo.remove_account("GONE", None).expect("Remove failed"), 1);
    assert_eq!(count_rows(&dir, "fe_accounts"), 1);

    assert_eq!(
        repo.remove_account("ignored", Some("uuid-s")).expect("Remove failed"),
        1
    );
    assert_eq!(count_rows(&dir, "fe_accounts"), 0);
}

#[test]
fn test_remove_missing_account_is_noop() {
    let (dir, repo) = setup_repo();
    repo.save_account("Keep", None, 1.0).expect("Save failed");
    assert_eq!(repo.remove_account("Ghost", None).expect("Remove failed"), 0);
    assert_eq!(count_rows(&dir, "fe_accounts"), 1);
}

#[test]
fn test_remove_all_accounts() {
    let (dir, repo) = setup_repo();
    for name in ["A", "B", "C"] {
        repo.save_account(name, None, 1.0).expect("Save failed");
    }
    assert_eq!(repo.remove_all_accounts().expect("Remove failed"), 3);
    assert_eq!(count_rows(&dir, "fe_accounts"), 0);
    assert_eq!(count_rows(&dir, "fe_version"), 1);
}

#[test]
fn test_clean_respects_presence() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repo = SqlRepository::new(SqliteFactory::new(dir.path()), SchemaNames::default())
        .expect("Failed to create repository")
        .with_default_balance(30.0)
        .with_presence(|name: &str| name == "Online");
    repo.init().expect("Init failed");

    repo.save_account("Offline", None, 30.0).expect("Save failed");
    repo.save_account("Online", None, 30.0).expect("Save failed");
    repo.save_account("Rich", None, 31.0).expect("Save failed");

    assert_eq!(repo.clean().expect("Clean failed"), 1);
    assert!(repo.load_account("Offline", None).expect("Load failed").is_none());
    assert!(repo.load_account("Online", None).expect("Load failed").is_some());
    assert!(repo.load_account("Rich", None).expect("Load failed").is_some());
}

#[test]
fn test_clean_spares_namesake_with_balance() {
    let (dir, repo) = setup_repo();
    repo.save_account("Twin", Some("uuid-a"), 30.0).expect("Save failed");
    repo.save_account("Twin", Some("uuid-b"), 75.0).expect("Save failed");

    assert_eq!(repo.clean().expect("Clean failed"), 1);
    assert_eq!(count_rows(&dir, "fe_accounts"), 1);
    let kept = repo
        .load_account("Twin", Some("uuid-b"))
        .expect("Load failed")
        .expect("Funded twin should remain");
    assert_eq!(*kept.balance(), 75.0);
}

#[test]
fn test_clean_with_nothing_to_prune() {
    let (dir, repo) = setup_repo();
    repo.save_account("Rich", None, 100.0).expect("Save failed");
    assert_eq!(repo.clean().expect("Clean failed"), 0);
    assert_eq!(count_rows(&dir, "fe_accounts"), 1);
}

#[test]
fn test_clean_handles_large_batches() {
    let (dir, repo) = setup_repo();
    for i in 0..600 {
        repo.save_account(&format!("idle_{i}"), None, 30.0).expect("Save failed");
    }
    repo.save_account("quoted'name", None, 30.0).expect("Save failed");
    assert_eq!(repo.clean().expect("Clean failed"), 601);
    assert_eq!(count_rows(&dir, "fe_accounts"), 0);
}

#[test]
fn test_custom_names() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let names = SchemaNames::default()
        .with_accounts_table("wallets")
        .with_version_table("wallet_version")
        .with_name_column("player")
        .with_money_column("coins")
        .with_identifier_column("player_id");
    let repo = SqlRepository::new(SqliteFactory::new(dir.path()), names)
        .expect("Failed to create repository");
    repo.init().expect("Init failed");
    repo.save_account("Zed", Some("id-z"), 4.0).expect("Save failed");

    assert_eq!(count_rows(&dir, "wallets"), 1);
    assert_eq!(count_rows(&dir, "wallet_version"), 1);
    let top = repo.top_accounts(1).expect("Top failed");
    assert_eq!(top[0].display_name(), "Zed");
}

#[test]
fn test_invalid_names_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let names = SchemaNames::default().with_accounts_table("accounts; DROP TABLE x");
    let err = SqlRepository::new(SqliteFactory::new(dir.path()), names)
        .expect_err("Invalid name accepted");
    assert_eq!(err.kind, DbErrorKind::InvalidSchema);
}

#[test]
fn test_missing_data_dir_is_unavailable() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let factory = SqliteFactory::new(dir.path().join("does/not/exist"));
    assert!(factory.connect().is_err());

    let repo = SqlRepository::new(factory, SchemaNames::default())
        .expect("Failed to create repository");
    let err = repo.init().expect_err("Init should fail");
    assert_eq!(err.kind, DbErrorKind::Unavailable);
    assert!(!repo.is_connected());
    assert_eq!(
        repo.accounts().expect_err("List should fail").kind,
        DbErrorKind::Unavailable
    );
}

#[test]
fn test_close_then_reuse_reconnects() {
    let (_dir, repo) = setup_repo();
    repo.save_account("Alice", None, 1.0).expect("Save failed");
    repo.close();
    repo.close();
    assert!(!repo.is_connected());

    let account = repo.load_account("Alice", None).expect("Load failed");
    assert!(account.is_some());
    assert!(repo.is_connected());
}

#[test]
fn test_close_without_open() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repo = SqlRepository::new(SqliteFactory::new(dir.path()), SchemaNames::default())
        .expect("Failed to create repository");
    repo.close();
    assert!(!repo.is_connected());
}

#[test]
fn test_concurrent_saves_to_one_identity() {
    let (dir, repo) = setup_repo();
    let repo = Arc::new(repo);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for _ in 0..10 {
                    repo.save_account("Shared", Some("uuid-shared"), f64::from(i))
                        .expect("Save failed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(count_rows(&dir, "fe_accounts"), 1);
}
