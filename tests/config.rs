use adboard::config::{Config, ConfigError, FileStoreKind};
use adboard::Concurrency;
use serial_test::serial;
use std::env;

const VARS: &[&str] = &["JWT_SECRET", "PORT", "FILE_STORE", "OPTIMISTIC_LOCKING", "MAX_UPLOAD_BYTES", "SNAPSHOT_PATH"];

fn clear_env() {
    for v in VARS {
        env::remove_var(v);
    }
}

#[test]
#[serial]
fn secret_is_required_and_must_be_long() {
    clear_env();
    assert!(matches!(Config::from_env(), Err(ConfigError::Missing("JWT_SECRET"))));

    env::set_var("JWT_SECRET", "short");
    assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret)));
}

#[test]
#[serial]
fn defaults_apply_when_unset() {
    clear_env();
    env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.file_store, FileStoreKind::Local);
    assert_eq!(cfg.concurrency, Concurrency::Optimistic);
    assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
    assert!(cfg.snapshot_path.is_none());
}

#[test]
#[serial]
fn malformed_values_are_reported() {
    clear_env();
    env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    env::set_var("FILE_STORE", "ftp");
    assert!(matches!(Config::from_env(), Err(ConfigError::Invalid { name: "FILE_STORE", .. })));

    env::remove_var("FILE_STORE");
    env::set_var("PORT", "eighty");
    assert!(matches!(Config::from_env(), Err(ConfigError::Invalid { name: "PORT", .. })));

    env::remove_var("PORT");
    env::set_var("OPTIMISTIC_LOCKING", "false");
    assert_eq!(Config::from_env().unwrap().concurrency, Concurrency::LastWriteWins);
    clear_env();
}
