//! Integration tests for encrypted persistence through a store.

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{eventually, init_tracing};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use univrs_store::{
    EncryptedAdapter, EncryptionConfig, KeyDerivation, MemoryMedium, PersistenceAdapter,
    PersistenceConfig, SqliteMedium, StateError, StorageMedium, Store, StoreOptions, FIXED_SALT,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    token: String,
    remember: bool,
}

fn session() -> Session {
    Session {
        user: "guest".to_string(),
        token: String::new(),
        remember: false,
    }
}

fn encrypted(passphrase: &str) -> PersistenceConfig {
    PersistenceConfig::Encrypted(EncryptionConfig::new(passphrase).with_key_derivation(
        KeyDerivation {
            iterations: 1_000,
            salt: FIXED_SALT.to_vec(),
        },
    ))
}

fn options(medium: Arc<dyn StorageMedium>, passphrase: &str) -> StoreOptions {
    StoreOptions::new()
        .with_storage_key("session")
        .with_shared_medium(medium)
        .with_persistence(encrypted(passphrase))
        .with_debounce(Duration::from_millis(10))
}

#[tokio::test]
async fn encrypted_store_survives_restart() {
    init_tracing();
    let memory = MemoryMedium::new();
    let medium: Arc<dyn StorageMedium> = Arc::new(memory.clone());

    let store = Store::create(session(), options(medium.clone(), "hunter2"));
    store.ready().await;
    assert!(store.is_encrypted());

    store
        .set(serde_json::json!({ "user": "ada", "remember": true }))
        .unwrap();
    eventually(|| memory.raw("session").is_some()).await;

    let record = memory.raw("session").unwrap();
    assert!(!record.contains("ada"));
    assert!(STANDARD.decode(&record).is_ok());

    let restored = Store::create(session(), options(medium, "hunter2"));
    restored.ready().await;
    assert_eq!(
        restored.get_state(),
        Session {
            user: "ada".to_string(),
            token: String::new(),
            remember: true,
        }
    );
}

#[tokio::test]
async fn wrong_passphrase_starts_from_initial_value() {
    let memory = MemoryMedium::new();
    let medium: Arc<dyn StorageMedium> = Arc::new(memory.clone());

    let store = Store::create(session(), options(medium.clone(), "right"));
    store.ready().await;
    store.update(|s| Session {
        user: "ada".to_string(),
        ..s.clone()
    });
    eventually(|| memory.raw("session").is_some()).await;

    let other = Store::create(session(), options(medium, "wrong"));
    other.ready().await;
    assert_eq!(other.get_state(), session());
}

#[tokio::test]
async fn corrupted_base64_record_is_absent() {
    init_tracing();
    let memory = MemoryMedium::new();
    memory.insert_raw("session", "this is ### not base64");
    let medium: Arc<dyn StorageMedium> = Arc::new(memory.clone());

    let adapter = EncryptedAdapter::new(
        EncryptionConfig::new("secret").with_key_derivation(KeyDerivation {
            iterations: 1_000,
            salt: FIXED_SALT.to_vec(),
        }),
        Some(medium.clone()),
    );
    assert_eq!(adapter.get::<Session>("session").await, None);

    // The error absorbed and logged by `get` is a crypto failure, a cache miss.
    let err = adapter.try_get::<Session>("session").await.unwrap_err();
    assert!(matches!(err, StateError::Crypto(_)));
    assert!(err.is_cache_miss());
    assert!(!adapter.is_key_derived());

    let store = Store::create(session(), options(medium, "secret"));
    store.ready().await;
    assert_eq!(store.get_state(), session());
}

#[tokio::test]
async fn round_trip_every_kind_and_reject_other_passphrase() {
    let medium: Arc<dyn StorageMedium> = Arc::new(MemoryMedium::new());
    let kdf = KeyDerivation {
        iterations: 1_000,
        salt: FIXED_SALT.to_vec(),
    };
    let right = EncryptedAdapter::new(
        EncryptionConfig::new("right").with_key_derivation(kdf.clone()),
        Some(medium.clone()),
    );
    let wrong = EncryptedAdapter::new(
        EncryptionConfig::new("wrong").with_key_derivation(kdf),
        Some(medium),
    );

    let sealed = right.encrypt(&-12.5f64).await.unwrap();
    assert_eq!(right.decrypt::<f64>(&sealed).await.unwrap(), -12.5);
    assert!(wrong.decrypt::<f64>(&sealed).await.is_err());

    let sealed = right.encrypt(&false).await.unwrap();
    assert!(!right.decrypt::<bool>(&sealed).await.unwrap());
    assert!(wrong.decrypt::<bool>(&sealed).await.is_err());

    let sealed = right.encrypt("true").await.unwrap();
    assert_eq!(right.decrypt::<String>(&sealed).await.unwrap(), "true");

    let sealed = right.encrypt(&vec![session()]).await.unwrap();
    assert_eq!(
        right.decrypt::<Vec<Session>>(&sealed).await.unwrap(),
        vec![session()]
    );

    let sealed = right.encrypt(&session()).await.unwrap();
    assert_eq!(right.decrypt::<Session>(&sealed).await.unwrap(), session());
    assert!(wrong.decrypt::<Session>(&sealed).await.is_err());
}

#[tokio::test]
async fn encrypted_store_on_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");

    {
        let sqlite = Arc::new(SqliteMedium::open(&path).await.unwrap());
        let store = Store::create(session(), options(sqlite.clone(), "pw"));
        store.ready().await;

        store.update(|s| Session {
            token: "abc123".to_string(),
            ..s.clone()
        });
        let probe = sqlite.clone();
        tokio::time::timeout(Duration::from_secs(5), async {
            while probe.get_item("session").await.ok().flatten().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        sqlite.close().await;
    }

    let sqlite: Arc<dyn StorageMedium> = Arc::new(SqliteMedium::open(&path).await.unwrap());
    let store = Store::create(session(), options(sqlite, "pw"));
    store.ready().await;
    assert_eq!(store.get_state().token, "abc123");
}
