//! Runs against a disposable PostgreSQL container; needs a Docker daemon.
//! Run with `cargo test -p tinylink-storage -- --ignored`.

use std::collections::HashMap;
use std::time::Duration;

use tinylink_core::{Resolution, ShortCode, Statistics, Storage, StorageError, UrlTable, UserId};
use tinylink_storage::PostgresStorage;
use tinylink_test_infra::postgres::{PostgresConfig, PostgresServer};

struct Fixture {
    _postgres: PostgresServer,
    storage: PostgresStorage,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let storage = connect_with_retry(&url).await;

        Self {
            _postgres: postgres,
            storage,
        }
    }
}

async fn connect_with_retry(url: &str) -> PostgresStorage {
    let mut last_error = None;

    for _ in 0..20 {
        match PostgresStorage::connect(url).await {
            Ok(storage) => return storage,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

fn user(value: &str) -> UserId {
    UserId::new(value)
}

fn entry(owner: &str, c: &str, url: &str) -> UrlTable {
    UrlTable::from([(user(owner), HashMap::from([(code(c), url.to_string())]))])
}

#[tokio::test]
#[ignore = "requires docker"]
async fn save_and_read_all() {
    let fixture = Fixture::start().await;

    fixture
        .storage
        .save(entry("alice", "abc123", "https://example.com"))
        .await
        .unwrap();
    fixture
        .storage
        .save(UrlTable::from([(user("bob"), HashMap::new())]))
        .await
        .unwrap();

    let table = fixture.storage.read_all().await.unwrap();
    assert_eq!(table[&user("alice")][&code("abc123")], "https://example.com");
    assert!(table[&user("bob")].is_empty());
    assert!(fixture.storage.has_user(&user("bob")).await.unwrap());
    assert!(!fixture.storage.has_user(&user("carol")).await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn duplicate_original_url_is_a_conflict() {
    let fixture = Fixture::start().await;

    fixture
        .storage
        .save(entry("alice", "abc123", "https://example.com"))
        .await
        .unwrap();

    let err = fixture
        .storage
        .save(entry("bob", "xyz789", "https://example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Conflict { .. }));
    // The transaction rolled back, so bob's partition was not created either.
    assert!(!fixture.storage.has_user(&user("bob")).await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn delete_marks_record_as_soft_deleted() {
    let fixture = Fixture::start().await;

    fixture
        .storage
        .save(entry("alice", "abc123", "https://example.com"))
        .await
        .unwrap();

    // Someone else's delete is a no-op.
    fixture
        .storage
        .delete(&[code("abc123")], &user("bob"))
        .await
        .unwrap();
    assert_eq!(
        fixture.storage.resolve(&code("abc123")).await.unwrap(),
        Resolution::Active("https://example.com".to_string())
    );

    fixture
        .storage
        .delete(&[code("abc123"), code("unknown")], &user("alice"))
        .await
        .unwrap();
    assert_eq!(
        fixture.storage.resolve(&code("abc123")).await.unwrap(),
        Resolution::Deleted
    );

    let table = fixture.storage.read_all().await.unwrap();
    assert_eq!(table[&user("alice")][&code("abc123")], "-https://example.com");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn resolve_unknown_code_is_missing() {
    let fixture = Fixture::start().await;

    assert_eq!(
        fixture.storage.resolve(&code("nope")).await.unwrap(),
        Resolution::Missing
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn ping_and_statistics() {
    let fixture = Fixture::start().await;

    fixture.storage.ping().await.unwrap();

    fixture
        .storage
        .save(entry("alice", "aaa", "https://a.example"))
        .await
        .unwrap();
    fixture
        .storage
        .save(entry("alice", "bbb", "https://b.example"))
        .await
        .unwrap();

    assert_eq!(
        fixture.storage.statistics().await.unwrap(),
        Statistics { urls: 2, users: 1 }
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn migrations_are_idempotent() {
    let fixture = Fixture::start().await;

    fixture.storage.migrate().await.unwrap();
    fixture.storage.migrate().await.unwrap();
}
