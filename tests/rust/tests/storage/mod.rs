//! Credential store over the SQLite repository

use std::sync::Arc;

use memberhub_connector::credentials::keys;
use memberhub_connector::oauth::CodeVerifier;
use memberhub_core::AuthSession;
use memberhub_storage::{generate_master_key, Database, FieldEncryptor};
use pretty_assertions::assert_eq;
use tests::db::TestDatabase;
use tests::fixtures;

#[test]
fn test_database_creates_file() {
    let test_db = TestDatabase::new();
    assert!(!test_db.db_path().exists());

    let _db = Database::open(test_db.db_path()).expect("Failed to open database");
    assert!(test_db.db_path().exists());

    // Opening again runs no migration twice
    let again = Database::open(test_db.db_path()).expect("Failed to reopen database");
    assert_eq!(again.schema_version(), 1);
}

#[tokio::test]
async fn test_session_roundtrip() {
    let test_db = TestDatabase::new();
    let store = test_db.credential_store();
    let session = fixtures::session("tok1");

    store.save(&session).await.unwrap();
    let loaded = store.load().await.unwrap();

    assert_eq!(loaded.access_token, "tok1");
    assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(loaded.user, session.user);
}

#[tokio::test]
async fn test_session_survives_reopen() {
    let test_db = TestDatabase::new();
    test_db
        .credential_store()
        .save(&fixtures::session("tok1"))
        .await
        .unwrap();

    // New connection, same master key
    let reopened = test_db.credential_store();
    let loaded = reopened.load().await.unwrap();
    assert_eq!(loaded.access_token, "tok1");
}

#[tokio::test]
async fn test_values_are_encrypted_at_rest() {
    let test_db = TestDatabase::new();
    test_db
        .credential_store()
        .save(&fixtures::session("plain-token-value"))
        .await
        .unwrap();

    let db = test_db.open();
    let db = db.lock().await;
    let stored: Vec<String> = {
        let mut stmt = db
            .connection()
            .prepare("SELECT value FROM credential_entries")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.map(Result::unwrap).collect()
    };

    assert_eq!(stored.len(), 3);
    for value in stored {
        assert!(!value.contains("plain-token-value"));
        assert!(!value.contains("dj-member"));
    }
}

#[tokio::test]
async fn test_wrong_key_degrades_to_not_connected() {
    let test_db = TestDatabase::new();
    test_db
        .credential_store()
        .save(&fixtures::session("tok1"))
        .await
        .unwrap();

    let other_key = generate_master_key().unwrap();
    let other = Arc::new(FieldEncryptor::new(&other_key).unwrap());
    let store = test_db.credential_store_with(other);

    assert!(store.load().await.is_none());
    // Unreadable record was cleared, so the right key finds nothing either
    assert!(test_db.credential_store().load().await.is_none());
}

#[tokio::test]
async fn test_reconnect_without_refresh_token_drops_old_one() {
    let test_db = TestDatabase::new();
    let store = test_db.credential_store();
    store.save(&fixtures::session("tok1")).await.unwrap();

    let replacement = AuthSession::new("tok2", None, fixtures::profile());
    store.save(&replacement).await.unwrap();

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded.access_token, "tok2");
    assert_eq!(loaded.refresh_token, None);
}

#[tokio::test]
async fn test_clear_removes_all_fields() {
    let test_db = TestDatabase::new();
    let store = test_db.credential_store();
    store.save(&fixtures::session("tok1")).await.unwrap();

    store.clear().await.unwrap();
    assert!(store.load().await.is_none());

    let db = test_db.open();
    let db = db.lock().await;
    let count: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM credential_entries", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_refuses_session_without_profile_identity() {
    let test_db = TestDatabase::new();
    let store = test_db.credential_store();
    let mut session = fixtures::session("tok1");
    session.user.username.clear();

    assert!(store.save(&session).await.is_err());
    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn test_verifier_is_session_scoped_and_single_use() {
    let test_db = TestDatabase::new();
    let store = test_db.credential_store();
    let verifier = CodeVerifier::from_stored("verifier-0123456789-abcdefghijklmnopqrstuvw".into());

    store.save_verifier(1, &verifier);
    assert!(store.has_verifier());

    // Never written to the durable store
    let db = test_db.open();
    {
        let db = db.lock().await;
        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM credential_entries WHERE key = ?1",
                [keys::PKCE_VERIFIER],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    assert_eq!(store.take_verifier(1).unwrap(), verifier);
    assert!(store.take_verifier(1).is_none());
    assert!(!store.has_verifier());
}

#[tokio::test]
async fn test_verifier_belongs_to_its_attempt() {
    let store = TestDatabase::new().credential_store();
    let first = CodeVerifier::from_stored("first-verifier-0123456789-abcdefghijklmnopq".into());
    let second = CodeVerifier::from_stored("second-verifier-0123456789-abcdefghijklmnop".into());

    store.save_verifier(1, &first);
    store.save_verifier(2, &second);

    // The earlier attempt can neither read nor clear its successor's verifier
    store.release_verifier(1);
    assert!(store.has_verifier());
    assert!(store.take_verifier(1).is_none());
    assert!(store.has_verifier());

    assert!(store.hand_over_verifier(2, 3));
    assert!(store.take_verifier(2).is_none());
    assert_eq!(store.take_verifier(3).unwrap(), second);
    assert!(!store.has_verifier());
}
