//! Session persistence across store and dispatcher restarts.

mod common;

use common::{assistant_config, BackendCall, ScriptedBackend};

use chatrelay::storage::SqliteSessionBackend;
use chatrelay::transport::InboundMessage;
use chatrelay::{
    ContextGranularity, ConversationKey, Dispatcher, OutboundResult, SessionMode, SessionStore,
};
use std::sync::Arc;

#[test]
fn test_store_round_trip_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let key = ConversationKey::derive("!r1", "@alice:example.org", None, ContextGranularity::Room);

    {
        let backend = Arc::new(SqliteSessionBackend::new_with_path(&db_path).unwrap());
        let store = SessionStore::new(backend);
        store.get_or_create(&key, SessionMode::Assistant).unwrap();
        store.attach_thread_id(&key, "thread_persisted").unwrap();
    }

    let backend = Arc::new(SqliteSessionBackend::new_with_path(&db_path).unwrap());
    let store = SessionStore::new(backend);
    let session = store.get_or_create(&key, SessionMode::Assistant).unwrap();

    assert_eq!(session.backend_thread_id.as_deref(), Some("thread_persisted"));
    assert_eq!(session.mode, SessionMode::Assistant);
}

#[tokio::test]
async fn test_dispatcher_reuses_persisted_thread_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let config = assistant_config();
    let event = InboundMessage::text("!r1", "@alice:example.org", "hello");

    let backend = ScriptedBackend::assistant_replying("noted");
    {
        let store = SessionStore::new(Arc::new(
            SqliteSessionBackend::new_with_path(&db_path).unwrap(),
        ));
        let dispatcher = Dispatcher::new(backend.clone(), store, &config).unwrap();
        let result = dispatcher.handle(&event).await;
        assert_eq!(result, OutboundResult::Text("noted".to_string()));
    }
    assert_eq!(backend.threads_created(), 1);

    // A fresh dispatcher over the same database resumes the same thread
    // instead of creating a second one.
    let store = SessionStore::new(Arc::new(
        SqliteSessionBackend::new_with_path(&db_path).unwrap(),
    ));
    let dispatcher = Dispatcher::new(backend.clone(), store, &config).unwrap();
    let result = dispatcher.handle(&event).await;
    assert_eq!(result, OutboundResult::Text("noted".to_string()));

    assert_eq!(backend.threads_created(), 1);

    let appends: Vec<_> = backend
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::Append { thread_id, .. } => Some(thread_id),
            _ => None,
        })
        .collect();
    assert_eq!(appends, vec!["thread_0".to_string(), "thread_0".to_string()]);
}

#[test]
fn test_stateless_session_persists_without_thread() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let key = ConversationKey::derive("!r1", "@alice:example.org", None, ContextGranularity::Room);

    {
        let store = SessionStore::new(Arc::new(
            SqliteSessionBackend::new_with_path(&db_path).unwrap(),
        ));
        store.get_or_create(&key, SessionMode::Stateless).unwrap();
    }

    let store = SessionStore::new(Arc::new(
        SqliteSessionBackend::new_with_path(&db_path).unwrap(),
    ));
    let session = store.get_or_create(&key, SessionMode::Stateless).unwrap();
    assert!(session.backend_thread_id.is_none());
    assert_eq!(session.mode, SessionMode::Stateless);
}
