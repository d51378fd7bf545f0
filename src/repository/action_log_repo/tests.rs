use super::{ActionLogRepository, ACTION_APPROVE, ACTION_INGEST};
use crate::domain::ledger::ActionLog;
use chrono::{Duration, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::ensure_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn make_test_log(action_id: &str, batch_id: &str, action_type: &str) -> ActionLog {
    ActionLog {
        action_id: action_id.to_string(),
        batch_id: batch_id.to_string(),
        action_type: action_type.to_string(),
        actor: "clerk01".to_string(),
        action_ts: Utc::now(),
        detail_json: Some(r#"{"total_rows":3}"#.to_string()),
    }
}

#[test]
fn test_insert_and_find_by_id() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn.clone());
    let log = make_test_log("A1", "B1", ACTION_INGEST);

    ActionLogRepository::insert_tx(&conn.lock().unwrap(), &log).unwrap();

    let found = repo.find_by_id("A1").unwrap().unwrap();
    assert_eq!(found.batch_id, "B1");
    assert_eq!(found.action_type, ACTION_INGEST);
    assert_eq!(found.detail_json.as_deref(), Some(r#"{"total_rows":3}"#));
    assert!(repo.find_by_id("missing").unwrap().is_none());
}

#[test]
fn test_list_by_batch_in_time_order() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn.clone());

    let mut ingest = make_test_log("A1", "B1", ACTION_INGEST);
    ingest.action_ts = Utc::now() - Duration::minutes(5);
    let approve = make_test_log("A2", "B1", ACTION_APPROVE);
    let other = make_test_log("A3", "B2", ACTION_INGEST);

    {
        let guard = conn.lock().unwrap();
        ActionLogRepository::insert_tx(&guard, &approve).unwrap();
        ActionLogRepository::insert_tx(&guard, &ingest).unwrap();
        ActionLogRepository::insert_tx(&guard, &other).unwrap();
    }

    let logs = repo.list_by_batch("B1").unwrap();
    let types: Vec<&str> = logs.iter().map(|l| l.action_type.as_str()).collect();
    assert_eq!(types, vec![ACTION_INGEST, ACTION_APPROVE]);

    let recent = repo.find_recent(1).unwrap();
    assert_eq!(recent.len(), 1);
}

#[test]
fn test_insert_tx_rolls_back_with_transaction() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn.clone());

    {
        let mut guard = conn.lock().unwrap();
        let tx = guard.transaction().unwrap();
        ActionLogRepository::insert_tx(&tx, &make_test_log("A1", "B1", ACTION_INGEST)).unwrap();
        // 未提交即丢弃
    }

    assert!(repo.list_by_batch("B1").unwrap().is_empty());
}
