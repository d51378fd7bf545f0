// ==========================================
// 导入器集成测试
// ==========================================
// 职责: 以 Mock 配置驱动 BatchImporter，验证配置对行校验的影响
// ==========================================

mod helpers;

use coop_backoffice::domain::types::{BatchStatus, DomainKind, RowStatus};
use coop_backoffice::importer::{BatchImporter, BatchIngestor, ImportError, Upload};
use coop_backoffice::repository::BatchRepository;
use helpers::mock_config::MockConfig;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use test_helpers::*;

fn upload(file_name: &str, rows: &[&[&str]]) -> Upload {
    Upload {
        kind: DomainKind::Transaction,
        file_name: file_name.to_string(),
        bytes: build_csv(TRANSACTION_HEADERS, rows),
        uploaded_by: "clerk01".to_string(),
    }
}

const TRANSACTION_HEADERS: &[&str] = &[
    "member_no",
    "transaction_type",
    "amount",
    "transaction_date",
    "payment_method",
    "reference",
    "description",
];

#[tokio::test]
async fn test_amount_ceiling_from_config() {
    coop_backoffice::logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_conn(&db_path);
    let importer = BatchImporter::new(conn.clone(), MockConfig::with_max_amount(dec!(1000)));

    let outcome = importer
        .ingest(upload(
            "tx.csv",
            &[
                &["M001", "Savings", "999.99", "2025-01-20", "Cash", "T1", "ok"],
                &["M001", "Savings", "5000", "2025-01-20", "Cash", "T2", "too large"],
            ],
        ))
        .await
        .unwrap();
    assert_eq!(outcome.valid_rows, 1);
    assert_eq!(outcome.invalid_rows, 1);
    assert_eq!(outcome.status, BatchStatus::PendingValidation);

    let rows = BatchRepository::new(conn).list_rows(&outcome.batch_id).unwrap();
    let invalid = rows.iter().find(|r| r.status == RowStatus::Invalid).unwrap();
    assert_eq!(invalid.row_number, 3);
    assert!(invalid.errors.iter().all(|e| e.starts_with("amount:")));
}

#[tokio::test]
async fn test_future_dates_follow_config() {
    coop_backoffice::logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let rows: &[&[&str]] = &[&["M001", "Savings", "10", "2099-01-01", "", "", ""]];

    let strict = BatchImporter::new(open_conn(&db_path), MockConfig::default());
    let outcome = strict.ingest(upload("a.csv", rows)).await.unwrap();
    assert_eq!(outcome.invalid_rows, 1);

    let lenient = BatchImporter::new(open_conn(&db_path), MockConfig::allowing_future_dates());
    let outcome = lenient.ingest(upload("b.csv", rows)).await.unwrap();
    assert_eq!(outcome.invalid_rows, 0);
    assert_eq!(outcome.status, BatchStatus::Validated);
}

#[tokio::test]
async fn test_config_failure_persists_nothing() {
    coop_backoffice::logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_conn(&db_path);
    let importer = BatchImporter::new(conn.clone(), MockConfig::broken());

    let err = importer
        .ingest(upload(
            "tx.csv",
            &[&["M001", "Savings", "10", "2025-01-20", "", "", ""]],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::ConfigReadError(_)));
    assert!(BatchRepository::new(conn)
        .list_batches(DomainKind::Transaction, None)
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ingest_many_creates_independent_batches() {
    coop_backoffice::logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = BatchImporter::new(open_conn(&db_path), MockConfig::default());

    let uploads: Vec<Upload> = (0..5)
        .map(|i| {
            upload(
                &format!("tx-{}.csv", i),
                &[&["M001", "Savings", "10", "2025-01-20", "Cash", "", ""]],
            )
        })
        .collect();

    let results = importer.ingest_many(uploads).await;
    assert_eq!(results.len(), 5);
    let batch_ids: HashSet<String> = results
        .into_iter()
        .map(|r| r.unwrap().batch_id)
        .collect();
    assert_eq!(batch_ids.len(), 5);
}
