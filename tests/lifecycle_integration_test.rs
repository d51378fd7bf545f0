// ==========================================
// 批次生命周期集成测试
// ==========================================
// 职责: 验证审批/驳回的原子性、幂等性、余额正确性与并发串行化
// ==========================================


#[cfg(test)]
mod lifecycle_integration_test {
    use chrono::Utc;
    use coop_backoffice::api::{ApiError, BatchApi};
    use coop_backoffice::db::{self, SharedConnection};
    use coop_backoffice::domain::batch::NewBatch;
    use coop_backoffice::domain::ledger::LOAN_STATUS_ACTIVE;
    use coop_backoffice::domain::types::{BatchStatus, DomainKind, Polarity};
    use coop_backoffice::repository::{
        ActionLogRepository, BatchRepository, LedgerRepository, ACTION_APPROVE, ACTION_INGEST,
        ACTION_REJECT,
    };
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    use crate::test_helpers::*;

    struct Env {
        _tmp: tempfile::NamedTempFile,
        db_path: String,
        conn: SharedConnection,
        api: BatchApi,
        ledger: LedgerRepository,
        savings_id: i64,
    }

    fn setup() -> Env {
        coop_backoffice::logging::init_test();
        let (tmp, db_path) = create_test_db().unwrap();
        let conn = open_conn(&db_path);
        let categories = seed_default_categories(&conn);
        let savings_id = categories
            .iter()
            .find(|(name, _)| name == "Savings")
            .map(|(_, id)| *id)
            .unwrap();
        Env {
            _tmp: tmp,
            db_path,
            conn: conn.clone(),
            api: BatchApi::new(conn.clone()),
            ledger: LedgerRepository::new(conn),
            savings_id,
        }
    }

    async fn ingest_contributions(api: &BatchApi, rows: &[&[&str]]) -> String {
        let bytes = build_csv(CONTRIBUTION_HEADERS, rows);
        api.ingest_batch(DomainKind::Contribution, "contrib.csv", bytes, "clerk01")
            .await
            .unwrap()
            .batch_id
    }

    fn member_cells(member_no: &'static str) -> Vec<Cell> {
        vec![
            Cell::Text(member_no),
            Cell::Text("Jane"),
            Cell::Text("Wanjiru"),
            Cell::Text("12345678"),
            Cell::Text("0712345678"),
            Cell::Number(SERIAL_2025_01_20),
            Cell::Blank,
            Cell::Blank,
        ]
    }

    // ==========================================
    // 余额正确性
    // ==========================================

    #[tokio::test]
    async fn test_balance_accumulates_on_existing_balance() {
        let env = setup();
        {
            // 期初余额
            let guard = env.conn.lock().unwrap();
            LedgerRepository::apply_balance_delta_tx(
                &guard,
                "M001",
                env.savings_id,
                dec!(200),
                Utc::now(),
            )
            .unwrap();
        }

        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "100", "2025-01-20", "Cash", ""],
                &["M001", "Savings", "50", "2025-01-21", "Cash", ""],
            ],
        )
        .await;

        let resp = env.api.approve_batch(&batch_id, "manager01").await.unwrap();
        assert_eq!(resp.processed_count, 2);
        assert_eq!(resp.status, BatchStatus::Processed);
        assert_eq!(
            env.ledger.get_balance("M001", env.savings_id).unwrap(),
            Some(dec!(350))
        );

        // 入账顺序无关
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M002", "Savings", "50", "2025-01-21", "Cash", ""],
                &["M002", "Savings", "100", "2025-01-20", "Cash", ""],
            ],
        )
        .await;
        env.api.approve_batch(&batch_id, "manager01").await.unwrap();
        assert_eq!(
            env.ledger.get_balance("M002", env.savings_id).unwrap(),
            Some(dec!(150))
        );

        let entries = env.ledger.list_entries_by_batch(&batch_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.posted_by == "manager01"));
        assert!(entries.iter().all(|e| e.effect == Polarity::Credit));
    }

    #[tokio::test]
    async fn test_cent_amounts_sum_exactly_in_any_order() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "0.1", "2025-01-20", "Cash", ""],
                &["M001", "Savings", "0.2", "2025-01-20", "Cash", ""],
                &["M001", "Savings", "0.3", "2025-01-20", "Cash", ""],
                &["M002", "Savings", "0.3", "2025-01-20", "Cash", ""],
                &["M002", "Savings", "0.2", "2025-01-20", "Cash", ""],
                &["M002", "Savings", "0.1", "2025-01-20", "Cash", ""],
            ],
        )
        .await;
        env.api.approve_batch(&batch_id, "manager01").await.unwrap();

        let forward = env.ledger.get_balance("M001", env.savings_id).unwrap();
        let backward = env.ledger.get_balance("M002", env.savings_id).unwrap();
        assert_eq!(forward, Some(dec!(0.6)));
        assert_eq!(forward, backward);

        let entries = env.ledger.list_entries_by_batch(&batch_id).unwrap();
        let total: rust_decimal::Decimal = entries.iter().map(|e| e.signed_amount()).sum();
        assert_eq!(total, dec!(1.2));
    }

    #[tokio::test]
    async fn test_sub_cent_amount_never_reaches_ledger() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "10.25", "2025-01-20", "Cash", ""],
                &["M001", "Savings", "0.005", "2025-01-20", "Cash", ""],
            ],
        )
        .await;
        assert_eq!(
            env.api.get_batch(&batch_id).unwrap().status,
            BatchStatus::PendingValidation
        );

        let resp = env.api.approve_batch(&batch_id, "manager01").await.unwrap();
        assert_eq!(resp.processed_count, 1);
        assert_eq!(resp.discarded_count, 1);
        assert_eq!(
            env.ledger.get_balance("M001", env.savings_id).unwrap(),
            Some(dec!(10.25))
        );
    }

    // ==========================================
    // 幂等性
    // ==========================================

    #[tokio::test]
    async fn test_second_approval_fails_and_never_reposts() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "100", "2025-01-20", "Cash", ""],
                &["M002", "Savings", "abc", "2025-01-20", "Cash", ""],
            ],
        )
        .await;

        let first = env.api.approve_batch(&batch_id, "manager01").await.unwrap();
        assert_eq!(first.processed_count, 1);
        assert_eq!(first.discarded_count, 1);
        assert!(env.api.list_batch_rows(&batch_id).unwrap().is_empty());

        let err = env
            .api
            .approve_batch(&batch_id, "manager01")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
        assert!(err.to_string().contains("PROCESSED"));
        assert_eq!(env.ledger.count_entries().unwrap(), 1);
        assert_eq!(
            env.ledger.get_balance("M001", env.savings_id).unwrap(),
            Some(dec!(100))
        );

        let err = env
            .api
            .reject_batch(&batch_id, "manager01", "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_approve_rejected_batch_leaves_ledger_unchanged() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[&["M001", "Savings", "100", "2025-01-20", "Cash", ""]],
        )
        .await;
        env.api
            .reject_batch(&batch_id, "manager01", "duplicate upload")
            .await
            .unwrap();

        let err = env
            .api
            .approve_batch(&batch_id, "manager02")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(err.to_string().contains("REJECTED"));
        assert_eq!(env.ledger.count_entries().unwrap(), 0);
        assert_eq!(env.ledger.get_balance("M001", env.savings_id).unwrap(), None);
    }

    // ==========================================
    // 驳回
    // ==========================================

    #[tokio::test]
    async fn test_reject_validated_batch_for_duplicate_upload() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "100", "2025-01-20", "Cash", ""],
                &["M002", "Shares", "40", "2025-01-20", "Mobile", ""],
            ],
        )
        .await;
        assert_eq!(
            env.api.get_batch(&batch_id).unwrap().status,
            BatchStatus::Validated
        );

        let resp = env
            .api
            .reject_batch(&batch_id, "manager01", "duplicate upload")
            .await
            .unwrap();
        assert_eq!(resp.deleted_count, 2);
        assert_eq!(resp.status, BatchStatus::Rejected);

        let batch = env.api.get_batch(&batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Rejected);
        assert_eq!(batch.rejection_reason.as_deref(), Some("duplicate upload"));
        assert_eq!(batch.approved_by.as_deref(), Some("manager01"));
        assert!(batch.decided_at.is_some());
        assert!(env.api.list_batch_rows(&batch_id).unwrap().is_empty());
        assert_eq!(env.ledger.count_entries().unwrap(), 0);

        let actions: Vec<String> = ActionLogRepository::new(open_conn(&env.db_path))
            .list_by_batch(&batch_id)
            .unwrap()
            .into_iter()
            .map(|log| log.action_type)
            .collect();
        assert_eq!(actions, vec![ACTION_INGEST, ACTION_REJECT]);
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_identity() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[&["M001", "Savings", "100", "2025-01-20", "Cash", ""]],
        )
        .await;

        let err = env.api.reject_batch(&batch_id, "manager01", "  ").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        let err = env.api.approve_batch(&batch_id, "").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        assert_eq!(
            env.api.get_batch(&batch_id).unwrap().status,
            BatchStatus::Validated
        );
    }

    // ==========================================
    // 科目缺失：整批回滚
    // ==========================================

    #[tokio::test]
    async fn test_unresolved_category_rolls_back_whole_batch() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "100", "2025-01-20", "Cash", ""],
                &["M001", "Welfare", "30", "2025-01-20", "Cash", ""],
                &["M002", "Burial Fund", "10", "2025-01-20", "Cash", ""],
            ],
        )
        .await;

        let err = env
            .api
            .approve_batch(&batch_id, "manager01")
            .await
            .unwrap_err();
        match err {
            ApiError::UnresolvedCategory { names } => {
                assert_eq!(names, vec!["Burial Fund".to_string(), "Welfare".to_string()])
            }
            other => panic!("Expected UnresolvedCategory, got {:?}", other),
        }

        assert_eq!(
            env.api.get_batch(&batch_id).unwrap().status,
            BatchStatus::Validated
        );
        assert_eq!(env.api.list_batch_rows(&batch_id).unwrap().len(), 3);
        assert_eq!(env.ledger.count_entries().unwrap(), 0);
        assert_eq!(env.ledger.get_balance("M001", env.savings_id).unwrap(), None);

        // 补齐科目后可以重新审批
        env.ledger.ensure_category("Welfare", Polarity::Credit).unwrap();
        env.ledger.ensure_category("Burial Fund", Polarity::Credit).unwrap();
        let resp = env.api.approve_batch(&batch_id, "manager01").await.unwrap();
        assert_eq!(resp.processed_count, 3);
    }

    // ==========================================
    // 贷款 / 会员入账
    // ==========================================

    #[tokio::test]
    async fn test_loan_approval_creates_active_loan_and_debit() {
        let env = setup();
        let bytes = build_xlsx(
            LOAN_HEADERS,
            &[vec![
                Cell::Text("M001"),
                Cell::Text("Personal Loan"),
                Cell::Number(5000.0),
                Cell::Number(12.0),
                Cell::Number(11.5),
                Cell::Number(SERIAL_2025_01_20),
                Cell::Text("School fees"),
            ]],
        );
        let batch_id = env
            .api
            .ingest_batch(DomainKind::Loan, "loans.xlsx", bytes, "clerk01")
            .await
            .unwrap()
            .batch_id;

        env.api.approve_batch(&batch_id, "manager01").await.unwrap();

        let loans = env.ledger.list_loans_by_batch(&batch_id).unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].status, LOAN_STATUS_ACTIVE);
        assert_eq!(loans[0].principal, dec!(5000));
        assert_eq!(loans[0].term_months, 12);
        assert_eq!(loans[0].approved_by, "manager01");

        let loan_category = env
            .ledger
            .find_category_by_name("Personal Loan")
            .unwrap()
            .unwrap();
        assert_eq!(
            env.ledger
                .get_balance("M001", loan_category.category_id)
                .unwrap(),
            Some(dec!(-5000))
        );
    }

    #[tokio::test]
    async fn test_member_approval_registers_and_blocks_reupload() {
        let env = setup();
        let member_row = || member_cells("M100");

        let first = env
            .api
            .ingest_batch(
                DomainKind::Member,
                "members.xlsx",
                build_xlsx(MEMBER_HEADERS, &[member_row()]),
                "clerk01",
            )
            .await
            .unwrap();
        env.api.approve_batch(&first.batch_id, "manager01").await.unwrap();

        let member = env.ledger.find_member("M100").unwrap().unwrap();
        assert_eq!(member.first_name, "Jane");
        assert_eq!(member.source_batch_id, first.batch_id);
        assert_eq!(env.ledger.count_entries().unwrap(), 0);

        let second = env
            .api
            .ingest_batch(
                DomainKind::Member,
                "members-again.xlsx",
                build_xlsx(MEMBER_HEADERS, &[member_row()]),
                "clerk01",
            )
            .await
            .unwrap();
        assert_eq!(second.invalid_count, 1);
        assert_eq!(second.status, BatchStatus::PendingValidation);
        let rows = env.api.list_batch_rows(&second.batch_id).unwrap();
        assert!(rows[0].errors.iter().any(|e| e.contains("M100")));
    }

    #[tokio::test]
    async fn test_competing_member_batches_register_once() {
        let env = setup();

        // 两个批次在任一审批前上传，导入时都有效
        let first = env
            .api
            .ingest_batch(
                DomainKind::Member,
                "a.xlsx",
                build_xlsx(MEMBER_HEADERS, &[member_cells("M100")]),
                "clerk01",
            )
            .await
            .unwrap();
        let second = env
            .api
            .ingest_batch(
                DomainKind::Member,
                "b.xlsx",
                build_xlsx(MEMBER_HEADERS, &[member_cells("M101"), member_cells("M100")]),
                "clerk01",
            )
            .await
            .unwrap();
        assert_eq!(second.status, BatchStatus::Validated);

        env.api.approve_batch(&first.batch_id, "manager01").await.unwrap();

        let err = env
            .api
            .approve_batch(&second.batch_id, "manager01")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BUSINESS_RULE_VIOLATION");
        assert!(err.to_string().contains("M100"));
        assert!(!err.to_string().contains("M101"));

        // 整批回滚：M101 未登记，暂存行保留
        assert!(env.ledger.find_member("M101").unwrap().is_none());
        assert_eq!(
            env.api.get_batch(&second.batch_id).unwrap().status,
            BatchStatus::Validated
        );
        assert_eq!(env.api.list_batch_rows(&second.batch_id).unwrap().len(), 2);

        env.api
            .reject_batch(&second.batch_id, "manager01", "member already registered")
            .await
            .unwrap();
    }

    // ==========================================
    // 状态检查
    // ==========================================

    #[tokio::test]
    async fn test_pending_batch_is_not_approvable() {
        let env = setup();
        let batch_id = "pending-batch".to_string();
        BatchRepository::new(env.conn.clone())
            .create_batch(&NewBatch {
                batch_id: batch_id.clone(),
                file_name: "contrib.csv".to_string(),
                domain_kind: DomainKind::Contribution,
                total_rows: 1,
                uploaded_by: "clerk01".to_string(),
                uploaded_at: Utc::now(),
            })
            .unwrap();

        let err = env
            .api
            .approve_batch(&batch_id, "manager01")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(err.to_string().contains("PENDING"));
        assert_eq!(env.api.get_batch(&batch_id).unwrap().status, BatchStatus::Pending);
        assert_eq!(env.ledger.count_entries().unwrap(), 0);
    }

    // ==========================================
    // 存储繁忙：可重试且无副作用
    // ==========================================

    #[tokio::test]
    async fn test_lock_timeout_is_retryable() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[&["M001", "Savings", "100", "2025-01-20", "Cash", ""]],
        )
        .await;

        // 另一个连接持有写锁
        let holder = db::open_sqlite_connection(&env.db_path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let impatient = db::open_sqlite_connection(&env.db_path).unwrap();
        db::configure_sqlite_connection_with_timeout(&impatient, 50).unwrap();
        let api = BatchApi::new(Arc::new(Mutex::new(impatient)));

        let err = api.approve_batch(&batch_id, "manager01").await.unwrap_err();
        assert!(err.is_retryable(), "{:?}", err);
        assert_eq!(err.code(), "TRANSIENT");

        let err = api
            .reject_batch(&batch_id, "manager01", "duplicate upload")
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{:?}", err);

        holder.execute_batch("ROLLBACK").unwrap();

        assert_eq!(
            env.api.get_batch(&batch_id).unwrap().status,
            BatchStatus::Validated
        );
        assert_eq!(env.ledger.count_entries().unwrap(), 0);

        // 锁释放后原样重试成功
        let resp = api.approve_batch(&batch_id, "manager01").await.unwrap();
        assert_eq!(resp.processed_count, 1);
    }

    // ==========================================
    // 并发审批：恰好一次入账
    // ==========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_post_exactly_once() {
        let env = setup();
        let batch_id = ingest_contributions(
            &env.api,
            &[
                &["M001", "Savings", "100", "2025-01-20", "Cash", ""],
                &["M001", "Savings", "50", "2025-01-21", "Cash", ""],
            ],
        )
        .await;

        // 两个独立连接，模拟两个审批人
        let api_a = Arc::new(BatchApi::new(open_conn(&env.db_path)));
        let api_b = Arc::new(BatchApi::new(open_conn(&env.db_path)));

        let task_a = {
            let api = api_a.clone();
            let batch_id = batch_id.clone();
            tokio::spawn(async move { api.approve_batch(&batch_id, "manager01").await })
        };
        let task_b = {
            let api = api_b.clone();
            let batch_id = batch_id.clone();
            tokio::spawn(async move { api.approve_batch(&batch_id, "manager02").await })
        };

        let result_a = task_a.await.unwrap();
        let result_b = task_b.await.unwrap();

        let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let failure = if result_a.is_err() { result_a } else { result_b };
        assert!(matches!(failure, Err(ApiError::InvalidState(_))));

        assert_eq!(env.ledger.count_entries().unwrap(), 2);
        assert_eq!(
            env.ledger.get_balance("M001", env.savings_id).unwrap(),
            Some(dec!(150))
        );

        let approvals = ActionLogRepository::new(open_conn(&env.db_path))
            .list_by_batch(&batch_id)
            .unwrap()
            .into_iter()
            .filter(|log| log.action_type == ACTION_APPROVE)
            .count();
        assert_eq!(approvals, 1);
    }
}
