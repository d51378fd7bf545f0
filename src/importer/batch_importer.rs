// ==========================================
// 合作社后台 - 批次导入器实现
// ==========================================
// 职责: 整合导入流程，从上传文件到暂存区
// 流程: 解析 → 行校验 → 批次级查重 → 建批次 + 暂存 + 定状态（单事务）
// 红线: 结构错误在任何持久化之前拒绝；行级错误只记录，不中断批次
// ==========================================

use crate::config::IngestConfigReader;
use crate::domain::batch::{NewBatch, ValidatedRow};
use crate::domain::ledger::ActionLog;
use crate::domain::types::{DomainKind, RowStatus};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::{BatchIngestor, IngestOutcome, Upload};
use crate::importer::row_validator::{validator_for, ValidationRules};
use crate::importer::schema::{columns, schema_for};
use crate::repository::{ActionLogRepository, BatchRepository, LedgerRepository, ACTION_INGEST};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 解析 + 校验（纯计算，无 I/O）
// ==========================================

/// 解析上传文件并逐行校验
///
/// # 错误
/// - 结构错误（扩展名/缺列/无工作表）、空文件、行数超限
pub fn parse_and_validate(
    kind: DomainKind,
    file_name: &str,
    bytes: &[u8],
    max_rows: usize,
    rules: &ValidationRules,
) -> ImportResult<Vec<ValidatedRow>> {
    let sheet = UniversalFileParser.parse(file_name, bytes, schema_for(kind))?;
    if sheet.len() > max_rows {
        return Err(ImportError::TooManyRows {
            rows: sheet.len(),
            max: max_rows,
        });
    }

    let validator = validator_for(kind);
    let mut rows: Vec<ValidatedRow> = sheet
        .rows()
        .map(|raw| validator.validate(&raw, rules))
        .collect();

    mark_batch_duplicates(kind, &mut rows);
    Ok(rows)
}

/// 批内查重：会员编号（会员登记）/ 参考号（缴存、交易）重复时，后出现的行标记为无效
pub fn mark_batch_duplicates(kind: DomainKind, rows: &mut [ValidatedRow]) {
    let column = match kind {
        DomainKind::Member => columns::MEMBER_NO,
        DomainKind::Contribution | DomainKind::Transaction => columns::REFERENCE,
        DomainKind::Loan => return,
    };

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for row in rows.iter_mut() {
        let key = match kind {
            DomainKind::Member => row.record.account_ref(),
            _ => row.record.reference(),
        };
        let Some(key) = key.map(str::to_string) else {
            continue;
        };
        match first_seen.get(&key) {
            Some(first_row) => row.push_error(format!(
                "{}: '{}' 与第 {} 行重复",
                column, key, first_row
            )),
            None => {
                first_seen.insert(key, row.row_number);
            }
        }
    }
}

fn count_rows(rows: &[ValidatedRow]) -> (usize, usize) {
    let valid = rows.iter().filter(|r| r.status == RowStatus::Valid).count();
    (valid, rows.len() - valid)
}

// ==========================================
// BatchImporter - 批次导入器
// ==========================================
pub struct BatchImporter<C>
where
    C: IngestConfigReader,
{
    // 存储句柄（由组合根注入）
    conn: Arc<Mutex<Connection>>,

    // 配置读取器
    config: C,
}

impl<C> BatchImporter<C>
where
    C: IngestConfigReader,
{
    pub fn new(conn: Arc<Mutex<Connection>>, config: C) -> Self {
        Self { conn, config }
    }

    /// 暂存：查重已登记会员 → 建批次 → 写暂存行 → 定状态 → 记日志（单事务）
    fn stage(
        &self,
        meta: &NewBatch,
        mut rows: Vec<ValidatedRow>,
    ) -> ImportResult<IngestOutcome> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| crate::repository::RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if meta.domain_kind == DomainKind::Member {
            let member_nos: Vec<String> = rows
                .iter()
                .filter_map(|r| r.record.account_ref().map(str::to_string))
                .collect();
            let existing = LedgerRepository::existing_member_numbers_tx(&tx, &member_nos)?;
            for row in rows.iter_mut() {
                let clash = row
                    .record
                    .account_ref()
                    .filter(|no| existing.contains(*no))
                    .map(str::to_string);
                if let Some(member_no) = clash {
                    row.push_error(format!(
                        "{}: 会员编号 '{}' 已登记",
                        columns::MEMBER_NO,
                        member_no
                    ));
                }
            }
        }

        let (valid_rows, invalid_rows) = count_rows(&rows);

        let batch_id = BatchRepository::create_batch_tx(&tx, meta)?;
        let staged = BatchRepository::stage_rows_tx(&tx, &batch_id, meta.domain_kind, &rows)?;
        let status =
            BatchRepository::finalize_staging_tx(&tx, &batch_id, valid_rows, invalid_rows)?;

        ActionLogRepository::insert_tx(
            &tx,
            &ActionLog {
                action_id: Uuid::new_v4().to_string(),
                batch_id: batch_id.clone(),
                action_type: ACTION_INGEST.to_string(),
                actor: meta.uploaded_by.clone(),
                action_ts: Utc::now(),
                detail_json: Some(
                    json!({
                        "file_name": meta.file_name,
                        "domain_kind": meta.domain_kind.as_str(),
                        "total_rows": staged,
                        "valid_rows": valid_rows,
                        "invalid_rows": invalid_rows,
                        "status": status.as_str(),
                    })
                    .to_string(),
                ),
            },
        )?;

        tx.commit()?;

        for row in rows.iter().filter(|r| r.status == RowStatus::Invalid) {
            warn!(
                batch_id = %batch_id,
                row_number = row.row_number,
                errors = ?row.errors,
                "行校验未通过"
            );
        }

        Ok(IngestOutcome {
            batch_id,
            domain_kind: meta.domain_kind,
            total_rows: staged,
            valid_rows,
            invalid_rows,
            status,
        })
    }
}

#[async_trait]
impl<C> BatchIngestor for BatchImporter<C>
where
    C: IngestConfigReader + Send + Sync,
{
    #[instrument(skip(self, upload), fields(kind = %upload.kind, file_name = %upload.file_name, batch_id))]
    async fn ingest(&self, upload: Upload) -> ImportResult<IngestOutcome> {
        let Upload {
            kind,
            file_name,
            bytes,
            uploaded_by,
        } = upload;

        let uploaded_by = uploaded_by.trim().to_string();
        if uploaded_by.is_empty() {
            return Err(ImportError::InvalidInput("上传人不能为空".to_string()));
        }

        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        info!(batch_id = %batch_id, uploaded_by = %uploaded_by, size = bytes.len(), "开始导入上传文件");

        // === 步骤 1: 读取配置 ===
        debug!("步骤 1: 读取导入配置");
        let max_rows = self
            .config
            .get_max_rows()
            .await
            .map_err(|e| ImportError::ConfigReadError(e.to_string()))?;
        let rules = ValidationRules::from_config(&self.config, Utc::now().date_naive())
            .await
            .map_err(|e| ImportError::ConfigReadError(e.to_string()))?;

        // === 步骤 2: 解析 + 行校验（阻塞计算移出异步线程）===
        debug!("步骤 2: 解析并校验");
        let parse_name = file_name.clone();
        let rows = tokio::task::spawn_blocking(move || {
            parse_and_validate(kind, &parse_name, &bytes, max_rows, &rules)
        })
        .await
        .map_err(|e| ImportError::InternalError(format!("解析任务失败: {}", e)))?
        .map_err(|e| {
            warn!(error = %e, "上传文件被拒绝");
            e
        })?;

        // === 步骤 3: 暂存（单事务）===
        debug!(rows = rows.len(), "步骤 3: 暂存");
        let meta = NewBatch {
            batch_id,
            file_name,
            domain_kind: kind,
            total_rows: rows.len(),
            uploaded_by,
            uploaded_at: Utc::now(),
        };
        let outcome = self.stage(&meta, rows).map_err(|e| {
            error!(batch_id = %meta.batch_id, error = %e, "暂存失败，已回滚");
            e
        })?;

        info!(
            batch_id = %outcome.batch_id,
            total = outcome.total_rows,
            valid = outcome.valid_rows,
            invalid = outcome.invalid_rows,
            status = %outcome.status,
            "导入完成"
        );
        Ok(outcome)
    }

    async fn ingest_many(&self, uploads: Vec<Upload>) -> Vec<ImportResult<IngestOutcome>> {
        use futures::future::join_all;

        info!(count = uploads.len(), "开始批量导入文件");

        let tasks = uploads.into_iter().map(|upload| {
            let file_name = upload.file_name.clone();
            async move {
                let result = self.ingest(upload).await;
                if let Err(e) = &result {
                    error!(file = %file_name, error = %e, "文件导入失败");
                }
                result
            }
        });

        // 并发执行所有导入任务
        let results = join_all(tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::domain::ledger::Member;
    use crate::domain::types::BatchStatus;

    fn setup() -> (Arc<Mutex<Connection>>, BatchImporter<ConfigManager>) {
        crate::logging::init_test();
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let importer = BatchImporter::new(conn.clone(), ConfigManager::from_connection(conn.clone()));
        (conn, importer)
    }

    fn upload(kind: DomainKind, csv: &str) -> Upload {
        Upload {
            kind,
            file_name: "upload.csv".to_string(),
            bytes: csv.as_bytes().to_vec(),
            uploaded_by: "clerk01".to_string(),
        }
    }

    #[test]
    fn test_duplicate_references_mark_later_rows() {
        let csv = "member_no,contribution_type,amount,contribution_date,reference\n\
            M001,Savings,10,2025-01-02,R1\n\
            M002,Savings,10,2025-01-02,R2\n\
            M003,Savings,10,2025-01-02,R1\n";
        let rules = ValidationRules::new(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let rows = parse_and_validate(
            DomainKind::Contribution,
            "c.csv",
            csv.as_bytes(),
            100,
            &rules,
        )
        .unwrap();

        assert_eq!(rows[0].status, RowStatus::Valid);
        assert_eq!(rows[1].status, RowStatus::Valid);
        assert_eq!(rows[2].status, RowStatus::Invalid);
        assert!(rows[2].errors[0].contains("第 2 行"));
    }

    #[test]
    fn test_too_many_rows_rejected() {
        let csv = "member_no,transaction_type,amount,transaction_date\n\
            M001,Deposit,10,2025-01-02\n\
            M002,Deposit,10,2025-01-02\n";
        let err = parse_and_validate(
            DomainKind::Transaction,
            "t.csv",
            csv.as_bytes(),
            1,
            &ValidationRules::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::TooManyRows { rows: 2, max: 1 }));
        assert!(err.is_schema_error());
    }

    #[tokio::test]
    async fn test_ingest_stages_batch_and_logs_action() {
        let (conn, importer) = setup();
        let csv = "member_no,transaction_type,amount,transaction_date\n\
            M001,Deposit,100,2025-01-02\n\
            M002,Deposit,abc,2025-01-02\n";

        let outcome = importer
            .ingest(upload(DomainKind::Transaction, csv))
            .await
            .unwrap();
        assert_eq!(outcome.total_rows, 2);
        assert_eq!(outcome.valid_rows, 1);
        assert_eq!(outcome.invalid_rows, 1);
        assert_eq!(outcome.status, BatchStatus::PendingValidation);

        let batch_repo = BatchRepository::new(conn.clone());
        let batch = batch_repo.find_by_id(&outcome.batch_id).unwrap().unwrap();
        assert_eq!(batch.uploaded_by, "clerk01");
        assert_eq!(batch.valid_rows + batch.invalid_rows, batch.total_rows);
        assert_eq!(batch_repo.list_rows(&outcome.batch_id).unwrap().len(), 2);

        let logs = ActionLogRepository::new(conn).list_by_batch(&outcome.batch_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ACTION_INGEST);
    }

    #[tokio::test]
    async fn test_ingest_rejects_schema_error_before_persisting() {
        let (conn, importer) = setup();
        let err = importer
            .ingest(upload(DomainKind::Loan, "member_no,amount\nM001,5\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumns { .. }));

        let count: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM import_batch", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_ingest_requires_uploader() {
        let (_conn, importer) = setup();
        let mut request = upload(DomainKind::Transaction, "x");
        request.uploaded_by = "   ".to_string();
        let err = importer.ingest(request).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_existing_member_marked_invalid() {
        let (conn, importer) = setup();
        {
            let guard = conn.lock().unwrap();
            LedgerRepository::insert_member_tx(
                &guard,
                &Member {
                    member_no: "M001".to_string(),
                    first_name: "Jane".to_string(),
                    last_name: "Doe".to_string(),
                    id_number: "123".to_string(),
                    phone: "0712345678".to_string(),
                    email: None,
                    gender: None,
                    join_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    source_batch_id: "B0".to_string(),
                    source_row_id: 1,
                    created_at: Utc::now(),
                },
            )
            .unwrap();
        }

        let csv = "member_no,first_name,last_name,id_number,phone,join_date\n\
            M001,Jane,Doe,123,0712345678,2024-01-01\n\
            M002,John,Doe,456,0712345679,2024-01-01\n";
        let outcome = importer.ingest(upload(DomainKind::Member, csv)).await.unwrap();
        assert_eq!(outcome.invalid_rows, 1);
        assert_eq!(outcome.status, BatchStatus::PendingValidation);
    }

    #[tokio::test]
    async fn test_ingest_many_isolates_failures() {
        let (_conn, importer) = setup();
        let good = "member_no,transaction_type,amount,transaction_date\nM001,Deposit,5,2025-01-02\n";
        let results = importer
            .ingest_many(vec![
                upload(DomainKind::Transaction, good),
                upload(DomainKind::Transaction, "member_no\nM001\n"),
            ])
            .await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
