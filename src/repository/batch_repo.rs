// ==========================================
// 合作社后台 - 批次暂存仓储
// ==========================================
// 职责: 批次头 + 暂存行的持久化（import_batch / staged_row）
// 红线: Repository 不含业务规则，只做数据 CRUD
// 约束: 生命周期状态的合法性由引擎层判定，不在此处校验
// ==========================================

use crate::domain::batch::{Batch, NewBatch, PendingRow, RawRow, StagedRow, ValidatedRow};
use crate::domain::records::StagedRecord;
use crate::domain::types::{BatchStatus, DomainKind, RowStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const BATCH_COLUMNS: &str = r#"
    batch_id, file_name, domain_kind, total_rows, valid_rows, invalid_rows,
    processed_rows, status, uploaded_by, uploaded_at, approved_by, decided_at,
    rejection_reason
"#;

const ROW_COLUMNS: &str = r#"
    s.row_id, s.batch_id, s.row_number, s.payload_json, s.raw_json,
    s.validation_status, s.errors_json
"#;

// ==========================================
// BatchRepository
// ==========================================
pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    /// 创建新的批次仓储（共享连接）
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内操作（由调用方持有事务）
    // ==========================================

    /// 创建批次头（初始状态 PENDING）
    pub fn create_batch_tx(conn: &Connection, meta: &NewBatch) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, file_name, domain_kind, total_rows, valid_rows, invalid_rows,
                processed_rows, status, uploaded_by, uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5, ?6, ?7)
            "#,
            params![
                meta.batch_id,
                meta.file_name,
                meta.domain_kind.as_str(),
                meta.total_rows as i64,
                BatchStatus::Pending.as_str(),
                meta.uploaded_by,
                meta.uploaded_at.to_rfc3339(),
            ],
        )?;
        Ok(meta.batch_id.clone())
    }

    /// 批量写入暂存行
    pub fn stage_rows_tx(
        conn: &Connection,
        batch_id: &str,
        domain_kind: DomainKind,
        rows: &[ValidatedRow],
    ) -> RepositoryResult<usize> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO staged_row (
                batch_id, row_number, domain_kind, payload_json, raw_json,
                validation_status, errors_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;

        let now = Utc::now().to_rfc3339();
        let mut count = 0;
        for row in rows {
            let errors_json = if row.errors.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&row.errors)?)
            };
            stmt.execute(params![
                batch_id,
                row.row_number as i64,
                domain_kind.as_str(),
                serde_json::to_string(&row.record)?,
                serde_json::to_string(&row.raw)?,
                row.status.as_str(),
                errors_json,
                now,
            ])?;
            count += 1;
        }

        Ok(count)
    }

    /// 暂存完成：写入有效/无效计数，状态置为 VALIDATED 或 PENDING_VALIDATION
    pub fn finalize_staging_tx(
        conn: &Connection,
        batch_id: &str,
        valid_count: usize,
        invalid_count: usize,
    ) -> RepositoryResult<BatchStatus> {
        let status = BatchStatus::after_staging(invalid_count);
        let affected = conn.execute(
            r#"
            UPDATE import_batch
            SET valid_rows = ?2, invalid_rows = ?3, status = ?4
            WHERE batch_id = ?1
            "#,
            params![
                batch_id,
                valid_count as i64,
                invalid_count as i64,
                status.as_str()
            ],
        )?;
        if affected == 0 {
            return Err(batch_not_found(batch_id));
        }
        Ok(status)
    }

    /// 读取批次状态
    ///
    /// 调用方必须在 IMMEDIATE 事务内调用：写锁在读之前已获取，
    /// 同一批次的并发审批/驳回因此串行化。
    pub fn read_status_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<BatchStatus> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM import_batch WHERE batch_id = ?1",
                params![batch_id],
                |row| row.get(0),
            )
            .optional()?;

        let raw = raw.ok_or_else(|| batch_not_found(batch_id))?;
        BatchStatus::parse(&raw).ok_or_else(|| RepositoryError::FieldValueError {
            field: "import_batch.status".to_string(),
            message: format!("未知批次状态: {}", raw),
        })
    }

    /// 读取批次头
    pub fn find_batch_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Option<Batch>> {
        let sql = format!("SELECT {} FROM import_batch WHERE batch_id = ?1", BATCH_COLUMNS);
        let batch = conn
            .query_row(&sql, params![batch_id], map_batch_row)
            .optional()?;
        Ok(batch)
    }

    /// 读取批次内全部有效行
    pub fn fetch_valid_rows_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Vec<StagedRow>> {
        let sql = format!(
            "SELECT {} FROM staged_row s WHERE s.batch_id = ?1 AND s.validation_status = ?2 ORDER BY s.row_number, s.row_id",
            ROW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![batch_id, RowStatus::Valid.as_str()], map_staged_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 读取批次内全部暂存行
    pub fn fetch_rows_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Vec<StagedRow>> {
        let sql = format!(
            "SELECT {} FROM staged_row s WHERE s.batch_id = ?1 ORDER BY s.row_number, s.row_id",
            ROW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![batch_id], map_staged_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 按行 ID 删除暂存行
    pub fn delete_rows_tx(conn: &Connection, row_ids: &[i64]) -> RepositoryResult<usize> {
        let mut stmt = conn.prepare("DELETE FROM staged_row WHERE row_id = ?1")?;
        let mut count = 0;
        for row_id in row_ids {
            count += stmt.execute(params![row_id])?;
        }
        Ok(count)
    }

    /// 删除批次的全部暂存行
    pub fn delete_batch_rows_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<usize> {
        let count = conn.execute(
            "DELETE FROM staged_row WHERE batch_id = ?1",
            params![batch_id],
        )?;
        Ok(count)
    }

    /// 标记为已入账
    pub fn mark_processed_tx(
        conn: &Connection,
        batch_id: &str,
        approver: &str,
        decided_at: DateTime<Utc>,
        processed_rows: usize,
    ) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE import_batch
            SET status = ?2, approved_by = ?3, decided_at = ?4, processed_rows = ?5
            WHERE batch_id = ?1
            "#,
            params![
                batch_id,
                BatchStatus::Processed.as_str(),
                approver,
                decided_at.to_rfc3339(),
                processed_rows as i64,
            ],
        )?;
        if affected == 0 {
            return Err(batch_not_found(batch_id));
        }
        Ok(())
    }

    /// 标记为已驳回
    pub fn mark_rejected_tx(
        conn: &Connection,
        batch_id: &str,
        approver: &str,
        decided_at: DateTime<Utc>,
        reason: &str,
    ) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE import_batch
            SET status = ?2, approved_by = ?3, decided_at = ?4, rejection_reason = ?5
            WHERE batch_id = ?1
            "#,
            params![
                batch_id,
                BatchStatus::Rejected.as_str(),
                approver,
                decided_at.to_rfc3339(),
                reason,
            ],
        )?;
        if affected == 0 {
            return Err(batch_not_found(batch_id));
        }
        Ok(())
    }

    // ==========================================
    // 自带事务/连接的操作
    // ==========================================

    /// 创建批次头（独立调用，状态 PENDING）
    pub fn create_batch(&self, meta: &NewBatch) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::create_batch_tx(&conn, meta)
    }

    /// 批量写入暂存行（原子：全部写入或全部回滚）
    pub fn stage_rows(
        &self,
        batch_id: &str,
        domain_kind: DomainKind,
        rows: &[ValidatedRow],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        if Self::find_batch_tx(&tx, batch_id)?.is_none() {
            return Err(batch_not_found(batch_id));
        }
        let count = Self::stage_rows_tx(&tx, batch_id, domain_kind, rows)?;
        tx.commit()?;
        Ok(count)
    }

    pub fn finalize_staging(
        &self,
        batch_id: &str,
        valid_count: usize,
        invalid_count: usize,
    ) -> RepositoryResult<BatchStatus> {
        let conn = self.get_conn()?;
        Self::finalize_staging_tx(&conn, batch_id, valid_count, invalid_count)
    }

    /// 读取批次状态（无锁快照；需要状态迁移时请在事务内使用 read_status_tx）
    pub fn get_batch_status(&self, batch_id: &str) -> RepositoryResult<BatchStatus> {
        let conn = self.get_conn()?;
        Self::read_status_tx(&conn, batch_id)
    }

    pub fn fetch_valid_rows(&self, batch_id: &str) -> RepositoryResult<Vec<StagedRow>> {
        let conn = self.get_conn()?;
        Self::fetch_valid_rows_tx(&conn, batch_id)
    }

    pub fn delete_rows(&self, row_ids: &[i64]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let count = Self::delete_rows_tx(&tx, row_ids)?;
        tx.commit()?;
        Ok(count)
    }

    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<Batch>> {
        let conn = self.get_conn()?;
        Self::find_batch_tx(&conn, batch_id)
    }

    /// 查询批次内全部暂存行
    pub fn list_rows(&self, batch_id: &str) -> RepositoryResult<Vec<StagedRow>> {
        let conn = self.get_conn()?;
        if Self::find_batch_tx(&conn, batch_id)?.is_none() {
            return Err(batch_not_found(batch_id));
        }
        Self::fetch_rows_tx(&conn, batch_id)
    }

    /// 按业务域（及可选状态）列出批次，最新在前
    pub fn list_batches(
        &self,
        domain_kind: DomainKind,
        status: Option<BatchStatus>,
    ) -> RepositoryResult<Vec<Batch>> {
        let conn = self.get_conn()?;
        let base = format!("SELECT {} FROM import_batch WHERE domain_kind = ?1", BATCH_COLUMNS);

        let batches = match status {
            Some(status) => {
                let sql = format!("{} AND status = ?2 ORDER BY uploaded_at DESC", base);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![domain_kind.as_str(), status.as_str()], map_batch_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("{} ORDER BY uploaded_at DESC", base);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![domain_kind.as_str()], map_batch_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(batches)
    }

    /// 列出待审核行：仅限 VALIDATED / PENDING_VALIDATION 批次
    pub fn list_pending_rows(&self, domain_kind: DomainKind) -> RepositoryResult<Vec<PendingRow>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}, b.status, b.file_name, b.uploaded_by, b.uploaded_at
            FROM staged_row s
            JOIN import_batch b ON b.batch_id = s.batch_id
            WHERE b.domain_kind = ?1 AND b.status IN (?2, ?3)
            ORDER BY b.uploaded_at, s.batch_id, s.row_number
            "#,
            ROW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    domain_kind.as_str(),
                    BatchStatus::Validated.as_str(),
                    BatchStatus::PendingValidation.as_str(),
                ],
                |row| {
                    let staged = map_staged_row(row)?;
                    let status_raw: String = row.get(7)?;
                    let uploaded_at_raw: String = row.get(10)?;
                    Ok(PendingRow {
                        row: staged,
                        batch_status: parse_batch_status(7, &status_raw)?,
                        file_name: row.get(8)?,
                        uploaded_by: row.get(9)?,
                        uploaded_at: parse_ts(10, &uploaded_at_raw)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ==========================================
// 行映射
// ==========================================

fn batch_not_found(batch_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "ImportBatch".to_string(),
        id: batch_id.to_string(),
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("时间格式错误 {}: {}", raw, e)))
}

fn parse_batch_status(idx: usize, raw: &str) -> rusqlite::Result<BatchStatus> {
    BatchStatus::parse(raw).ok_or_else(|| conversion_error(idx, format!("未知批次状态: {}", raw)))
}

fn map_batch_row(row: &Row) -> rusqlite::Result<Batch> {
    let kind_raw: String = row.get(2)?;
    let status_raw: String = row.get(7)?;
    let uploaded_at_raw: String = row.get(9)?;
    let decided_at_raw: Option<String> = row.get(11)?;

    Ok(Batch {
        batch_id: row.get(0)?,
        file_name: row.get(1)?,
        domain_kind: DomainKind::parse(&kind_raw)
            .ok_or_else(|| conversion_error(2, format!("未知业务域: {}", kind_raw)))?,
        total_rows: row.get::<_, i64>(3)? as usize,
        valid_rows: row.get::<_, i64>(4)? as usize,
        invalid_rows: row.get::<_, i64>(5)? as usize,
        processed_rows: row.get::<_, i64>(6)? as usize,
        status: parse_batch_status(7, &status_raw)?,
        uploaded_by: row.get(8)?,
        uploaded_at: parse_ts(9, &uploaded_at_raw)?,
        approved_by: row.get(10)?,
        decided_at: decided_at_raw.map(|s| parse_ts(11, &s)).transpose()?,
        rejection_reason: row.get(12)?,
    })
}

fn map_staged_row(row: &Row) -> rusqlite::Result<StagedRow> {
    let payload_json: String = row.get(3)?;
    let raw_json: String = row.get(4)?;
    let status_raw: String = row.get(5)?;
    let errors_json: Option<String> = row.get(6)?;

    let record: StagedRecord = serde_json::from_str(&payload_json)
        .map_err(|e| conversion_error(3, format!("暂存记录反序列化失败: {}", e)))?;
    let raw: RawRow = serde_json::from_str(&raw_json)
        .map_err(|e| conversion_error(4, format!("原始行反序列化失败: {}", e)))?;
    let errors: Vec<String> = match errors_json {
        Some(s) => serde_json::from_str(&s)
            .map_err(|e| conversion_error(6, format!("错误列表反序列化失败: {}", e)))?,
        None => Vec::new(),
    };

    Ok(StagedRow {
        row_id: row.get(0)?,
        batch_id: row.get(1)?,
        row_number: row.get::<_, i64>(2)? as usize,
        record,
        status: RowStatus::parse(&status_raw)
            .ok_or_else(|| conversion_error(5, format!("未知行状态: {}", status_raw)))?,
        errors,
        raw,
    })
}
