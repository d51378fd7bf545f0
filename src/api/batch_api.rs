// ==========================================
// 合作社后台 - 批次API
// ==========================================
// 职责: 对外提供上传、待审核查询、审批、驳回及批次只读查询
// 约定: 所有错误统一转换为 ApiError
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::batch::{Batch, PendingRow, StagedRow};
use crate::domain::records::StagedRecord;
use crate::domain::types::{BatchStatus, DomainKind, RowStatus};
use crate::engine::BatchLifecycleController;
use crate::importer::{BatchImporter, BatchIngestor, IngestOutcome, Upload};
use crate::repository::{BatchRepository, RepositoryError};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// 上传响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// 批次ID
    pub batch_id: String,
    /// 业务域
    pub domain_kind: DomainKind,
    /// 数据行总数（不含空行）
    pub total: usize,
    /// 有效行数
    pub valid_count: usize,
    /// 无效行数
    pub invalid_count: usize,
    /// 暂存后的批次状态（VALIDATED / PENDING_VALIDATION）
    pub status: BatchStatus,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            batch_id: outcome.batch_id,
            domain_kind: outcome.domain_kind,
            total: outcome.total_rows,
            valid_count: outcome.valid_rows,
            invalid_count: outcome.invalid_rows,
            status: outcome.status,
        }
    }
}

/// 审批响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub batch_id: String,
    /// 入账行数
    pub processed_count: usize,
    /// 随审批丢弃的无效行数
    pub discarded_count: usize,
    pub status: BatchStatus,
}

/// 驳回响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectResponse {
    pub batch_id: String,
    /// 删除的暂存行数
    pub deleted_count: usize,
    pub status: BatchStatus,
}

/// 暂存行视图（供人工复核）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRowView {
    pub row_id: i64,
    pub batch_id: String,
    /// 表格行号（表头为第 1 行）
    pub row_number: usize,
    pub status: RowStatus,
    /// 校验错误（按列顺序）
    pub errors: Vec<String>,
    /// 尽力解析出的字段值
    pub record: StagedRecord,
    /// 原始单元格文本
    pub raw: BTreeMap<String, Option<String>>,
}

impl From<StagedRow> for StagedRowView {
    fn from(row: StagedRow) -> Self {
        let raw = row
            .raw
            .cells
            .iter()
            .map(|(column, value)| (column.clone(), value.to_text()))
            .collect();
        Self {
            row_id: row.row_id,
            batch_id: row.batch_id,
            row_number: row.row_number,
            status: row.status,
            errors: row.errors,
            record: row.record,
            raw,
        }
    }
}

/// 待审核行视图（附带批次信息）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRowView {
    #[serde(flatten)]
    pub row: StagedRowView,
    pub batch_status: BatchStatus,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<PendingRow> for PendingRowView {
    fn from(pending: PendingRow) -> Self {
        Self {
            row: pending.row.into(),
            batch_status: pending.batch_status,
            file_name: pending.file_name,
            uploaded_by: pending.uploaded_by,
            uploaded_at: pending.uploaded_at,
        }
    }
}

/// 批次API
pub struct BatchApi {
    importer: BatchImporter<ConfigManager>,
    lifecycle: Arc<BatchLifecycleController>,
    batch_repo: Arc<BatchRepository>,
}

impl BatchApi {
    /// 创建新的BatchApi实例（共享同一存储句柄）
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            importer: BatchImporter::new(conn.clone(), ConfigManager::from_connection(conn.clone())),
            lifecycle: Arc::new(BatchLifecycleController::new(conn.clone())),
            batch_repo: Arc::new(BatchRepository::new(conn)),
        }
    }

    /// 上传表格并暂存为新批次
    ///
    /// # 参数
    /// - kind: 业务域
    /// - file_name: 源文件名（扩展名决定格式）
    /// - bytes: 文件内容
    /// - uploaded_by: 上传人
    ///
    /// # 返回
    /// - Ok(IngestResponse): 批次ID、行数统计与状态
    /// - Err(ApiError::SchemaError / EmptyFile): 文件被拒绝，未落库
    #[instrument(skip(self, bytes), fields(kind = %kind, size = bytes.len()))]
    pub async fn ingest_batch(
        &self,
        kind: DomainKind,
        file_name: &str,
        bytes: Vec<u8>,
        uploaded_by: &str,
    ) -> ApiResult<IngestResponse> {
        let outcome = self
            .importer
            .ingest(Upload {
                kind,
                file_name: file_name.to_string(),
                bytes,
                uploaded_by: uploaded_by.to_string(),
            })
            .await?;
        Ok(outcome.into())
    }

    /// 并发上传多个文件，每个文件独立成批，互不影响
    #[instrument(skip(self, uploads), fields(count = uploads.len()))]
    pub async fn ingest_many(&self, uploads: Vec<Upload>) -> Vec<ApiResult<IngestResponse>> {
        self.importer
            .ingest_many(uploads)
            .await
            .into_iter()
            .map(|result| result.map(IngestResponse::from).map_err(ApiError::from))
            .collect()
    }

    /// 列出待审核行（仅 VALIDATED / PENDING_VALIDATION 批次）
    #[instrument(skip(self))]
    pub fn list_pending_rows(&self, kind: DomainKind) -> ApiResult<Vec<PendingRowView>> {
        let rows = self.batch_repo.list_pending_rows(kind)?;
        Ok(rows.into_iter().map(PendingRowView::from).collect())
    }

    /// 审批批次
    ///
    /// # 返回
    /// - Ok(ApproveResponse): 入账行数与丢弃行数
    /// - Err(ApiError::NotFound / InvalidState / UnresolvedCategory / Transient)
    #[instrument(skip(self))]
    pub async fn approve_batch(&self, batch_id: &str, approver: &str) -> ApiResult<ApproveResponse> {
        let lifecycle = self.lifecycle.clone();
        let batch_id = batch_id.to_string();
        let approver = approver.to_string();

        // 事务在阻塞线程内完成；任务失败时事务随连接守卫一起回滚
        let outcome = tokio::task::spawn_blocking(move || lifecycle.approve(&batch_id, &approver))
            .await
            .map_err(|e| ApiError::InternalError(format!("审批任务失败: {}", e)))??;

        Ok(ApproveResponse {
            batch_id: outcome.batch_id,
            processed_count: outcome.processed_count,
            discarded_count: outcome.discarded_count,
            status: outcome.status,
        })
    }

    /// 驳回批次
    ///
    /// # 返回
    /// - Ok(RejectResponse): 删除的暂存行数
    /// - Err(ApiError::NotFound / InvalidState / InvalidInput)
    #[instrument(skip(self))]
    pub async fn reject_batch(
        &self,
        batch_id: &str,
        approver: &str,
        reason: &str,
    ) -> ApiResult<RejectResponse> {
        let lifecycle = self.lifecycle.clone();
        let batch_id = batch_id.to_string();
        let approver = approver.to_string();
        let reason = reason.to_string();

        let outcome =
            tokio::task::spawn_blocking(move || lifecycle.reject(&batch_id, &approver, &reason))
                .await
                .map_err(|e| ApiError::InternalError(format!("驳回任务失败: {}", e)))??;

        Ok(RejectResponse {
            batch_id: outcome.batch_id,
            deleted_count: outcome.deleted_count,
            status: outcome.status,
        })
    }

    /// 查询批次
    pub fn get_batch(&self, batch_id: &str) -> ApiResult<Batch> {
        self.batch_repo
            .find_by_id(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("批次(id={})不存在", batch_id)))
    }

    /// 按业务域列出批次（最新在前）
    pub fn list_batches(
        &self,
        kind: DomainKind,
        status: Option<BatchStatus>,
    ) -> ApiResult<Vec<Batch>> {
        Ok(self.batch_repo.list_batches(kind, status)?)
    }

    /// 列出单个批次的暂存行
    pub fn list_batch_rows(&self, batch_id: &str) -> ApiResult<Vec<StagedRowView>> {
        let rows = self.batch_repo.list_rows(batch_id).map_err(|e| match e {
            RepositoryError::NotFound { .. } => {
                ApiError::NotFound(format!("批次(id={})不存在", batch_id))
            }
            other => other.into(),
        })?;
        Ok(rows.into_iter().map(StagedRowView::from).collect())
    }
}
