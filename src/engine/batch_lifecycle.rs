// ==========================================
// 合作社后台 - 批次生命周期控制器
// ==========================================
// 状态机: PENDING → {VALIDATED, PENDING_VALIDATION} → {PROCESSED, REJECTED}
// 红线: 审批/驳回全有或全无；状态读取前先取得写锁（BEGIN IMMEDIATE）
// 红线: 终态批次不再变更；不做自动重试（由调用方决定）
// ==========================================

use crate::domain::ledger::ActionLog;
use crate::domain::types::BatchStatus;
use crate::engine::error::{LifecycleError, LifecycleResult};
use crate::engine::ledger_poster::{LedgerPoster, PostingContext};
use crate::repository::{
    ActionLogRepository, BatchRepository, RepositoryError, ACTION_APPROVE, ACTION_REJECT,
};
use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 审批结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub batch_id: String,
    pub processed_count: usize, // 入账行数
    pub discarded_count: usize, // 随审批丢弃的无效行数
    pub status: BatchStatus,
}

/// 驳回结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionOutcome {
    pub batch_id: String,
    pub deleted_count: usize,
    pub status: BatchStatus,
}

// ==========================================
// BatchLifecycleController
// ==========================================
pub struct BatchLifecycleController {
    conn: Arc<Mutex<Connection>>,
}

impl BatchLifecycleController {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> LifecycleResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LifecycleError::Repository(RepositoryError::LockError(e.to_string())))
    }

    /// 审批批次：入账全部有效行，清空暂存区，批次置为 PROCESSED
    ///
    /// # 错误
    /// - NotFound: 批次不存在
    /// - InvalidState: 批次不在 VALIDATED / PENDING_VALIDATION
    /// - UnresolvedCategory: 科目缺失（整批回滚）
    /// - MemberAlreadyRegistered: 会员编号已被其他批次登记（整批回滚）
    /// - Repository(Transient): 数据库繁忙/超时，可整体重试
    pub fn approve(&self, batch_id: &str, approver: &str) -> LifecycleResult<ApprovalOutcome> {
        let approver = require_identity(approver, "审批人")?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // 失败时 tx 被丢弃，自动回滚
        let outcome = Self::approve_in_tx(&tx, batch_id, &approver).map_err(|e| {
            log_failure("审批", batch_id, &e);
            e
        })?;
        tx.commit()?;

        info!(
            batch_id = %batch_id,
            approver = %approver,
            processed = outcome.processed_count,
            discarded = outcome.discarded_count,
            "批次审批完成"
        );
        Ok(outcome)
    }

    fn approve_in_tx(
        tx: &Transaction<'_>,
        batch_id: &str,
        approver: &str,
    ) -> LifecycleResult<ApprovalOutcome> {
        // === 步骤 1-2: 加锁读取状态并校验 ===
        let status = read_status(tx, batch_id)?;
        if !status.is_approvable() {
            return Err(LifecycleError::InvalidState {
                batch_id: batch_id.to_string(),
                status,
                action: "审批",
            });
        }

        // === 步骤 3: 取有效行 ===
        let valid_rows = BatchRepository::fetch_valid_rows_tx(tx, batch_id)?;
        debug!(batch_id = %batch_id, valid_rows = valid_rows.len(), "读取有效暂存行");

        let ctx = PostingContext {
            batch_id: batch_id.to_string(),
            posted_by: approver.to_string(),
            posted_at: Utc::now(),
        };

        // === 步骤 4: 一次解析科目，逐行入账 ===
        if !valid_rows.is_empty() {
            LedgerPoster::check_member_numbers(tx, &valid_rows)?;
            let categories = LedgerPoster::resolve_categories(tx, &valid_rows)?;
            for row in &valid_rows {
                LedgerPoster::post_row(tx, row, &categories, &ctx)?;
            }
        }
        let processed_count = valid_rows.len();

        // === 步骤 5: 批次置为 PROCESSED ===
        BatchRepository::mark_processed_tx(tx, batch_id, approver, ctx.posted_at, processed_count)?;

        // === 步骤 6: 删除已入账行，再丢弃剩余无效行 ===
        let posted_ids: Vec<i64> = valid_rows.iter().map(|r| r.row_id).collect();
        BatchRepository::delete_rows_tx(tx, &posted_ids)?;
        let discarded_count = BatchRepository::delete_batch_rows_tx(tx, batch_id)?;
        if discarded_count > 0 {
            warn!(batch_id = %batch_id, discarded = discarded_count, "审批时丢弃无效行");
        }

        ActionLogRepository::insert_tx(
            tx,
            &ActionLog {
                action_id: Uuid::new_v4().to_string(),
                batch_id: batch_id.to_string(),
                action_type: ACTION_APPROVE.to_string(),
                actor: approver.to_string(),
                action_ts: ctx.posted_at,
                detail_json: Some(
                    json!({
                        "from_status": status.as_str(),
                        "processed_count": processed_count,
                        "discarded_count": discarded_count,
                    })
                    .to_string(),
                ),
            },
        )?;

        Ok(ApprovalOutcome {
            batch_id: batch_id.to_string(),
            processed_count,
            discarded_count,
            status: BatchStatus::Processed,
        })
    }

    /// 驳回批次：记录原因，删除全部暂存行，批次置为 REJECTED
    ///
    /// # 错误
    /// - InvalidInput: 驳回人或原因为空
    /// - NotFound / InvalidState
    pub fn reject(
        &self,
        batch_id: &str,
        approver: &str,
        reason: &str,
    ) -> LifecycleResult<RejectionOutcome> {
        let approver = require_identity(approver, "驳回人")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LifecycleError::InvalidInput("驳回原因不能为空".to_string()));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = Self::reject_in_tx(&tx, batch_id, &approver, reason).map_err(|e| {
            log_failure("驳回", batch_id, &e);
            e
        })?;
        tx.commit()?;

        info!(
            batch_id = %batch_id,
            approver = %approver,
            deleted = outcome.deleted_count,
            reason = %reason,
            "批次已驳回"
        );
        Ok(outcome)
    }

    fn reject_in_tx(
        tx: &Transaction<'_>,
        batch_id: &str,
        approver: &str,
        reason: &str,
    ) -> LifecycleResult<RejectionOutcome> {
        let status = read_status(tx, batch_id)?;
        if !status.is_rejectable() {
            return Err(LifecycleError::InvalidState {
                batch_id: batch_id.to_string(),
                status,
                action: "驳回",
            });
        }

        let decided_at = Utc::now();
        BatchRepository::mark_rejected_tx(tx, batch_id, approver, decided_at, reason)?;
        let deleted_count = BatchRepository::delete_batch_rows_tx(tx, batch_id)?;

        ActionLogRepository::insert_tx(
            tx,
            &ActionLog {
                action_id: Uuid::new_v4().to_string(),
                batch_id: batch_id.to_string(),
                action_type: ACTION_REJECT.to_string(),
                actor: approver.to_string(),
                action_ts: decided_at,
                detail_json: Some(
                    json!({
                        "from_status": status.as_str(),
                        "reason": reason,
                        "deleted_count": deleted_count,
                    })
                    .to_string(),
                ),
            },
        )?;

        Ok(RejectionOutcome {
            batch_id: batch_id.to_string(),
            deleted_count,
            status: BatchStatus::Rejected,
        })
    }
}

/// 操作人必须是已认证的真实身份，不接受空值
fn require_identity(identity: &str, role: &str) -> LifecycleResult<String> {
    let identity = identity.trim();
    if identity.is_empty() {
        return Err(LifecycleError::InvalidInput(format!("{}不能为空", role)));
    }
    Ok(identity.to_string())
}

fn read_status(conn: &Connection, batch_id: &str) -> LifecycleResult<BatchStatus> {
    match BatchRepository::read_status_tx(conn, batch_id) {
        Ok(status) => Ok(status),
        Err(RepositoryError::NotFound { .. }) => Err(LifecycleError::NotFound(batch_id.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn log_failure(action: &str, batch_id: &str, err: &LifecycleError) {
    match err {
        LifecycleError::InvalidState { .. }
        | LifecycleError::NotFound(_)
        | LifecycleError::InvalidInput(_)
        | LifecycleError::MemberAlreadyRegistered { .. } => {
            warn!(batch_id = %batch_id, error = %err, "{}被拒绝", action);
        }
        _ if err.is_retryable() => {
            warn!(batch_id = %batch_id, error = %err, "{}遇到数据库繁忙，事务回滚（可重试）", action);
        }
        _ => {
            error!(batch_id = %batch_id, error = %err, "{}失败，事务回滚", action);
        }
    }
}
