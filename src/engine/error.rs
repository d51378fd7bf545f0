// ==========================================
// 合作社后台 - 生命周期引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 审批/驳回中的任何错误都意味着整个事务已回滚
// ==========================================

use crate::domain::types::BatchStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("批次不存在: {0}")]
    NotFound(String),

    #[error("批次 {batch_id} 当前状态为 {status}，不允许{action}")]
    InvalidState {
        batch_id: String,
        status: BatchStatus,
        action: &'static str,
    },

    #[error("未找到科目: {}", .names.join(", "))]
    UnresolvedCategory { names: Vec<String> },

    #[error("会员编号已登记: {}", .member_nos.join(", "))]
    MemberAlreadyRegistered { member_nos: Vec<String> },

    #[error("输入参数无效: {0}")]
    InvalidInput(String),

    #[error("暂存行 {row_id} 数据不完整: 缺少 {field}")]
    IncompleteRow { row_id: i64, field: &'static str },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LifecycleError {
    /// 存储层繁忙/超时，可由调用方整体重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::Repository(e) if e.is_transient())
    }
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(err: rusqlite::Error) -> Self {
        LifecycleError::Repository(RepositoryError::from(err))
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
