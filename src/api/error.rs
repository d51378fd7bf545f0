// ==========================================
// 合作社后台 - API层错误类型
// ==========================================
// 职责: 将导入/生命周期/仓储错误归类为调用方可处理的错误
// 分类: 结构错误 / 空文件 / 不存在 / 状态不允许 / 科目缺失 / 可重试 / 输入错误
// ==========================================

use crate::engine::error::LifecycleError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 上传文件错误（未发生任何持久化）
    // ==========================================
    #[error("文件结构错误: {0}")]
    SchemaError(String),

    #[error("文件没有数据行")]
    EmptyFile,

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("状态不允许: {0}")]
    InvalidState(String),

    #[error("未找到科目: {}", .names.join(", "))]
    UnresolvedCategory { names: Vec<String> },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库繁忙（可重试）: {0}")]
    Transient(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 调用方可原样重试（操作已整体回滚）
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }

    /// 稳定的错误类别代码，供 CLI/前端展示
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::SchemaError(_) => "SCHEMA_ERROR",
            ApiError::EmptyFile => "EMPTY_FILE",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidState(_) => "INVALID_STATE",
            ApiError::UnresolvedCategory { .. } => "UNRESOLVED_CATEGORY",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::Transient(_) => "TRANSIENT",
            ApiError::DatabaseError(_) | ApiError::DatabaseConnectionError(_) => "DATABASE_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::Transient(msg) => ApiError::Transient(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InternalError(format!("字段{}映射错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        if err.is_schema_error() {
            return ApiError::SchemaError(err.to_string());
        }
        match err {
            ImportError::EmptyFile => ApiError::EmptyFile,
            ImportError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            ImportError::ConfigReadError(msg) => {
                ApiError::InternalError(format!("配置读取失败: {}", msg))
            }
            ImportError::Repository(e) => e.into(),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

// ==========================================
// 从 LifecycleError 转换
// ==========================================
impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(batch_id) => {
                ApiError::NotFound(format!("批次(id={})不存在", batch_id))
            }
            e @ LifecycleError::InvalidState { .. } => ApiError::InvalidState(e.to_string()),
            LifecycleError::UnresolvedCategory { names } => ApiError::UnresolvedCategory { names },
            e @ LifecycleError::MemberAlreadyRegistered { .. } => {
                ApiError::BusinessRuleViolation(e.to_string())
            }
            LifecycleError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            e @ LifecycleError::IncompleteRow { .. } => ApiError::InternalError(e.to_string()),
            LifecycleError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
