// ==========================================
// 合作社后台 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 结构类错误（拒绝上传，不落库）/ 存储错误 / 配置错误
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件结构错误 =====
    #[error("文件格式不支持: {0}（仅支持 .xlsx/.csv）")]
    UnsupportedFormat(String),

    #[error("工作簿中没有工作表")]
    NoSheet,

    #[error("缺少必需列: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("文件没有数据行")]
    EmptyFile,

    #[error("表头必须位于第 1 行（实际位于第 {row} 行）")]
    HeaderNotOnFirstRow { row: usize },

    #[error("数据行数 {rows} 超过上限 {max}")]
    TooManyRows { rows: usize, max: usize },

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 输入错误 =====
    #[error("输入参数无效: {0}")]
    InvalidInput(String),

    // ===== 配置错误 =====
    #[error("配置读取失败: {0}")]
    ConfigReadError(String),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为上传文件结构问题（用户可修正，未发生任何持久化）
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ImportError::UnsupportedFormat(_)
                | ImportError::NoSheet
                | ImportError::MissingColumns { .. }
                | ImportError::HeaderNotOnFirstRow { .. }
                | ImportError::TooManyRows { .. }
                | ImportError::ExcelParseError(_)
                | ImportError::CsvParseError(_)
        )
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::XlsxError>
impl From<calamine::XlsxError> for ImportError {
    fn from(err: calamine::XlsxError) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_names() {
        let err = ImportError::MissingColumns {
            missing: vec!["amount".to_string(), "member_no".to_string()],
        };
        assert_eq!(err.to_string(), "缺少必需列: amount, member_no");
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_empty_file_is_not_schema_class() {
        assert!(!ImportError::EmptyFile.is_schema_error());
        assert!(!ImportError::InvalidInput("x".into()).is_schema_error());
    }
}
