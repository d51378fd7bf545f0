// ==========================================
// 合作社后台 - 导入管道 Trait
// ==========================================
// 职责: 定义导入接口（不包含实现）
// ==========================================

use crate::domain::batch::{RawRow, ValidatedRow};
use crate::domain::types::{BatchStatus, DomainKind};
use crate::importer::error::ImportResult;
use crate::importer::file_parser::ParsedSheet;
use crate::importer::row_validator::ValidationRules;
use crate::importer::schema::ColumnSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ==========================================
// WorkbookParser Trait
// ==========================================
// 用途: 文件解析接口
// 实现者: ExcelParser, CsvParser
pub trait WorkbookParser: Send + Sync {
    /// 解析上传文件字节为 ParsedSheet
    ///
    /// # 返回
    /// - Ok(ParsedSheet): 至少一行非空白数据
    /// - Err: 缺少必需列 / 无工作表 / 无数据行 / 文件损坏
    fn parse_bytes(&self, bytes: &[u8], schema: &[ColumnSpec]) -> ImportResult<ParsedSheet>;
}

// ==========================================
// RowValidator Trait
// ==========================================
// 用途: 单行校验接口（纯函数，不做 I/O）
// 实现者: MemberRowValidator, LoanRowValidator,
//         ContributionRowValidator, TransactionRowValidator
pub trait RowValidator: Send + Sync {
    fn kind(&self) -> DomainKind;

    /// 校验一行原始数据
    ///
    /// 所有失败规则都记入错误列表（不在首个错误处停止）；
    /// 记录保留尽力解析出的字段值
    fn validate(&self, row: &RawRow, rules: &ValidationRules) -> ValidatedRow;
}

// ==========================================
// 上传请求与导入结果
// ==========================================
#[derive(Debug, Clone)]
pub struct Upload {
    pub kind: DomainKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub batch_id: String,
    pub domain_kind: DomainKind,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub status: BatchStatus,
}

// ==========================================
// BatchIngestor Trait
// ==========================================
// 用途: 导入主接口
// 实现者: BatchImporter
#[async_trait]
pub trait BatchIngestor: Send + Sync {
    /// 导入单个上传文件：解析 → 校验 → 批次级查重 → 暂存（单事务）
    async fn ingest(&self, upload: Upload) -> ImportResult<IngestOutcome>;

    /// 批量导入多个文件（并发执行，互不影响）
    async fn ingest_many(&self, uploads: Vec<Upload>) -> Vec<ImportResult<IngestOutcome>>;
}
