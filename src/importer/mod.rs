// ==========================================
// 合作社后台 - 导入层
// ==========================================
// 职责: 上传文件 → 原始行 → 校验结果 → 暂存批次
// 支持: Excel (.xlsx), CSV
// ==========================================

// 模块声明
pub mod batch_importer;
pub mod data_cleaner;
pub mod error;
pub mod file_parser;
pub mod importer_trait;
pub mod row_validator;
pub mod schema;

// 重导出核心类型
pub use batch_importer::{mark_batch_duplicates, parse_and_validate, BatchImporter};
pub use data_cleaner::{serial_to_date, DataCleaner};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, ParsedSheet, UniversalFileParser};
pub use row_validator::{
    validator_for, ContributionRowValidator, LoanRowValidator, MemberRowValidator,
    TransactionRowValidator, ValidationRules,
};
pub use schema::{schema_for, ColumnKind, ColumnSpec};

// 重导出 Trait 接口
pub use importer_trait::{BatchIngestor, IngestOutcome, RowValidator, Upload, WorkbookParser};
