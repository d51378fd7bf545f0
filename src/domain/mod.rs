// ==========================================
// 合作社后台 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod batch;
pub mod ledger;
pub mod money;
pub mod records;
pub mod types;

// 重导出核心类型
pub use batch::{Batch, NewBatch, PendingRow, RawRow, RawValue, StagedRow, ValidatedRow};
pub use ledger::{ActionLog, Balance, Category, LedgerEntry, LoanAccount, Member};
pub use records::{
    ContributionRecord, LoanRecord, MemberRecord, StagedRecord, TransactionRecord,
};
pub use types::{BatchStatus, DomainKind, Polarity, RowStatus};
