// ==========================================
// 合作社后台 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 静态方法在调用方持有的连接/事务上执行
// ==========================================

pub mod action_log_repo;
pub mod batch_repo;
pub mod error;
pub mod ledger_repo;

// 重导出核心仓储
pub use action_log_repo::{ActionLogRepository, ACTION_APPROVE, ACTION_INGEST, ACTION_REJECT};
pub use batch_repo::BatchRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use ledger_repo::LedgerRepository;
