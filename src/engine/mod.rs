// ==========================================
// 合作社后台 - 引擎层
// ==========================================
// 职责: 批次生命周期（审批/驳回）与总账入账
// 红线: 引擎只通过仓储层的 *_tx 函数访问数据库，事务由控制器持有
// ==========================================

pub mod batch_lifecycle;
pub mod error;
pub mod ledger_poster;

pub use batch_lifecycle::{ApprovalOutcome, BatchLifecycleController, RejectionOutcome};
pub use error::{LifecycleError, LifecycleResult};
pub use ledger_poster::{LedgerPoster, PostingContext, PostingOutcome};
