// ==========================================
// 合作社后台 - API 层
// ==========================================
// 职责: 对外业务接口，供 CLI 及上层调用
// ==========================================

pub mod batch_api;
pub mod error;

// 重导出核心类型
pub use batch_api::{
    ApproveResponse, BatchApi, IngestResponse, PendingRowView, RejectResponse, StagedRowView,
};
pub use error::{ApiError, ApiResult};
