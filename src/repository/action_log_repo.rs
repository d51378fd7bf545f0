// ==========================================
// 合作社后台 - 操作日志数据仓储
// ==========================================
// 职责: 批次状态流转留痕（INGEST / APPROVE / REJECT）
// 红线: 状态变更与日志写入在同一事务内
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;

/// 操作类型常量
pub const ACTION_INGEST: &str = "INGEST";
pub const ACTION_APPROVE: &str = "APPROVE";
pub const ACTION_REJECT: &str = "REJECT";
