// ==========================================
// 合作社后台 - 核心库
// ==========================================
// 流水线: 表格上传 → 逐行校验 → 暂存 → 人工审批/驳回 → 入账
// 技术栈: Rust + SQLite
// 红线: 审批/驳回全有或全无，终态批次不再变更
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 生命周期与入账
pub mod engine;

// 导入层 - 上传文件
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组合根
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchStatus, DomainKind, Polarity, RowStatus};

// 领域实体
pub use domain::batch::{Batch, PendingRow, StagedRow, ValidatedRow};
pub use domain::records::StagedRecord;

// 引擎
pub use engine::{BatchLifecycleController, LedgerPoster};

// API
pub use api::{ApiError, ApiResult, BatchApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "合作社后台";
