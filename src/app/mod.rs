// ==========================================
// 合作社后台 - 应用层
// ==========================================
// 职责: 组合根，供 CLI 入口使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV, DEFAULT_CATEGORIES};
