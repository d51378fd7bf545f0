// ==========================================
// 合作社后台 - 应用状态
// ==========================================
// 职责: 组合根，打开一次存储句柄并构建全部组件
// ==========================================

use std::sync::Arc;

use crate::api::BatchApi;
use crate::config::ConfigManager;
use crate::db::{self, SharedConnection};
use crate::domain::types::Polarity;
use crate::repository::{ActionLogRepository, LedgerRepository};

/// 默认科目（seed-categories 命令写入）
pub const DEFAULT_CATEGORIES: &[(&str, Polarity)] = &[
    ("Savings", Polarity::Credit),
    ("Shares", Polarity::Credit),
    ("Deposit", Polarity::Credit),
    ("Loan Repayment", Polarity::Credit),
    ("Withdrawal", Polarity::Debit),
    ("Personal Loan", Polarity::Debit),
    ("Emergency Loan", Polarity::Debit),
    ("Development Loan", Polarity::Debit),
];

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享存储句柄
    pub conn: SharedConnection,

    /// 批次API
    pub batch_api: Arc<BatchApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 总账仓储（科目维护/余额查询）
    pub ledger_repo: Arc<LedgerRepository>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 打开数据库（统一 PRAGMA），幂等建表，然后构建各层组件
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = db::open_shared_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;

        Ok(Self::from_connection(db_path, conn))
    }

    /// 基于已打开的存储句柄构建（测试使用）
    pub fn from_connection(db_path: String, conn: SharedConnection) -> Self {
        let batch_api = Arc::new(BatchApi::new(conn.clone()));
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        let ledger_repo = Arc::new(LedgerRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        tracing::info!("AppState初始化完成");

        Self {
            db_path,
            conn,
            batch_api,
            config_manager,
            ledger_repo,
            action_log_repo,
        }
    }

    /// 写入默认科目（已存在则保持不变），返回科目数量
    pub fn seed_default_categories(&self) -> Result<usize, String> {
        for (name, polarity) in DEFAULT_CATEGORIES {
            self.ledger_repo
                .ensure_category(name, *polarity)
                .map_err(|e| format!("写入科目 {} 失败: {}", name, e))?;
        }
        tracing::info!(count = DEFAULT_CATEGORIES.len(), "默认科目已就绪");
        Ok(DEFAULT_CATEGORIES.len())
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 环境变量: 显式指定数据库路径
pub const DB_PATH_ENV: &str = "COOP_BACKOFFICE_DB_PATH";

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 COOP_BACKOFFICE_DB_PATH（非空时）
/// - 用户数据目录/coop-backoffice/coop_backoffice.db
/// - 无法获取数据目录时: ./coop_backoffice.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    match dirs::data_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("coop-backoffice");
            // 目录创建失败时回退到当前目录
            if std::fs::create_dir_all(&dir).is_err() {
                return "./coop_backoffice.db".to_string();
            }
            dir.join("coop_backoffice.db").to_string_lossy().into_owned()
        }
        None => "./coop_backoffice.db".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_seed_default_categories_is_idempotent() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let state = AppState::new(path).unwrap();

        assert_eq!(state.seed_default_categories().unwrap(), DEFAULT_CATEGORIES.len());
        assert_eq!(state.seed_default_categories().unwrap(), DEFAULT_CATEGORIES.len());
        assert_eq!(
            state.ledger_repo.list_categories().unwrap().len(),
            DEFAULT_CATEGORIES.len()
        );
    }

    #[test]
    fn test_seed_keeps_existing_category_polarity() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let state = AppState::new(path).unwrap();

        // 运维手工把 Savings 配成借方
        state.ledger_repo.ensure_category("Savings", Polarity::Debit).unwrap();
        state.seed_default_categories().unwrap();

        let savings = state
            .ledger_repo
            .find_category_by_name("Savings")
            .unwrap()
            .unwrap();
        assert_eq!(savings.polarity, Polarity::Debit);
    }
}
