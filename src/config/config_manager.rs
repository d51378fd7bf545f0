// ==========================================
// 合作社后台 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::ingest_config_trait::{ConfigResult, IngestConfigReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入（覆盖）global scope 的配置值
    pub fn set_global_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 读取并解析配置值；缺省时返回默认值，格式错误时报错（错误信息包含配置键）
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|_| {
                tracing::warn!(config_key = key, raw_value = %raw, "配置值格式错误");
                format!("配置值格式错误 (key: {}, value: {})", key, raw).into()
            }),
        }
    }
}

// ==========================================
// IngestConfigReader Trait 实现
// ==========================================
#[async_trait]
impl IngestConfigReader for ConfigManager {
    async fn get_max_rows(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::INGEST_MAX_ROWS, defaults::MAX_ROWS)
    }

    async fn get_max_amount(&self) -> ConfigResult<Decimal> {
        let value = self.get_parsed_or_default(
            config_keys::INGEST_MAX_AMOUNT,
            Decimal::from(defaults::MAX_AMOUNT),
        )?;
        if value <= Decimal::ZERO {
            return Err(format!(
                "配置值超出范围 (key: {}, value: {})",
                config_keys::INGEST_MAX_AMOUNT,
                value
            )
            .into());
        }
        Ok(value)
    }

    async fn get_max_loan_term_months(&self) -> ConfigResult<i64> {
        let value = self.get_parsed_or_default(
            config_keys::INGEST_MAX_LOAN_TERM_MONTHS,
            defaults::MAX_LOAN_TERM_MONTHS,
        )?;
        if value < 1 {
            return Err(format!(
                "配置值超出范围 (key: {}, value: {})",
                config_keys::INGEST_MAX_LOAN_TERM_MONTHS,
                value
            )
            .into());
        }
        Ok(value)
    }

    async fn get_allow_future_dates(&self) -> ConfigResult<bool> {
        match self.get_config_value(config_keys::INGEST_ALLOW_FUTURE_DATES)? {
            None => Ok(defaults::ALLOW_FUTURE_DATES),
            Some(raw) => match raw.trim().to_uppercase().as_str() {
                "1" | "Y" | "TRUE" => Ok(true),
                "0" | "N" | "FALSE" => Ok(false),
                _ => Err(format!(
                    "配置值格式错误 (key: {}, value: {})",
                    config_keys::INGEST_ALLOW_FUTURE_DATES,
                    raw
                )
                .into()),
            },
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 导入
    pub const INGEST_MAX_ROWS: &str = "ingest/max_rows";

    // 行校验
    pub const INGEST_MAX_AMOUNT: &str = "ingest/max_amount";
    pub const INGEST_MAX_LOAN_TERM_MONTHS: &str = "ingest/max_loan_term_months";
    pub const INGEST_ALLOW_FUTURE_DATES: &str = "ingest/allow_future_dates";
}

// ==========================================
// 默认值
// ==========================================
pub mod defaults {
    pub const MAX_ROWS: usize = 5000;
    pub const MAX_AMOUNT: i64 = 100_000_000; // 整数货币单位
    pub const MAX_LOAN_TERM_MONTHS: i64 = 120;
    pub const ALLOW_FUTURE_DATES: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_defaults_when_absent() {
        let manager = setup_manager();
        assert_eq!(manager.get_max_rows().await.unwrap(), 5000);
        assert_eq!(
            manager.get_max_amount().await.unwrap(),
            Decimal::from(100_000_000)
        );
        assert_eq!(manager.get_max_loan_term_months().await.unwrap(), 120);
        assert!(!manager.get_allow_future_dates().await.unwrap());
    }

    #[tokio::test]
    async fn test_set_global_value_overrides_default() {
        let manager = setup_manager();
        manager.set_global_value(config_keys::INGEST_MAX_ROWS, "10").unwrap();
        manager
            .set_global_value(config_keys::INGEST_ALLOW_FUTURE_DATES, "true")
            .unwrap();
        manager.set_global_value(config_keys::INGEST_MAX_ROWS, "20").unwrap();

        assert_eq!(manager.get_max_rows().await.unwrap(), 20);
        assert!(manager.get_allow_future_dates().await.unwrap());
    }

    #[tokio::test]
    async fn test_max_amount_parsed_exactly() {
        let manager = setup_manager();
        manager
            .set_global_value(config_keys::INGEST_MAX_AMOUNT, "2500.75")
            .unwrap();
        assert_eq!(
            manager.get_max_amount().await.unwrap(),
            Decimal::new(250_075, 2)
        );

        manager
            .set_global_value(config_keys::INGEST_MAX_AMOUNT, "-1")
            .unwrap();
        assert!(manager.get_max_amount().await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_value_names_key() {
        let manager = setup_manager();
        manager
            .set_global_value(config_keys::INGEST_MAX_AMOUNT, "lots")
            .unwrap();

        let err = manager.get_max_amount().await.unwrap_err();
        assert!(err.to_string().contains("ingest/max_amount"));
    }

    #[tokio::test]
    async fn test_non_positive_term_rejected() {
        let manager = setup_manager();
        manager
            .set_global_value(config_keys::INGEST_MAX_LOAN_TERM_MONTHS, "0")
            .unwrap();
        assert!(manager.get_max_loan_term_months().await.is_err());
    }
}
