// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use coop_backoffice::config::{defaults, ConfigResult, IngestConfigReader};
use rust_decimal::Decimal;

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub max_rows: usize,
    pub max_amount: Decimal,
    pub max_loan_term_months: i64,
    pub allow_future_dates: bool,
    /// 置为 true 时所有读取都失败（模拟配置存储不可用）
    pub broken: bool,
}

impl MockConfig {
    /// 创建默认配置
    pub fn default() -> Self {
        Self {
            max_rows: defaults::MAX_ROWS,
            max_amount: Decimal::from(defaults::MAX_AMOUNT),
            max_loan_term_months: defaults::MAX_LOAN_TERM_MONTHS,
            allow_future_dates: defaults::ALLOW_FUTURE_DATES,
            broken: false,
        }
    }

    /// 金额上限
    pub fn with_max_amount(max_amount: Decimal) -> Self {
        let mut config = Self::default();
        config.max_amount = max_amount;
        config
    }

    /// 允许未来日期
    pub fn allowing_future_dates() -> Self {
        let mut config = Self::default();
        config.allow_future_dates = true;
        config
    }

    /// 读取必然失败
    pub fn broken() -> Self {
        let mut config = Self::default();
        config.broken = true;
        config
    }

    fn check(&self) -> ConfigResult<()> {
        if self.broken {
            return Err("配置存储不可用".into());
        }
        Ok(())
    }
}

#[async_trait]
impl IngestConfigReader for MockConfig {
    async fn get_max_rows(&self) -> ConfigResult<usize> {
        self.check()?;
        Ok(self.max_rows)
    }

    async fn get_max_amount(&self) -> ConfigResult<Decimal> {
        self.check()?;
        Ok(self.max_amount)
    }

    async fn get_max_loan_term_months(&self) -> ConfigResult<i64> {
        self.check()?;
        Ok(self.max_loan_term_months)
    }

    async fn get_allow_future_dates(&self) -> ConfigResult<bool> {
        self.check()?;
        Ok(self.allow_future_dates)
    }
}
