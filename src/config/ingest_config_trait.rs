// ==========================================
// 合作社后台 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入/校验所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::error::Error;

/// 配置读取结果（错误可跨线程传递）
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// IngestConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait IngestConfigReader: Send + Sync {
    /// 单次上传允许的最大数据行数
    ///
    /// # 默认值
    /// - 5000
    async fn get_max_rows(&self) -> ConfigResult<usize>;

    /// 单笔金额上限
    ///
    /// # 默认值
    /// - 100000000
    async fn get_max_amount(&self) -> ConfigResult<Decimal>;

    /// 贷款期限上限（月）
    ///
    /// # 默认值
    /// - 120
    async fn get_max_loan_term_months(&self) -> ConfigResult<i64>;

    /// 是否允许未来日期
    ///
    /// # 默认值
    /// - false
    async fn get_allow_future_dates(&self) -> ConfigResult<bool>;
}
