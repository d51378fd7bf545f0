// ==========================================
// 合作社后台 - 永久账务实体
// ==========================================
// 仅由审批入账产生；流水创建后不可变
// ==========================================

use crate::domain::types::Polarity;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 流水状态：已入账
pub const LEDGER_STATUS_POSTED: &str = "POSTED";

/// 贷款状态：生效
pub const LOAN_STATUS_ACTIVE: &str = "ACTIVE";

// ==========================================
// Category - 科目（只读参考数据）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
    pub polarity: Polarity,
}

// ==========================================
// LedgerEntry - 账务流水
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub account_ref: String,
    pub category_id: i64,
    pub entry_date: NaiveDate,
    pub amount: Decimal, // 恒为正，方向由 effect 决定
    pub effect: Polarity,
    pub status: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub source_batch_id: String, // 来源批次（审计追溯）
    pub source_row_id: i64,      // 来源暂存行（幂等保护）
    pub posted_by: String,
    pub posted_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> Decimal {
        self.effect.signed(self.amount)
    }
}

// ==========================================
// Balance - 账户余额（账户 + 科目）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub account_ref: String,
    pub category_id: i64,
    pub amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// Member - 会员档案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_no: String,
    pub first_name: String,
    pub last_name: String,
    pub id_number: String,
    pub phone: String,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub join_date: NaiveDate,
    pub source_batch_id: String,
    pub source_row_id: i64,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// LoanAccount - 贷款账户
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAccount {
    pub loan_id: String,
    pub member_no: String,
    pub category_id: i64,
    pub principal: Decimal,
    pub term_months: i64,
    pub interest_rate: f64,
    pub purpose: Option<String>,
    pub application_date: NaiveDate,
    pub status: String,
    pub source_batch_id: String,
    pub source_row_id: i64,
    pub approved_by: String,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub batch_id: String,
    pub action_type: String, // INGEST / APPROVE / REJECT
    pub actor: String,
    pub action_ts: DateTime<Utc>,
    pub detail_json: Option<String>,
}
