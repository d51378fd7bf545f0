// ==========================================
// 合作社后台 - 暂存记录（按业务域的固定结构）
// ==========================================
// 所有字段在校验前均可为空：无效行保留尽力解析的值，供人工复核
// ==========================================

use crate::domain::types::DomainKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==========================================
// MemberRecord - 会员登记
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_no: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub id_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub join_date: Option<NaiveDate>,
}

// ==========================================
// LoanRecord - 贷款申请
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub member_no: Option<String>,
    pub id_number: Option<String>,
    pub loan_type: Option<String>, // 科目名称（如 "Personal Loan"）
    pub amount: Option<Decimal>,
    pub term_months: Option<i64>,
    pub interest_rate: Option<f64>, // 年利率（%）
    pub purpose: Option<String>,
    pub application_date: Option<NaiveDate>,
}

// ==========================================
// ContributionRecord - 会员缴存
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub member_no: Option<String>,
    pub contribution_type: Option<String>, // 科目名称（如 "Savings"）
    pub amount: Option<Decimal>,
    pub contribution_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
}

// ==========================================
// TransactionRecord - 通用交易
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub member_no: Option<String>,
    pub transaction_type: Option<String>, // 科目名称
    pub amount: Option<Decimal>,
    pub transaction_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
}

// ==========================================
// StagedRecord - 暂存记录（按业务域打标签）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagedRecord {
    Member(MemberRecord),
    Loan(LoanRecord),
    Contribution(ContributionRecord),
    Transaction(TransactionRecord),
}

impl StagedRecord {
    pub fn kind(&self) -> DomainKind {
        match self {
            StagedRecord::Member(_) => DomainKind::Member,
            StagedRecord::Loan(_) => DomainKind::Loan,
            StagedRecord::Contribution(_) => DomainKind::Contribution,
            StagedRecord::Transaction(_) => DomainKind::Transaction,
        }
    }

    /// 账户引用（会员编号）
    pub fn account_ref(&self) -> Option<&str> {
        let member_no = match self {
            StagedRecord::Member(r) => &r.member_no,
            StagedRecord::Loan(r) => &r.member_no,
            StagedRecord::Contribution(r) => &r.member_no,
            StagedRecord::Transaction(r) => &r.member_no,
        };
        member_no.as_deref()
    }

    /// 入账科目名称（会员登记不涉及科目）
    pub fn category_name(&self) -> Option<&str> {
        match self {
            StagedRecord::Member(_) => None,
            StagedRecord::Loan(r) => r.loan_type.as_deref(),
            StagedRecord::Contribution(r) => r.contribution_type.as_deref(),
            StagedRecord::Transaction(r) => r.transaction_type.as_deref(),
        }
    }

    /// 业务参考号（用于批内去重）
    pub fn reference(&self) -> Option<&str> {
        match self {
            StagedRecord::Contribution(r) => r.reference.as_deref(),
            StagedRecord::Transaction(r) => r.reference.as_deref(),
            _ => None,
        }
    }
}
