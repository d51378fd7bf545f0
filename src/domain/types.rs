// ==========================================
// 合作社后台 - 领域类型定义
// ==========================================
// 批次生命周期、行校验状态、业务域、科目方向
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 业务域 (Domain Kind)
// ==========================================
// 每个上传文件只属于一个业务域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainKind {
    Member,       // 会员
    Loan,         // 贷款
    Contribution, // 缴存
    Transaction,  // 通用交易
}

impl DomainKind {
    pub const ALL: [DomainKind; 4] = [
        DomainKind::Member,
        DomainKind::Loan,
        DomainKind::Contribution,
        DomainKind::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainKind::Member => "MEMBER",
            DomainKind::Loan => "LOAN",
            DomainKind::Contribution => "CONTRIBUTION",
            DomainKind::Transaction => "TRANSACTION",
        }
    }

    /// 解析业务域（大小写不敏感，未知值返回 None）
    pub fn parse(s: &str) -> Option<DomainKind> {
        match s.trim().to_uppercase().as_str() {
            "MEMBER" => Some(DomainKind::Member),
            "LOAN" => Some(DomainKind::Loan),
            "CONTRIBUTION" => Some(DomainKind::Contribution),
            "TRANSACTION" => Some(DomainKind::Transaction),
            _ => None,
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
// PENDING → {VALIDATED, PENDING_VALIDATION} → {PROCESSED, REJECTED}
// PROCESSED / REJECTED 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,           // 已创建，暂存中
    Validated,         // 暂存完成，无无效行
    PendingValidation, // 暂存完成，存在无效行
    Processed,         // 已审批入账
    Rejected,          // 已驳回
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "PENDING",
            BatchStatus::Validated => "VALIDATED",
            BatchStatus::PendingValidation => "PENDING_VALIDATION",
            BatchStatus::Processed => "PROCESSED",
            BatchStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<BatchStatus> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(BatchStatus::Pending),
            "VALIDATED" => Some(BatchStatus::Validated),
            "PENDING_VALIDATION" => Some(BatchStatus::PendingValidation),
            "PROCESSED" => Some(BatchStatus::Processed),
            "REJECTED" => Some(BatchStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Processed | BatchStatus::Rejected)
    }

    /// 可审批状态
    pub fn is_approvable(&self) -> bool {
        matches!(self, BatchStatus::Validated | BatchStatus::PendingValidation)
    }

    /// 可驳回状态
    pub fn is_rejectable(&self) -> bool {
        matches!(
            self,
            BatchStatus::Pending | BatchStatus::Validated | BatchStatus::PendingValidation
        )
    }

    /// 暂存完成后的状态
    pub fn after_staging(invalid_count: usize) -> BatchStatus {
        if invalid_count == 0 {
            BatchStatus::Validated
        } else {
            BatchStatus::PendingValidation
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 行校验状态 (Row Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Pending,
    Valid,
    Invalid,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "PENDING",
            RowStatus::Valid => "VALID",
            RowStatus::Invalid => "INVALID",
        }
    }

    pub fn parse(s: &str) -> Option<RowStatus> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(RowStatus::Pending),
            "VALID" => Some(RowStatus::Valid),
            "INVALID" => Some(RowStatus::Invalid),
            _ => None,
        }
    }

    /// 错误列表为空即有效
    pub fn from_errors(errors: &[String]) -> RowStatus {
        if errors.is_empty() {
            RowStatus::Valid
        } else {
            RowStatus::Invalid
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 科目方向 (Polarity)
// ==========================================
// CREDIT: 余额增加；DEBIT: 余额减少
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Credit,
    Debit,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Credit => "CREDIT",
            Polarity::Debit => "DEBIT",
        }
    }

    pub fn parse(s: &str) -> Option<Polarity> {
        match s.trim().to_uppercase().as_str() {
            "CREDIT" => Some(Polarity::Credit),
            "DEBIT" => Some(Polarity::Debit),
            _ => None,
        }
    }

    /// 带符号金额
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Polarity::Credit => amount,
            Polarity::Debit => -amount,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
