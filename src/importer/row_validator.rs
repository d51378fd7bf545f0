// ==========================================
// 合作社后台 - 行校验器实现
// ==========================================
// 职责: 必填检查 → 类型/格式转换 → 取值范围/枚举检查
// 约束: 纯函数，不做 I/O；所有失败规则按列顺序累积为可读信息
// ==========================================

use crate::config::{ConfigResult, IngestConfigReader};
use crate::domain::batch::{RawRow, ValidatedRow};
use crate::domain::money::{has_money_scale, MONEY_SCALE};
use crate::domain::records::{
    ContributionRecord, LoanRecord, MemberRecord, StagedRecord, TransactionRecord,
};
use crate::domain::types::{DomainKind, RowStatus};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::importer_trait::RowValidator;
use crate::importer::schema::columns::*;
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// 允许的支付方式（规范写法）
pub const PAYMENT_METHODS: &[&str] = &["Cash", "Bank", "Mobile", "Cheque"];

/// 允许的性别取值（规范写法）
pub const GENDERS: &[&str] = &["Male", "Female", "Other"];

/// 利率上限（%）
const MAX_INTEREST_RATE: Decimal = Decimal::ONE_HUNDRED;

// ==========================================
// ValidationRules - 校验参数
// ==========================================
// 在校验开始前由配置构建一次
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRules {
    pub max_amount: Decimal,
    pub max_loan_term_months: i64,
    pub allow_future_dates: bool,
    pub today: NaiveDate,
}

impl ValidationRules {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            max_amount: Decimal::from(crate::config::defaults::MAX_AMOUNT),
            max_loan_term_months: crate::config::defaults::MAX_LOAN_TERM_MONTHS,
            allow_future_dates: crate::config::defaults::ALLOW_FUTURE_DATES,
            today,
        }
    }

    /// 从配置读取校验参数
    pub async fn from_config<C>(config: &C, today: NaiveDate) -> ConfigResult<Self>
    where
        C: IngestConfigReader + ?Sized,
    {
        Ok(Self {
            max_amount: config.get_max_amount().await?,
            max_loan_term_months: config.get_max_loan_term_months().await?,
            allow_future_dates: config.get_allow_future_dates().await?,
            today,
        })
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

// ==========================================
// FieldReader - 字段读取与错误累积
// ==========================================
struct FieldReader<'a> {
    row: &'a RawRow,
    rules: &'a ValidationRules,
    cleaner: DataCleaner,
    errors: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(row: &'a RawRow, rules: &'a ValidationRules) -> Self {
        Self {
            row,
            rules,
            cleaner: DataCleaner,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, column: &str, message: String) {
        self.errors.push(format!("{}: {}", column, message));
    }

    fn text(&mut self, column: &str, required: bool) -> Option<String> {
        let value = self.cleaner.normalize_null(self.row.text(column));
        if value.is_none() && required {
            self.fail(column, "必填字段为空".to_string());
        }
        value
    }

    fn amount(&mut self, column: &str) -> Option<Decimal> {
        let raw = self.text(column, true)?;
        let Some(value) = self.cleaner.parse_decimal(&raw) else {
            self.fail(column, format!("金额格式无效 '{}'（应为数字）", raw));
            return None;
        };
        if value <= Decimal::ZERO {
            self.fail(column, format!("金额必须大于 0（实际 {}）", raw));
        } else if !has_money_scale(value) {
            self.fail(
                column,
                format!("金额最多 {} 位小数（实际 {}）", MONEY_SCALE, raw),
            );
        } else if value > self.rules.max_amount {
            self.fail(
                column,
                format!("金额超过上限 {}（实际 {}）", self.rules.max_amount, raw),
            );
        }
        Some(value)
    }

    fn date(&mut self, column: &str, required: bool) -> Option<NaiveDate> {
        let raw = self.text(column, required)?;
        let Some(date) = self.cleaner.parse_date(&raw) else {
            self.fail(
                column,
                format!("日期格式无效 '{}'（应为 YYYY-MM-DD）", raw),
            );
            return None;
        };
        if !self.rules.allow_future_dates && date > self.rules.today {
            self.fail(
                column,
                format!("日期 {} 晚于当前日期 {}", date, self.rules.today),
            );
        }
        Some(date)
    }

    fn integer_in_range(&mut self, column: &str, min: i64, max: i64) -> Option<i64> {
        let raw = self.text(column, true)?;
        let Some(value) = self.cleaner.parse_integer(&raw) else {
            self.fail(column, format!("必须为整数（实际 '{}'）", raw));
            return None;
        };
        if value < min || value > max {
            self.fail(column, format!("取值 {} 超出范围 [{}, {}]", value, min, max));
        }
        Some(value)
    }

    fn rate_in_range(&mut self, column: &str, min: Decimal, max: Decimal) -> Option<f64> {
        let raw = self.text(column, true)?;
        let Some(value) = self.cleaner.parse_decimal(&raw) else {
            self.fail(column, format!("数值格式无效 '{}'", raw));
            return None;
        };
        if value < min || value > max {
            self.fail(column, format!("取值 {} 超出范围 [{}, {}]", raw, min, max));
        }
        value.to_f64()
    }

    /// 枚举字段：匹配成功返回规范写法，否则保留原值并记错
    fn enum_value(
        &mut self,
        column: &str,
        allowed: &[&'static str],
        required: bool,
    ) -> Option<String> {
        let raw = self.text(column, required)?;
        match self.cleaner.match_enum(&raw, allowed) {
            Some(canonical) => Some(canonical.to_string()),
            None => {
                self.fail(
                    column,
                    format!("取值无效 '{}'（允许: {}）", raw, allowed.join(", ")),
                );
                Some(raw)
            }
        }
    }

    fn phone(&mut self, column: &str) -> Option<String> {
        let raw = self.text(column, true)?;
        match self.cleaner.normalize_phone(&raw) {
            Some(phone) => Some(phone),
            None => {
                self.fail(
                    column,
                    format!("电话号码格式无效 '{}'（应为 7-15 位数字）", raw),
                );
                Some(raw)
            }
        }
    }

    fn email(&mut self, column: &str) -> Option<String> {
        let raw = self.text(column, false)?;
        if !self.cleaner.is_valid_email(&raw) {
            self.fail(column, format!("邮箱格式无效 '{}'", raw));
        }
        Some(raw)
    }

    fn finish(self, record: StagedRecord) -> ValidatedRow {
        let status = RowStatus::from_errors(&self.errors);
        ValidatedRow {
            row_number: self.row.row_number,
            record,
            status,
            errors: self.errors,
            raw: self.row.clone(),
        }
    }
}

// ==========================================
// MemberRowValidator - 会员登记
// ==========================================
pub struct MemberRowValidator;

impl RowValidator for MemberRowValidator {
    fn kind(&self) -> DomainKind {
        DomainKind::Member
    }

    fn validate(&self, row: &RawRow, rules: &ValidationRules) -> ValidatedRow {
        let mut f = FieldReader::new(row, rules);
        let record = MemberRecord {
            member_no: f.text(MEMBER_NO, true),
            first_name: f.text(FIRST_NAME, true),
            last_name: f.text(LAST_NAME, true),
            id_number: f.text(ID_NUMBER, true),
            phone: f.phone(PHONE),
            join_date: f.date(JOIN_DATE, true),
            email: f.email(EMAIL),
            gender: f.enum_value(GENDER, GENDERS, false),
        };
        f.finish(StagedRecord::Member(record))
    }
}

// ==========================================
// LoanRowValidator - 贷款申请
// ==========================================
pub struct LoanRowValidator;

impl RowValidator for LoanRowValidator {
    fn kind(&self) -> DomainKind {
        DomainKind::Loan
    }

    fn validate(&self, row: &RawRow, rules: &ValidationRules) -> ValidatedRow {
        let mut f = FieldReader::new(row, rules);
        let record = LoanRecord {
            member_no: f.text(MEMBER_NO, true),
            loan_type: f.text(LOAN_TYPE, true),
            amount: f.amount(AMOUNT),
            term_months: f.integer_in_range(TERM_MONTHS, 1, rules.max_loan_term_months),
            interest_rate: f.rate_in_range(INTEREST_RATE, Decimal::ZERO, MAX_INTEREST_RATE),
            application_date: f.date(APPLICATION_DATE, true),
            id_number: f.text(ID_NUMBER, false),
            purpose: f.text(PURPOSE, false),
        };
        f.finish(StagedRecord::Loan(record))
    }
}

// ==========================================
// ContributionRowValidator - 缴存
// ==========================================
pub struct ContributionRowValidator;

impl RowValidator for ContributionRowValidator {
    fn kind(&self) -> DomainKind {
        DomainKind::Contribution
    }

    fn validate(&self, row: &RawRow, rules: &ValidationRules) -> ValidatedRow {
        let mut f = FieldReader::new(row, rules);
        let record = ContributionRecord {
            member_no: f.text(MEMBER_NO, true),
            contribution_type: f.text(CONTRIBUTION_TYPE, true),
            amount: f.amount(AMOUNT),
            contribution_date: f.date(CONTRIBUTION_DATE, true),
            payment_method: f.enum_value(PAYMENT_METHOD, PAYMENT_METHODS, false),
            reference: f.text(REFERENCE, false),
        };
        f.finish(StagedRecord::Contribution(record))
    }
}

// ==========================================
// TransactionRowValidator - 通用交易
// ==========================================
pub struct TransactionRowValidator;

impl RowValidator for TransactionRowValidator {
    fn kind(&self) -> DomainKind {
        DomainKind::Transaction
    }

    fn validate(&self, row: &RawRow, rules: &ValidationRules) -> ValidatedRow {
        let mut f = FieldReader::new(row, rules);
        let record = TransactionRecord {
            member_no: f.text(MEMBER_NO, true),
            transaction_type: f.text(TRANSACTION_TYPE, true),
            amount: f.amount(AMOUNT),
            transaction_date: f.date(TRANSACTION_DATE, true),
            payment_method: f.enum_value(PAYMENT_METHOD, PAYMENT_METHODS, false),
            reference: f.text(REFERENCE, false),
            description: f.text(DESCRIPTION, false),
        };
        f.finish(StagedRecord::Transaction(record))
    }
}

/// 按业务域选择校验器
pub fn validator_for(kind: DomainKind) -> &'static dyn RowValidator {
    match kind {
        DomainKind::Member => &MemberRowValidator,
        DomainKind::Loan => &LoanRowValidator,
        DomainKind::Contribution => &ContributionRowValidator,
        DomainKind::Transaction => &TransactionRowValidator,
    }
}
