// ==========================================
// 合作社后台 - 上传列结构定义
// ==========================================
// 表头名称大小写敏感，按此顺序校验与报错
// ==========================================

use crate::domain::types::DomainKind;

/// 列值类型（决定解析阶段的单元格规范化方式）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub optional: bool,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub const fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            optional: false,
            kind,
        }
    }

    pub const fn optional(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            optional: true,
            kind,
        }
    }
}

pub mod columns {
    pub const MEMBER_NO: &str = "member_no";
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const ID_NUMBER: &str = "id_number";
    pub const PHONE: &str = "phone";
    pub const JOIN_DATE: &str = "join_date";
    pub const EMAIL: &str = "email";
    pub const GENDER: &str = "gender";

    pub const LOAN_TYPE: &str = "loan_type";
    pub const AMOUNT: &str = "amount";
    pub const TERM_MONTHS: &str = "term_months";
    pub const INTEREST_RATE: &str = "interest_rate";
    pub const APPLICATION_DATE: &str = "application_date";
    pub const PURPOSE: &str = "purpose";

    pub const CONTRIBUTION_TYPE: &str = "contribution_type";
    pub const CONTRIBUTION_DATE: &str = "contribution_date";
    pub const PAYMENT_METHOD: &str = "payment_method";
    pub const REFERENCE: &str = "reference";

    pub const TRANSACTION_TYPE: &str = "transaction_type";
    pub const TRANSACTION_DATE: &str = "transaction_date";
    pub const DESCRIPTION: &str = "description";
}

use columns::*;
use ColumnKind::{Date, Number, Text};

const MEMBER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::required(MEMBER_NO, Text),
    ColumnSpec::required(FIRST_NAME, Text),
    ColumnSpec::required(LAST_NAME, Text),
    ColumnSpec::required(ID_NUMBER, Text),
    ColumnSpec::required(PHONE, Text),
    ColumnSpec::required(JOIN_DATE, Date),
    ColumnSpec::optional(EMAIL, Text),
    ColumnSpec::optional(GENDER, Text),
];

const LOAN_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::required(MEMBER_NO, Text),
    ColumnSpec::required(LOAN_TYPE, Text),
    ColumnSpec::required(AMOUNT, Number),
    ColumnSpec::required(TERM_MONTHS, Number),
    ColumnSpec::required(INTEREST_RATE, Number),
    ColumnSpec::required(APPLICATION_DATE, Date),
    ColumnSpec::optional(ID_NUMBER, Text),
    ColumnSpec::optional(PURPOSE, Text),
];

const CONTRIBUTION_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::required(MEMBER_NO, Text),
    ColumnSpec::required(CONTRIBUTION_TYPE, Text),
    ColumnSpec::required(AMOUNT, Number),
    ColumnSpec::required(CONTRIBUTION_DATE, Date),
    ColumnSpec::optional(PAYMENT_METHOD, Text),
    ColumnSpec::optional(REFERENCE, Text),
];

const TRANSACTION_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::required(MEMBER_NO, Text),
    ColumnSpec::required(TRANSACTION_TYPE, Text),
    ColumnSpec::required(AMOUNT, Number),
    ColumnSpec::required(TRANSACTION_DATE, Date),
    ColumnSpec::optional(PAYMENT_METHOD, Text),
    ColumnSpec::optional(REFERENCE, Text),
    ColumnSpec::optional(DESCRIPTION, Text),
];

/// 业务域对应的列结构
pub fn schema_for(kind: DomainKind) -> &'static [ColumnSpec] {
    match kind {
        DomainKind::Member => MEMBER_COLUMNS,
        DomainKind::Loan => LOAN_COLUMNS,
        DomainKind::Contribution => CONTRIBUTION_COLUMNS,
        DomainKind::Transaction => TRANSACTION_COLUMNS,
    }
}

/// 模板表头（全部列名，按顺序）
pub fn header_names(kind: DomainKind) -> Vec<&'static str> {
    schema_for(kind).iter().map(|c| c.name).collect()
}
