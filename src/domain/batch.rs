// ==========================================
// 合作社后台 - 批次与暂存行
// ==========================================
// 批次: 一次上传 = 一个批次头 + N 条暂存行
// 暂存行归属于批次，批次进入终态后删除
// ==========================================

use crate::domain::records::StagedRecord;
use crate::domain::types::{BatchStatus, DomainKind, RowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// RawValue - 原始单元格值
// ==========================================
// 日期单元格在解析阶段已规范为 YYYY-MM-DD 文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Empty,
}

impl RawValue {
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
        }
    }

    /// 规范文本形式（整数值的浮点数不带小数部分）
    pub fn to_text(&self) -> Option<String> {
        match self {
            RawValue::Empty => None,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            RawValue::Number(n) => Some(format_number(*n)),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text().unwrap_or_default())
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ==========================================
// RawRow - 原始数据行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub row_number: usize, // 表格行号（表头为第 1 行）
    pub cells: BTreeMap<String, RawValue>,
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: RawValue) -> Self {
        self.cells.insert(column.to_string(), value);
        self
    }

    pub fn get(&self, column: &str) -> &RawValue {
        self.cells.get(column).unwrap_or(&RawValue::Empty)
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).to_text()
    }
}

// ==========================================
// ValidatedRow - 校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRow {
    pub row_number: usize,
    pub record: StagedRecord,
    pub status: RowStatus,
    pub errors: Vec<String>,
    pub raw: RawRow,
}

impl ValidatedRow {
    /// 追加批次级错误（如重复编号），状态随之变为 Invalid
    pub fn push_error(&mut self, message: String) {
        self.errors.push(message);
        self.status = RowStatus::Invalid;
    }
}

// ==========================================
// NewBatch - 新批次元信息
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub batch_id: String,
    pub file_name: String,
    pub domain_kind: DomainKind,
    pub total_rows: usize,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

// ==========================================
// Batch - 导入批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,                     // 批次 ID（UUID）
    pub file_name: String,                    // 源文件名
    pub domain_kind: DomainKind,              // 业务域
    pub total_rows: usize,                    // 总行数
    pub valid_rows: usize,                    // 有效行数
    pub invalid_rows: usize,                  // 无效行数
    pub processed_rows: usize,                // 审批入账行数
    pub status: BatchStatus,                  // 生命周期状态
    pub uploaded_by: String,                  // 上传人
    pub uploaded_at: DateTime<Utc>,           // 上传时间
    pub approved_by: Option<String>,          // 审批/驳回人
    pub decided_at: Option<DateTime<Utc>>,    // 审批/驳回时间
    pub rejection_reason: Option<String>,     // 驳回原因
}

// ==========================================
// StagedRow - 暂存行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    pub row_id: i64,
    pub batch_id: String,
    pub row_number: usize,
    pub record: StagedRecord,
    pub status: RowStatus,
    pub errors: Vec<String>,
    pub raw: RawRow,
}

// ==========================================
// PendingRow - 待审核行（附带批次状态）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRow {
    #[serde(flatten)]
    pub row: StagedRow,
    pub batch_status: BatchStatus,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}
