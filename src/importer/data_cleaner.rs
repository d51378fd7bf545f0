// ==========================================
// 合作社后台 - 数据清洗器
// ==========================================
// 职责: TRIM / NULL 标准化 / 金额与日期解析 / 枚举规范化
// 约束: 纯函数，不做 I/O；失败返回 None，由校验器组织错误信息
// ==========================================

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Excel 序列日期纪元（1899-12-30 为序列号 0）
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// 序列号上限（9999-12-31）
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

/// 将 Excel 序列日期转换为日历日期（忽略时间部分）
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

pub struct DataCleaner;

impl DataCleaner {
    pub fn normalize_null(&self, value: Option<String>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    /// 解析金额/数值（允许千分位逗号，如 "1,200.50"），按十进制精确表示
    pub fn parse_decimal(&self, value: &str) -> Option<Decimal> {
        let cleaned: String = value
            .trim()
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        Decimal::from_str(&cleaned).ok()
    }

    /// 解析整数（"12" 与 "12.0" 均可）
    pub fn parse_integer(&self, value: &str) -> Option<i64> {
        let number = self.parse_decimal(value)?;
        if !number.fract().is_zero() {
            return None;
        }
        number.to_i64()
    }

    /// 解析日期
    ///
    /// 支持: YYYY-MM-DD / YYYY/MM/DD / DD/MM/YYYY / YYYYMMDD；
    /// 带时间部分的文本（"2025-01-20 08:30:00"、"2025-01-20T08:30:00"）取日期部分
    ///
    /// 文本形式的纯数字不按 Excel 序列号解释（数值单元格的序列号在解析阶段已转换）
    pub fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }

        let date_part = match trimmed.find(|c: char| c == ' ' || c == 'T') {
            Some(idx) if idx >= 8 => &trimmed[..idx],
            _ => trimmed,
        };

        for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(date_part, fmt) {
                return Some(date);
            }
        }

        if date_part.len() == 8 && date_part.chars().all(|c| c.is_ascii_digit()) {
            return NaiveDate::parse_from_str(date_part, "%Y%m%d").ok();
        }

        None
    }

    /// 枚举值匹配（大小写不敏感），返回规范写法
    pub fn match_enum(&self, value: &str, allowed: &[&'static str]) -> Option<&'static str> {
        let trimmed = value.trim();
        allowed
            .iter()
            .copied()
            .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    }

    /// 规范化电话号码：去掉空格、连字符与括号，要求 7-15 位数字，可带前导 '+'
    pub fn normalize_phone(&self, value: &str) -> Option<String> {
        let compact: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        let digits = compact.strip_prefix('+').unwrap_or(compact.as_str());
        let valid = (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
        if valid {
            Some(compact)
        } else {
            None
        }
    }

    /// 邮箱格式：包含 '@'，且 '@' 之后有 '.'
    pub fn is_valid_email(&self, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.contains(char::is_whitespace) {
            return false;
        }
        match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain
                        .find('.')
                        .map(|idx| idx > 0 && idx < domain.len() - 1)
                        .unwrap_or(false)
            }
            None => false,
        }
    }
}
