// ==========================================
// 合作社后台 - 账务仓储
// ==========================================
// 职责: 科目查询、流水写入、余额原子增减、会员/贷款档案落库
// 红线: 余额只做原子增量（INSERT ... ON CONFLICT DO UPDATE amount = amount + ?），
//       不做应用层“先读后写”
// 金额列均为最小货币单位（分）的 INTEGER
// ==========================================

use crate::domain::ledger::{Category, LedgerEntry, LoanAccount, Member};
use crate::domain::money::{from_minor_units, to_minor_units};
use crate::domain::types::Polarity;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// IN 列表分片大小（低于 SQLite 默认变量上限）
const IN_CHUNK_SIZE: usize = 500;

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn minor_units(field: &str, amount: Decimal) -> RepositoryResult<i64> {
    to_minor_units(amount).ok_or_else(|| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("金额无法按分存储: {}", amount),
    })
}

// ==========================================
// LedgerRepository
// ==========================================
pub struct LedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 按名称批量查询科目（一次查询覆盖全部不同名称）
    ///
    /// 返回: 名称 → 科目；未命中的名称不在结果中
    pub fn resolve_categories_tx(
        conn: &Connection,
        names: &[String],
    ) -> RepositoryResult<HashMap<String, Category>> {
        let mut resolved = HashMap::new();
        for chunk in names.chunks(IN_CHUNK_SIZE) {
            let sql = format!(
                "SELECT category_id, name, polarity FROM category WHERE name IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let categories = stmt
                .query_map(params_from_iter(chunk.iter()), map_category_row)?
                .collect::<Result<Vec<_>, _>>()?;
            for category in categories {
                resolved.insert(category.name.clone(), category);
            }
        }
        Ok(resolved)
    }

    /// 写入一条账务流水
    pub fn insert_ledger_entry_tx(conn: &Connection, entry: &LedgerEntry) -> RepositoryResult<()> {
        let amount = minor_units("amount", entry.amount)?;
        conn.execute(
            r#"
            INSERT INTO ledger_entry (
                entry_id, account_ref, category_id, entry_date, amount, effect, status,
                reference, description, source_batch_id, source_row_id, posted_by, posted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                entry.entry_id,
                entry.account_ref,
                entry.category_id,
                entry.entry_date.format("%Y-%m-%d").to_string(),
                amount,
                entry.effect.as_str(),
                entry.status,
                entry.reference,
                entry.description,
                entry.source_batch_id,
                entry.source_row_id,
                entry.posted_by,
                entry.posted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 余额原子增减：不存在则以 delta 初始化，存在则 amount = amount + delta
    pub fn apply_balance_delta_tx(
        conn: &Connection,
        account_ref: &str,
        category_id: i64,
        delta: Decimal,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let delta = minor_units("amount", delta)?;
        conn.execute(
            r#"
            INSERT INTO balance (account_ref, category_id, amount, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(account_ref, category_id) DO UPDATE SET
                amount = amount + excluded.amount,
                updated_at = excluded.updated_at
            "#,
            params![account_ref, category_id, delta, updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// 写入会员档案
    pub fn insert_member_tx(conn: &Connection, member: &Member) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO member (
                member_no, first_name, last_name, id_number, phone, email, gender,
                join_date, source_batch_id, source_row_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                member.member_no,
                member.first_name,
                member.last_name,
                member.id_number,
                member.phone,
                member.email,
                member.gender,
                member.join_date.format("%Y-%m-%d").to_string(),
                member.source_batch_id,
                member.source_row_id,
                member.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 写入贷款账户
    pub fn insert_loan_tx(conn: &Connection, loan: &LoanAccount) -> RepositoryResult<()> {
        let principal = minor_units("principal", loan.principal)?;
        conn.execute(
            r#"
            INSERT INTO loan (
                loan_id, member_no, category_id, principal, term_months, interest_rate,
                purpose, application_date, status, source_batch_id, source_row_id,
                approved_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                loan.loan_id,
                loan.member_no,
                loan.category_id,
                principal,
                loan.term_months,
                loan.interest_rate,
                loan.purpose,
                loan.application_date.format("%Y-%m-%d").to_string(),
                loan.status,
                loan.source_batch_id,
                loan.source_row_id,
                loan.approved_by,
                loan.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 查询已存在的会员编号
    pub fn existing_member_numbers_tx(
        conn: &Connection,
        member_nos: &[String],
    ) -> RepositoryResult<HashSet<String>> {
        let mut existing = HashSet::new();
        for chunk in member_nos.chunks(IN_CHUNK_SIZE) {
            let sql = format!(
                "SELECT member_no FROM member WHERE member_no IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let found = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            existing.extend(found);
        }
        Ok(existing)
    }

    // ==========================================
    // 参考数据维护 / 查询
    // ==========================================

    /// 确保科目存在（参考数据维护，不属于入账流水线）
    ///
    /// 已存在的同名科目保持原方向不变，返回其 ID
    pub fn ensure_category(&self, name: &str, polarity: Polarity) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO category (name, polarity) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            params![name.trim(), polarity.as_str()],
        )?;
        let id = conn.query_row(
            "SELECT category_id FROM category WHERE name = ?1",
            params![name.trim()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn list_categories(&self) -> RepositoryResult<Vec<Category>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT category_id, name, polarity FROM category ORDER BY name")?;
        let categories = stmt
            .query_map([], map_category_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn find_category_by_name(&self, name: &str) -> RepositoryResult<Option<Category>> {
        let conn = self.get_conn()?;
        let mut found = Self::resolve_categories_tx(&conn, &[name.to_string()])?;
        Ok(found.remove(name))
    }

    /// 查询余额（无记录返回 None）
    pub fn get_balance(
        &self,
        account_ref: &str,
        category_id: i64,
    ) -> RepositoryResult<Option<Decimal>> {
        let conn = self.get_conn()?;
        let minor: Option<i64> = conn
            .query_row(
                "SELECT amount FROM balance WHERE account_ref = ?1 AND category_id = ?2",
                params![account_ref, category_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(minor.map(from_minor_units))
    }

    pub fn list_entries_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<LedgerEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entry_id, account_ref, category_id, entry_date, amount, effect, status,
                   reference, description, source_batch_id, source_row_id, posted_by, posted_at
            FROM ledger_entry
            WHERE source_batch_id = ?1
            ORDER BY source_row_id
            "#,
        )?;
        let entries = stmt
            .query_map(params![batch_id], map_entry_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_entries(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ledger_entry", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn find_member(&self, member_no: &str) -> RepositoryResult<Option<Member>> {
        let conn = self.get_conn()?;
        let member = conn
            .query_row(
                r#"
                SELECT member_no, first_name, last_name, id_number, phone, email, gender,
                       join_date, source_batch_id, source_row_id, created_at
                FROM member WHERE member_no = ?1
                "#,
                params![member_no],
                map_member_row,
            )
            .optional()?;
        Ok(member)
    }

    pub fn list_loans_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<LoanAccount>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT loan_id, member_no, category_id, principal, term_months, interest_rate,
                   purpose, application_date, status, source_batch_id, source_row_id,
                   approved_by, created_at
            FROM loan
            WHERE source_batch_id = ?1
            ORDER BY source_row_id
            "#,
        )?;
        let loans = stmt
            .query_map(params![batch_id], map_loan_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(loans)
    }
}

// ==========================================
// 行映射
// ==========================================

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_polarity(idx: usize, raw: &str) -> rusqlite::Result<Polarity> {
    Polarity::parse(raw).ok_or_else(|| conversion_error(idx, format!("未知科目方向: {}", raw)))
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("日期格式错误 {}: {}", raw, e)))
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("时间格式错误 {}: {}", raw, e)))
}

fn map_category_row(row: &Row) -> rusqlite::Result<Category> {
    let polarity_raw: String = row.get(2)?;
    Ok(Category {
        category_id: row.get(0)?,
        name: row.get(1)?,
        polarity: parse_polarity(2, &polarity_raw)?,
    })
}

fn map_entry_row(row: &Row) -> rusqlite::Result<LedgerEntry> {
    let date_raw: String = row.get(3)?;
    let effect_raw: String = row.get(5)?;
    let posted_at_raw: String = row.get(12)?;
    Ok(LedgerEntry {
        entry_id: row.get(0)?,
        account_ref: row.get(1)?,
        category_id: row.get(2)?,
        entry_date: parse_date(3, &date_raw)?,
        amount: from_minor_units(row.get(4)?),
        effect: parse_polarity(5, &effect_raw)?,
        status: row.get(6)?,
        reference: row.get(7)?,
        description: row.get(8)?,
        source_batch_id: row.get(9)?,
        source_row_id: row.get(10)?,
        posted_by: row.get(11)?,
        posted_at: parse_ts(12, &posted_at_raw)?,
    })
}

fn map_member_row(row: &Row) -> rusqlite::Result<Member> {
    let join_date_raw: String = row.get(7)?;
    let created_at_raw: String = row.get(10)?;
    Ok(Member {
        member_no: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        id_number: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        gender: row.get(6)?,
        join_date: parse_date(7, &join_date_raw)?,
        source_batch_id: row.get(8)?,
        source_row_id: row.get(9)?,
        created_at: parse_ts(10, &created_at_raw)?,
    })
}

fn map_loan_row(row: &Row) -> rusqlite::Result<LoanAccount> {
    let application_date_raw: String = row.get(7)?;
    let created_at_raw: String = row.get(12)?;
    Ok(LoanAccount {
        loan_id: row.get(0)?,
        member_no: row.get(1)?,
        category_id: row.get(2)?,
        principal: from_minor_units(row.get(3)?),
        term_months: row.get(4)?,
        interest_rate: row.get(5)?,
        purpose: row.get(6)?,
        application_date: parse_date(7, &application_date_raw)?,
        status: row.get(8)?,
        source_batch_id: row.get(9)?,
        source_row_id: row.get(10)?,
        approved_by: row.get(11)?,
        created_at: parse_ts(12, &created_at_raw)?,
    })
}
