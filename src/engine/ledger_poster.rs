// ==========================================
// 合作社后台 - 入账引擎
// ==========================================
// 职责: 科目批量解析 + 单行入账（流水 + 余额增减 / 会员档案 / 贷款账户）
// 红线: 只在调用方事务内执行；余额只做原子增量
// 红线: 只处理仍在暂存区的行（暂存行删除即去重）
// ==========================================

use crate::domain::batch::StagedRow;
use crate::domain::ledger::{
    Category, LedgerEntry, LoanAccount, Member, LEDGER_STATUS_POSTED, LOAN_STATUS_ACTIVE,
};
use crate::domain::records::StagedRecord;
use crate::engine::error::{LifecycleError, LifecycleResult};
use crate::repository::LedgerRepository;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

/// 本次入账的公共上下文
#[derive(Debug, Clone)]
pub struct PostingContext {
    pub batch_id: String,
    pub posted_by: String,
    pub posted_at: DateTime<Utc>,
}

/// 单行入账结果
#[derive(Debug, Clone, PartialEq)]
pub enum PostingOutcome {
    /// 生成了一条流水（贷款行另有贷款账户）
    Entry { entry_id: String, signed_amount: Decimal },
    /// 会员登记（无流水、无余额变化）
    MemberRegistered { member_no: String },
}

// 待写入的流水要素
struct EntryDraft<'a> {
    account_ref: &'a str,
    entry_date: NaiveDate,
    amount: Decimal,
    reference: Option<String>,
    description: Option<String>,
}

pub struct LedgerPoster;

impl LedgerPoster {
    /// 一次查询解析批次内全部不同科目名称
    ///
    /// # 错误
    /// - UnresolvedCategory: 列出全部未匹配的名称（批次级致命错误）
    pub fn resolve_categories(
        conn: &Connection,
        rows: &[StagedRow],
    ) -> LifecycleResult<HashMap<String, Category>> {
        let names: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| row.record.category_name())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let names: Vec<String> = names.into_iter().collect();
        let resolved = LedgerRepository::resolve_categories_tx(conn, &names)?;

        let unresolved: Vec<String> = names
            .iter()
            .filter(|name| !resolved.contains_key(*name))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(LifecycleError::UnresolvedCategory { names: unresolved });
        }

        debug!(categories = resolved.len(), "科目解析完成");
        Ok(resolved)
    }

    /// 会员登记行：在审批事务内复查会员编号是否已被其他批次登记
    ///
    /// # 错误
    /// - MemberAlreadyRegistered: 列出全部已登记的编号（批次级致命错误）
    pub fn check_member_numbers(conn: &Connection, rows: &[StagedRow]) -> LifecycleResult<()> {
        let member_nos: Vec<String> = rows
            .iter()
            .filter_map(|row| match &row.record {
                StagedRecord::Member(r) => r.member_no.clone(),
                _ => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if member_nos.is_empty() {
            return Ok(());
        }

        let existing = LedgerRepository::existing_member_numbers_tx(conn, &member_nos)?;
        if existing.is_empty() {
            return Ok(());
        }
        let mut member_nos: Vec<String> = existing.into_iter().collect();
        member_nos.sort();
        Err(LifecycleError::MemberAlreadyRegistered { member_nos })
    }

    /// 入账一行有效暂存记录
    pub fn post_row(
        conn: &Connection,
        row: &StagedRow,
        categories: &HashMap<String, Category>,
        ctx: &PostingContext,
    ) -> LifecycleResult<PostingOutcome> {
        match &row.record {
            StagedRecord::Member(r) => {
                let member = Member {
                    member_no: require(row, &r.member_no, "member_no")?,
                    first_name: require(row, &r.first_name, "first_name")?,
                    last_name: require(row, &r.last_name, "last_name")?,
                    id_number: require(row, &r.id_number, "id_number")?,
                    phone: require(row, &r.phone, "phone")?,
                    email: r.email.clone(),
                    gender: r.gender.clone(),
                    join_date: require(row, &r.join_date, "join_date")?,
                    source_batch_id: ctx.batch_id.clone(),
                    source_row_id: row.row_id,
                    created_at: ctx.posted_at,
                };
                LedgerRepository::insert_member_tx(conn, &member)?;
                Ok(PostingOutcome::MemberRegistered {
                    member_no: member.member_no,
                })
            }
            StagedRecord::Loan(r) => {
                let category = lookup(row, categories, &r.loan_type, "loan_type")?;
                let member_no = require(row, &r.member_no, "member_no")?;
                let principal = require(row, &r.amount, "amount")?;
                let application_date = require(row, &r.application_date, "application_date")?;

                let loan = LoanAccount {
                    loan_id: Uuid::new_v4().to_string(),
                    member_no: member_no.clone(),
                    category_id: category.category_id,
                    principal,
                    term_months: require(row, &r.term_months, "term_months")?,
                    interest_rate: require(row, &r.interest_rate, "interest_rate")?,
                    purpose: r.purpose.clone(),
                    application_date,
                    status: LOAN_STATUS_ACTIVE.to_string(),
                    source_batch_id: ctx.batch_id.clone(),
                    source_row_id: row.row_id,
                    approved_by: ctx.posted_by.clone(),
                    created_at: ctx.posted_at,
                };
                LedgerRepository::insert_loan_tx(conn, &loan)?;

                Self::post_entry(
                    conn,
                    row,
                    category,
                    EntryDraft {
                        account_ref: &member_no,
                        entry_date: application_date,
                        amount: principal,
                        reference: Some(loan.loan_id.clone()),
                        description: r.purpose.clone(),
                    },
                    ctx,
                )
            }
            StagedRecord::Contribution(r) => {
                let category =
                    lookup(row, categories, &r.contribution_type, "contribution_type")?;
                let member_no = require(row, &r.member_no, "member_no")?;
                Self::post_entry(
                    conn,
                    row,
                    category,
                    EntryDraft {
                        account_ref: &member_no,
                        entry_date: require(row, &r.contribution_date, "contribution_date")?,
                        amount: require(row, &r.amount, "amount")?,
                        reference: r.reference.clone(),
                        description: r.payment_method.clone(),
                    },
                    ctx,
                )
            }
            StagedRecord::Transaction(r) => {
                let category = lookup(row, categories, &r.transaction_type, "transaction_type")?;
                let member_no = require(row, &r.member_no, "member_no")?;
                Self::post_entry(
                    conn,
                    row,
                    category,
                    EntryDraft {
                        account_ref: &member_no,
                        entry_date: require(row, &r.transaction_date, "transaction_date")?,
                        amount: require(row, &r.amount, "amount")?,
                        reference: r.reference.clone(),
                        description: r.description.clone(),
                    },
                    ctx,
                )
            }
        }
    }

    /// 写一条流水并做一次余额增减（signed = +amount 贷方 / -amount 借方）
    fn post_entry(
        conn: &Connection,
        row: &StagedRow,
        category: &Category,
        draft: EntryDraft<'_>,
        ctx: &PostingContext,
    ) -> LifecycleResult<PostingOutcome> {
        let entry = LedgerEntry {
            entry_id: Uuid::new_v4().to_string(),
            account_ref: draft.account_ref.to_string(),
            category_id: category.category_id,
            entry_date: draft.entry_date,
            amount: draft.amount,
            effect: category.polarity,
            status: LEDGER_STATUS_POSTED.to_string(),
            reference: draft.reference,
            description: draft.description,
            source_batch_id: ctx.batch_id.clone(),
            source_row_id: row.row_id,
            posted_by: ctx.posted_by.clone(),
            posted_at: ctx.posted_at,
        };
        let signed_amount = entry.signed_amount();

        LedgerRepository::insert_ledger_entry_tx(conn, &entry)?;
        LedgerRepository::apply_balance_delta_tx(
            conn,
            &entry.account_ref,
            entry.category_id,
            signed_amount,
            ctx.posted_at,
        )?;

        Ok(PostingOutcome::Entry {
            entry_id: entry.entry_id,
            signed_amount,
        })
    }
}

fn require<T: Clone>(row: &StagedRow, value: &Option<T>, field: &'static str) -> LifecycleResult<T> {
    value.clone().ok_or(LifecycleError::IncompleteRow {
        row_id: row.row_id,
        field,
    })
}

fn lookup<'a>(
    row: &StagedRow,
    categories: &'a HashMap<String, Category>,
    name: &Option<String>,
    field: &'static str,
) -> LifecycleResult<&'a Category> {
    let name = require(row, name, field)?;
    let name = name.trim();
    categories
        .get(name)
        .ok_or_else(|| LifecycleError::UnresolvedCategory {
            names: vec![name.to_string()],
        })
}
