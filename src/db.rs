// ==========================================
// 合作社后台 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表（幂等），由组合根在启动时调用
// - 统一“可重试”错误判定（BUSY / LOCKED）
// ==========================================

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 共享存储句柄
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    configure_sqlite_connection_with_timeout(conn, DEFAULT_BUSY_TIMEOUT_MS)
}

pub fn configure_sqlite_connection_with_timeout(
    conn: &Connection,
    busy_timeout_ms: u64,
) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、确保表结构，并包装为共享句柄
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 判断是否为可重试的存储错误（数据库忙 / 被锁）
pub fn is_transient_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS import_batch (
            batch_id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            domain_kind TEXT NOT NULL
                CHECK(domain_kind IN ('MEMBER', 'LOAN', 'CONTRIBUTION', 'TRANSACTION')),
            total_rows INTEGER NOT NULL DEFAULT 0,
            valid_rows INTEGER NOT NULL DEFAULT 0,
            invalid_rows INTEGER NOT NULL DEFAULT 0,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL
                CHECK(status IN ('PENDING', 'VALIDATED', 'PENDING_VALIDATION', 'PROCESSED', 'REJECTED')),
            uploaded_by TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            approved_by TEXT,
            decided_at TEXT,
            rejection_reason TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_import_batch_kind_status ON import_batch(domain_kind, status);

        CREATE TABLE IF NOT EXISTS staged_row (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL REFERENCES import_batch(batch_id) ON DELETE CASCADE,
            row_number INTEGER NOT NULL,
            domain_kind TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            raw_json TEXT NOT NULL,
            validation_status TEXT NOT NULL
                CHECK(validation_status IN ('PENDING', 'VALID', 'INVALID')),
            errors_json TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_staged_row_batch ON staged_row(batch_id, validation_status);

        CREATE TABLE IF NOT EXISTS category (
            category_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            polarity TEXT NOT NULL CHECK(polarity IN ('CREDIT', 'DEBIT'))
        );

        CREATE TABLE IF NOT EXISTS member (
            member_no TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            id_number TEXT NOT NULL,
            phone TEXT NOT NULL,
            email TEXT,
            gender TEXT,
            join_date TEXT NOT NULL,
            source_batch_id TEXT NOT NULL,
            source_row_id INTEGER NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loan (
            loan_id TEXT PRIMARY KEY,
            member_no TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES category(category_id),
            principal INTEGER NOT NULL,   -- 分
            term_months INTEGER NOT NULL,
            interest_rate REAL NOT NULL,
            purpose TEXT,
            application_date TEXT NOT NULL,
            status TEXT NOT NULL,
            source_batch_id TEXT NOT NULL,
            source_row_id INTEGER NOT NULL UNIQUE,
            approved_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_loan_member ON loan(member_no);

        CREATE TABLE IF NOT EXISTS ledger_entry (
            entry_id TEXT PRIMARY KEY,
            account_ref TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES category(category_id),
            entry_date TEXT NOT NULL,
            amount INTEGER NOT NULL,      -- 分，恒为正
            effect TEXT NOT NULL CHECK(effect IN ('CREDIT', 'DEBIT')),
            status TEXT NOT NULL,
            reference TEXT,
            description TEXT,
            source_batch_id TEXT NOT NULL,
            source_row_id INTEGER NOT NULL UNIQUE,
            posted_by TEXT NOT NULL,
            posted_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_entry_batch ON ledger_entry(source_batch_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_entry_account ON ledger_entry(account_ref, category_id);

        CREATE TABLE IF NOT EXISTS balance (
            account_ref TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES category(category_id),
            amount INTEGER NOT NULL,      -- 分，带符号
            updated_at TEXT NOT NULL,
            PRIMARY KEY (account_ref, category_id)
        );

        CREATE TABLE IF NOT EXISTS action_log (
            action_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            detail_json TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_action_log_batch ON action_log(batch_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}
