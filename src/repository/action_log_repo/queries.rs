use super::core::ActionLogRepository;
use crate::domain::ledger::ActionLog;
use crate::repository::error::RepositoryResult;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;
        let log = conn
            .query_row(
                r#"
                SELECT action_id, batch_id, action_type, actor, action_ts, detail_json
                FROM action_log
                WHERE action_id = ?1
                "#,
                params![action_id],
                map_action_log_row,
            )
            .optional()?;
        Ok(log)
    }

    /// 查询批次的全部操作日志（按时间升序）
    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, batch_id, action_type, actor, action_ts, detail_json
            FROM action_log
            WHERE batch_id = ?1
            ORDER BY action_ts ASC, rowid ASC
            "#,
        )?;
        let logs = stmt
            .query_map(params![batch_id], map_action_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 查询最近的操作日志
    pub fn find_recent(&self, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, batch_id, action_type, actor, action_ts, detail_json
            FROM action_log
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;
        let logs = stmt
            .query_map(params![limit as i64], map_action_log_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }
}

fn map_action_log_row(row: &Row) -> SqliteResult<ActionLog> {
    let ts: String = row.get(4)?;
    let action_ts = DateTime::parse_from_rfc3339(&ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(ActionLog {
        action_id: row.get(0)?,
        batch_id: row.get(1)?,
        action_type: row.get(2)?,
        actor: row.get(3)?,
        action_ts,
        detail_json: row.get(5)?,
    })
}
