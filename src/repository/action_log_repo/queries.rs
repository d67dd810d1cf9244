use super::core::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::time_fmt::parse_ts;
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};

const SELECT_COLUMNS: &str = r#"
    SELECT action_id, proposal_id, action_type, action_ts, actor, payload_json, detail
    FROM action_log
"#;

struct ActionLogRow {
    action_id: String,
    proposal_id: Option<String>,
    action_type: String,
    action_ts: String,
    actor: String,
    payload_json: Option<String>,
    detail: Option<String>,
}

impl ActionLogRow {
    fn read(row: &Row<'_>) -> SqliteResult<Self> {
        Ok(Self {
            action_id: row.get(0)?,
            proposal_id: row.get(1)?,
            action_type: row.get(2)?,
            action_ts: row.get(3)?,
            actor: row.get(4)?,
            payload_json: row.get(5)?,
            detail: row.get(6)?,
        })
    }

    fn into_domain(self) -> RepositoryResult<ActionLog> {
        let action_type = ActionType::parse(&self.action_type).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "action_log.action_type".to_string(),
                message: format!("未知操作类型: {}", self.action_type),
            }
        })?;

        Ok(ActionLog {
            action_id: self.action_id,
            proposal_id: self.proposal_id,
            action_type,
            action_ts: parse_ts("action_log.action_ts", &self.action_ts)?,
            actor: self.actor,
            payload_json: self
                .payload_json
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
            detail: self.detail,
        })
    }
}

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;

        let row = conn
            .query_row(
                &format!("{} WHERE action_id = ?1", SELECT_COLUMNS),
                params![action_id],
                ActionLogRow::read,
            )
            .optional()?;

        row.map(ActionLogRow::into_domain).transpose()
    }

    /// 查询指定提案的全部日志（按时间正序，便于还原生命周期）
    pub fn list_by_proposal(&self, proposal_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE proposal_id = ?1 ORDER BY action_ts ASC, rowid ASC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![proposal_id], ActionLogRow::read)?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter().map(ActionLogRow::into_domain).collect()
    }

    /// 查询指定操作类型的日志
    pub fn list_by_action_type(
        &self,
        action_type: ActionType,
        limit: i64,
    ) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE action_type = ?1 ORDER BY action_ts DESC, rowid DESC LIMIT ?2",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![action_type.as_str(), limit], ActionLogRow::read)?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter().map(ActionLogRow::into_domain).collect()
    }

    /// 查询最近的 N 条日志
    pub fn list_recent(&self, limit: i64) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY action_ts DESC, rowid DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit], ActionLogRow::read)?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter().map(ActionLogRow::into_domain).collect()
    }
}
