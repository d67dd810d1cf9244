use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::time_fmt::format_ts;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub(super) const INSERT_SQL: &str = r#"
    INSERT INTO action_log (
        action_id, proposal_id, action_type, action_ts, actor, payload_json, detail
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

// ==========================================
// ActionLogRepository - 操作日志仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    /// 创建新的操作日志仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入操作日志
    ///
    /// # 返回
    /// - `Ok(action_id)`: 成功插入,返回action_id
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            INSERT_SQL,
            params![
                log.action_id,
                log.proposal_id,
                log.action_type.as_str(),
                format_ts(&log.action_ts),
                log.actor,
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.detail,
            ],
        )?;

        Ok(log.action_id.clone())
    }

    /// 批量插入操作日志
    pub fn batch_insert(&self, logs: &[ActionLog]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for log in logs {
                stmt.execute(params![
                    log.action_id,
                    log.proposal_id,
                    log.action_type.as_str(),
                    format_ts(&log.action_ts),
                    log.actor,
                    log.payload_json.as_ref().map(|v| v.to_string()),
                    log.detail,
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }
}
