// ==========================================
// 捐赠物资分配引擎 - 分配提案数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 状态迁移一律带“期望当前状态”条件，防止重复确认
// ==========================================

use crate::domain::proposal::AllocationProposal;
use crate::domain::types::ProposalStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::time_fmt::{format_ts, parse_ts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT proposal_id, status, plan_json, snapshot_json, config_snapshot_json,
           created_by, created_at, expires_at, decided_by, decided_at, failure_reason
    FROM allocation_proposal
"#;

struct ProposalRow {
    proposal_id: String,
    status: String,
    plan_json: String,
    snapshot_json: String,
    config_snapshot_json: Option<String>,
    created_by: String,
    created_at: String,
    expires_at: String,
    decided_by: Option<String>,
    decided_at: Option<String>,
    failure_reason: Option<String>,
}

impl ProposalRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            proposal_id: row.get(0)?,
            status: row.get(1)?,
            plan_json: row.get(2)?,
            snapshot_json: row.get(3)?,
            config_snapshot_json: row.get(4)?,
            created_by: row.get(5)?,
            created_at: row.get(6)?,
            expires_at: row.get(7)?,
            decided_by: row.get(8)?,
            decided_at: row.get(9)?,
            failure_reason: row.get(10)?,
        })
    }

    fn into_domain(self) -> RepositoryResult<AllocationProposal> {
        let status = self
            .status
            .parse::<ProposalStatus>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "allocation_proposal.status".to_string(),
                message,
            })?;

        Ok(AllocationProposal {
            proposal_id: self.proposal_id,
            status,
            plan: serde_json::from_str(&self.plan_json)?,
            snapshot: serde_json::from_str(&self.snapshot_json)?,
            config_snapshot_json: self.config_snapshot_json,
            created_by: self.created_by,
            created_at: parse_ts("allocation_proposal.created_at", &self.created_at)?,
            expires_at: parse_ts("allocation_proposal.expires_at", &self.expires_at)?,
            decided_by: self.decided_by,
            decided_at: self
                .decided_at
                .as_deref()
                .map(|raw| parse_ts("allocation_proposal.decided_at", raw))
                .transpose()?,
            failure_reason: self.failure_reason,
        })
    }
}

// ==========================================
// AllocationProposalRepository - 分配提案仓储
// ==========================================
pub struct AllocationProposalRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllocationProposalRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入提案
    pub fn insert(&self, proposal: &AllocationProposal) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO allocation_proposal (
              proposal_id, status, plan_json, snapshot_json, config_snapshot_json,
              created_by, created_at, expires_at, decided_by, decided_at, failure_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                proposal.proposal_id,
                proposal.status.as_str(),
                serde_json::to_string(&proposal.plan)?,
                serde_json::to_string(&proposal.snapshot)?,
                proposal.config_snapshot_json,
                proposal.created_by,
                format_ts(&proposal.created_at),
                format_ts(&proposal.expires_at),
                proposal.decided_by,
                proposal.decided_at.as_ref().map(format_ts),
                proposal.failure_reason,
            ],
        )?;

        Ok(())
    }

    /// 按 proposal_id 查询
    pub fn find_by_id(&self, proposal_id: &str) -> RepositoryResult<Option<AllocationProposal>> {
        let conn = self.get_conn()?;

        let row = conn
            .query_row(
                &format!("{} WHERE proposal_id = ?1", SELECT_COLUMNS),
                params![proposal_id],
                ProposalRow::read,
            )
            .optional()?;

        row.map(ProposalRow::into_domain).transpose()
    }

    /// 查询提案列表（按创建时间倒序）
    ///
    /// # 参数
    /// - `status`: None 表示全部
    pub fn list(&self, status: Option<ProposalStatus>) -> RepositoryResult<Vec<AllocationProposal>> {
        let conn = self.get_conn()?;

        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE status = ?1 ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], ProposalRow::read)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_COLUMNS))?;
                let rows = stmt
                    .query_map([], ProposalRow::read)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        rows.into_iter().map(ProposalRow::into_domain).collect()
    }

    /// 将 PROPOSED 提案迁移到终态（DECLINED / EXPIRED / FAILED）
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: 提案不存在
    /// - `RepositoryError::StaleState`: 提案已不是 PROPOSED
    pub fn close(
        &self,
        proposal_id: &str,
        to: ProposalStatus,
        decided_by: &str,
        decided_at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            r#"UPDATE allocation_proposal
               SET status = ?2, decided_by = ?3, decided_at = ?4, failure_reason = ?5
               WHERE proposal_id = ?1 AND status = 'PROPOSED'"#,
            params![
                proposal_id,
                to.as_str(),
                decided_by,
                format_ts(&decided_at),
                reason,
            ],
        )?;

        if affected == 0 {
            let actual: Option<String> = conn
                .query_row(
                    "SELECT status FROM allocation_proposal WHERE proposal_id = ?1",
                    params![proposal_id],
                    |row| row.get(0),
                )
                .optional()?;

            return Err(match actual {
                Some(actual) => RepositoryError::StaleState {
                    entity: "AllocationProposal".to_string(),
                    id: proposal_id.to_string(),
                    expected: ProposalStatus::Proposed.as_str().to_string(),
                    actual,
                },
                None => RepositoryError::NotFound {
                    entity: "AllocationProposal".to_string(),
                    id: proposal_id.to_string(),
                },
            });
        }

        Ok(())
    }

    /// 将已过期的 PROPOSED 提案批量置为 EXPIRED
    ///
    /// # 返回
    /// - 被过期的 proposal_id 列表
    pub fn expire_before(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now_str = format_ts(&now);

        let ids = {
            let mut stmt = tx.prepare(
                "SELECT proposal_id FROM allocation_proposal WHERE status = 'PROPOSED' AND expires_at <= ?1",
            )?;
            let ids = stmt
                .query_map(params![now_str], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        tx.execute(
            r#"UPDATE allocation_proposal
               SET status = 'EXPIRED', decided_by = 'system', decided_at = ?1,
                   failure_reason = '提案超时未确认'
               WHERE status = 'PROPOSED' AND expires_at <= ?1"#,
            params![now_str],
        )?;

        tx.commit()?;
        Ok(ids)
    }
}
