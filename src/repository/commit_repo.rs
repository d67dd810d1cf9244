// ==========================================
// 捐赠物资分配引擎 - 分配提交仓储
// ==========================================
// 红线: 一个 CommitBatch 在单一事务内写入，任一行失败整体回滚
// 并发: 每行写入都带 revision + 状态条件（乐观锁）
// ==========================================

use crate::domain::commit::{BagUpdate, CommitBatch, CommitReceipt, OrderUpdate};
use crate::domain::types::{BagStatus, OrderStatus, ProposalStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::time_fmt::{format_date, format_ts};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

// ==========================================
// AllocationCommitRepository - 分配提交仓储
// ==========================================
pub struct AllocationCommitRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllocationCommitRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 原子写入一个提交批次
    ///
    /// # 写入顺序
    /// 1. 捐赠袋: AVAILABLE 且无需清洗 且 revision 未变 -> new_status
    /// 2. 订单: PENDING 且未履约 且 revision 未变 -> new_status + pickup_date
    /// 3. order_fulfillment 明细
    /// 4. 关联提案 PROPOSED -> COMMITTED
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: 记录不存在
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配
    /// - `RepositoryError::StaleState`: 状态已不满足可分配条件
    ///
    /// 任一错误返回时事务未提交，drop 时自动回滚
    #[instrument(skip(self, batch), fields(
        proposal_id = ?batch.proposal_id,
        orders = batch.orders.len(),
        bags = batch.bags.len()
    ))]
    pub fn apply_batch(&self, batch: &CommitBatch) -> RepositoryResult<CommitReceipt> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let committed_at = format_ts(&batch.committed_at);

        for bag in &batch.bags {
            update_bag(&tx, bag, &committed_at)?;
        }

        for order in &batch.orders {
            update_order(&tx, order, &committed_at)?;
        }

        if let Some(proposal_id) = &batch.proposal_id {
            mark_proposal_committed(&tx, proposal_id, &batch.committed_by, &committed_at)?;
        }

        tx.commit()?;
        debug!("提交批次写入完成");

        Ok(CommitReceipt {
            proposal_id: batch.proposal_id.clone(),
            orders_updated: batch.orders.len(),
            bags_updated: batch.bags.len(),
            pickup_dates: batch
                .orders
                .iter()
                .map(|o| (o.order_id.clone(), o.pickup_date))
                .collect(),
            committed_at: batch.committed_at,
        })
    }
}

// ==========================================
// 事务内写入辅助函数
// ==========================================

fn update_bag(conn: &Connection, bag: &BagUpdate, now: &str) -> RepositoryResult<()> {
    let affected = conn.execute(
        r#"UPDATE donation_bag
           SET status = ?2, revision = revision + 1, updated_at = ?3
           WHERE bag_id = ?1
             AND status = 'AVAILABLE'
             AND needs_cleaning = 0
             AND revision = ?4"#,
        params![bag.bag_id, bag.new_status.as_str(), now, bag.expected_revision],
    )?;

    if affected == 1 {
        return Ok(());
    }

    // 区分: 不存在 / revision 冲突 / 状态不再可分配
    let current: Option<(i64, String, bool)> = conn
        .query_row(
            "SELECT revision, status, needs_cleaning FROM donation_bag WHERE bag_id = ?1",
            params![bag.bag_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0)),
        )
        .optional()?;

    Err(match current {
        None => RepositoryError::NotFound {
            entity: "DonationBag".to_string(),
            id: bag.bag_id.clone(),
        },
        Some((actual, _, _)) if actual != bag.expected_revision => {
            RepositoryError::OptimisticLockFailure {
                entity: "DonationBag".to_string(),
                id: bag.bag_id.clone(),
                expected: bag.expected_revision,
                actual,
            }
        }
        Some((_, status, needs_cleaning)) => RepositoryError::StaleState {
            entity: "DonationBag".to_string(),
            id: bag.bag_id.clone(),
            expected: format!("{} (needs_cleaning=false)", BagStatus::Available),
            actual: format!("{} (needs_cleaning={})", status, needs_cleaning),
        },
    })
}

fn update_order(conn: &Connection, order: &OrderUpdate, now: &str) -> RepositoryResult<()> {
    let affected = conn.execute(
        r#"UPDATE donation_order
           SET status = ?2, pickup_date = ?3, revision = revision + 1, updated_at = ?4
           WHERE order_id = ?1
             AND status = 'PENDING'
             AND revision = ?5
             AND NOT EXISTS (SELECT 1 FROM order_fulfillment f WHERE f.order_id = ?1)"#,
        params![
            order.order_id,
            order.new_status.as_str(),
            format_date(&order.pickup_date),
            now,
            order.expected_revision,
        ],
    )?;

    if affected == 0 {
        let current: Option<(i64, String)> = conn
            .query_row(
                "SELECT revision, status FROM donation_order WHERE order_id = ?1",
                params![order.order_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        return Err(match current {
            None => RepositoryError::NotFound {
                entity: "Order".to_string(),
                id: order.order_id.clone(),
            },
            Some((actual, _)) if actual != order.expected_revision => {
                RepositoryError::OptimisticLockFailure {
                    entity: "Order".to_string(),
                    id: order.order_id.clone(),
                    expected: order.expected_revision,
                    actual,
                }
            }
            Some((_, status)) => RepositoryError::StaleState {
                entity: "Order".to_string(),
                id: order.order_id.clone(),
                expected: format!("{} (未履约)", OrderStatus::Pending),
                actual: status,
            },
        });
    }

    let mut link = conn.prepare_cached(
        "INSERT INTO order_fulfillment (order_id, seq_no, bag_id) VALUES (?1, ?2, ?3)",
    )?;
    for (seq_no, bag_id) in order.fulfilled_by.iter().enumerate() {
        link.execute(params![order.order_id, seq_no as i64, bag_id])?;
    }

    Ok(())
}

fn mark_proposal_committed(
    conn: &Connection,
    proposal_id: &str,
    committed_by: &str,
    now: &str,
) -> RepositoryResult<()> {
    let affected = conn.execute(
        r#"UPDATE allocation_proposal
           SET status = 'COMMITTED', decided_by = ?2, decided_at = ?3
           WHERE proposal_id = ?1 AND status = 'PROPOSED'"#,
        params![proposal_id, committed_by, now],
    )?;

    if affected == 1 {
        return Ok(());
    }

    let actual: Option<String> = conn
        .query_row(
            "SELECT status FROM allocation_proposal WHERE proposal_id = ?1",
            params![proposal_id],
            |row| row.get(0),
        )
        .optional()?;

    Err(match actual {
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
    })
}
