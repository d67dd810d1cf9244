// ==========================================
// 捐赠物资分配引擎 - 方案提交器
// ==========================================
// 流程:
// 1) 校验方案（捐赠袋互斥、快照完整）
// 2) 为每个分配生成取货日期，组装 CommitBatch
// 3) 交给仓储层在单一事务内写入（乐观锁）
// ==========================================
// 红线: 全部写入成功或全部不生效
// ==========================================

use crate::domain::allocation::{AllocationPlan, PlanSnapshot};
use crate::domain::commit::{BagUpdate, CommitBatch, CommitReceipt, OrderUpdate};
use crate::domain::types::{BagStatus, OrderStatus};
use crate::engine::error::CommitError;
use crate::engine::pickup::PickupScheduler;
use crate::repository::commit_repo::AllocationCommitRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 提交后订单状态
pub const COMMITTED_ORDER_STATUS: OrderStatus = OrderStatus::Allocated;
/// 提交后捐赠袋状态
pub const COMMITTED_BAG_STATUS: BagStatus = BagStatus::Delivered;

// ==========================================
// PlanCommitter - 方案提交器
// ==========================================
pub struct PlanCommitter {
    commit_repo: Arc<AllocationCommitRepository>,
    scheduler: Arc<dyn PickupScheduler>,
}

impl PlanCommitter {
    pub fn new(
        commit_repo: Arc<AllocationCommitRepository>,
        scheduler: Arc<dyn PickupScheduler>,
    ) -> Self {
        Self {
            commit_repo,
            scheduler,
        }
    }

    /// 组装提交批次（纯计算，不写库）
    ///
    /// # 错误
    /// - `CommitError::InconsistentPlan`: 捐赠袋重复占用，或快照缺少某个修订号
    /// - `CommitError::Scheduling`: 取货日期超出可表示范围
    pub fn build_batch(
        &self,
        plan: &AllocationPlan,
        snapshot: &PlanSnapshot,
        committed_by: &str,
        committed_at: DateTime<Utc>,
        proposal_id: Option<&str>,
    ) -> Result<CommitBatch, CommitError> {
        if !plan.is_disjoint() {
            return Err(CommitError::InconsistentPlan(
                "同一捐赠袋被多个订单占用".to_string(),
            ));
        }

        let mut orders = Vec::with_capacity(plan.allocations.len());
        let mut bags = Vec::with_capacity(plan.total_bags_used());

        for allocation in &plan.allocations {
            let expected_revision = snapshot
                .order_revisions
                .get(&allocation.order_id)
                .copied()
                .ok_or_else(|| {
                    CommitError::InconsistentPlan(format!(
                        "快照缺少订单修订号: {}",
                        allocation.order_id
                    ))
                })?;

            for bag_id in &allocation.bag_ids {
                let bag_revision = snapshot.bag_revisions.get(bag_id).copied().ok_or_else(|| {
                    CommitError::InconsistentPlan(format!("快照缺少捐赠袋修订号: {}", bag_id))
                })?;
                bags.push(BagUpdate {
                    bag_id: bag_id.clone(),
                    expected_revision: bag_revision,
                    new_status: COMMITTED_BAG_STATUS,
                });
            }

            orders.push(OrderUpdate {
                order_id: allocation.order_id.clone(),
                expected_revision,
                new_status: COMMITTED_ORDER_STATUS,
                fulfilled_by: allocation.bag_ids.clone(),
                pickup_date: self
                    .scheduler
                    .pickup_date(committed_at)
                    .map_err(CommitError::Scheduling)?,
            });
        }

        Ok(CommitBatch {
            proposal_id: proposal_id.map(str::to_string),
            committed_by: committed_by.to_string(),
            committed_at,
            orders,
            bags,
        })
    }

    /// 提交方案
    ///
    /// # 错误
    /// - `CommitError::StalePlan`: 规划后数据被并发修改（整批回滚）
    /// - `CommitError::Storage`: 存储层失败（整批回滚）
    #[instrument(skip(self, plan, snapshot), fields(
        allocations = plan.allocations.len(),
        proposal_id = ?proposal_id
    ))]
    pub fn commit(
        &self,
        plan: &AllocationPlan,
        snapshot: &PlanSnapshot,
        committed_by: &str,
        committed_at: DateTime<Utc>,
        proposal_id: Option<&str>,
    ) -> Result<CommitReceipt, CommitError> {
        let batch = self.build_batch(plan, snapshot, committed_by, committed_at, proposal_id)?;

        match self.commit_repo.apply_batch(&batch) {
            Ok(receipt) => {
                info!(
                    orders_updated = receipt.orders_updated,
                    bags_updated = receipt.bags_updated,
                    "分配方案已提交"
                );
                Ok(receipt)
            }
            Err(e) => {
                let err = CommitError::from(e);
                warn!(error = %err, "分配方案提交失败，已整体回滚");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::Allocation;
    use crate::engine::error::EngineError;
    use crate::engine::pickup::FixedPickupScheduler;
    use chrono::{NaiveDate, TimeZone};
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn committer() -> PlanCommitter {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        PlanCommitter::new(
            Arc::new(AllocationCommitRepository::new(conn)),
            Arc::new(FixedPickupScheduler::new(2).unwrap()),
        )
    }

    fn plan(entries: &[(&str, &[&str])]) -> AllocationPlan {
        AllocationPlan {
            allocations: entries
                .iter()
                .map(|(order_id, bags)| Allocation {
                    order_id: order_id.to_string(),
                    bag_ids: bags.iter().map(|s| s.to_string()).collect(),
                    total_weight_kg: 0.0,
                })
                .collect(),
        }
    }

    fn snapshot(orders: &[(&str, i64)], bags: &[(&str, i64)]) -> PlanSnapshot {
        PlanSnapshot {
            order_revisions: orders.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            bag_revisions: bags.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_build_batch_carries_revisions_and_pickup_date() {
        let committed_at = Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).unwrap();
        let batch = committer()
            .build_batch(
                &plan(&[("O1", &["B"]), ("O2", &["A", "C"])]),
                &snapshot(&[("O1", 3), ("O2", 0)], &[("A", 1), ("B", 5), ("C", 0)]),
                "alice",
                committed_at,
                Some("P1"),
            )
            .unwrap();

        assert_eq!(batch.proposal_id.as_deref(), Some("P1"));
        assert_eq!(batch.orders.len(), 2);
        assert_eq!(batch.orders[0].expected_revision, 3);
        assert_eq!(batch.orders[1].fulfilled_by, vec!["A", "C"]);
        assert_eq!(
            batch.orders[0].pickup_date,
            NaiveDate::from_ymd_opt(2026, 4, 12).unwrap()
        );
        let bag_revs: Vec<(&str, i64)> = batch
            .bags
            .iter()
            .map(|b| (b.bag_id.as_str(), b.expected_revision))
            .collect();
        assert_eq!(bag_revs, vec![("B", 5), ("A", 1), ("C", 0)]);
        assert!(batch.bags.iter().all(|b| b.new_status == BagStatus::Delivered));
        assert!(batch.orders.iter().all(|o| o.new_status == OrderStatus::Allocated));
    }

    #[test]
    fn test_build_batch_rejects_unrepresentable_pickup_date() {
        let err = committer()
            .build_batch(
                &plan(&[("O1", &["B"])]),
                &snapshot(&[("O1", 0)], &[("B", 0)]),
                "alice",
                DateTime::<Utc>::MAX_UTC,
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Scheduling(EngineError::PickupDateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_build_batch_rejects_shared_bag() {
        let err = committer()
            .build_batch(
                &plan(&[("O1", &["B"]), ("O2", &["B"])]),
                &snapshot(&[("O1", 0), ("O2", 0)], &[("B", 0)]),
                "alice",
                Utc::now(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CommitError::InconsistentPlan(_)));
    }

    #[test]
    fn test_build_batch_rejects_incomplete_snapshot() {
        let err = committer()
            .build_batch(
                &plan(&[("O1", &["B"])]),
                &snapshot(&[("O1", 0)], &[]),
                "alice",
                Utc::now(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CommitError::InconsistentPlan(_)));
    }

    #[test]
    fn test_commit_of_unknown_rows_is_stale() {
        let err = committer()
            .commit(
                &plan(&[("O1", &["B"])]),
                &snapshot(&[("O1", 0)], &[("B", 0)]),
                "alice",
                Utc::now(),
                None,
            )
            .unwrap_err();
        assert!(err.is_stale());
    }
}
