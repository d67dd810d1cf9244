// ==========================================
// 捐赠物资分配引擎 - 分配规划器
// ==========================================
// 流程:
// 1) 过滤可分配捐赠袋/订单
// 2) 评分并按重要度降序稳定排序（同分保持输入顺序）
// 3) 逐个订单调用 SubsetMatcher，维护本次运行的占用集合
// 4) 无法完整满足的订单整体跳过，不阻塞后续订单
// ==========================================
// 红线: 规划是纯计算，不产生任何持久化副作用
// 说明: 贪心单遍，不回溯调整已分配订单
// ==========================================

use crate::domain::allocation::{Allocation, AllocationPlan, PlanSnapshot};
use crate::domain::bag::DonationBag;
use crate::domain::order::{Order, ScoredOrder};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::scorer::ImportanceScorer;
use crate::engine::subset_matcher::{ClaimedBags, SubsetMatcher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

// ==========================================
// RejectedOrder - 被剔除的订单（输入非法）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedOrder {
    pub order_id: String,
    pub reason: String,
}

// ==========================================
// PlanningReport - 规划结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningReport {
    /// 分配方案（按处理顺序）
    pub plan: AllocationPlan,
    /// 方案涉及捐赠袋/订单的修订号快照
    pub snapshot: PlanSnapshot,
    /// 参与规划的订单（已排序）
    pub scored: Vec<ScoredOrder>,
    /// 因输入非法被剔除的订单
    pub rejected: Vec<RejectedOrder>,
    /// 无可行子集而跳过的订单（保持 PENDING）
    pub unmatched: Vec<String>,
    /// 可分配捐赠袋数量
    pub eligible_bag_count: usize,
}

// ==========================================
// AllocationPlanner - 分配规划器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AllocationPlanner {
    scorer: ImportanceScorer,
    matcher: SubsetMatcher,
}

impl AllocationPlanner {
    pub fn new(matcher: SubsetMatcher) -> Self {
        Self {
            scorer: ImportanceScorer::new(),
            matcher,
        }
    }

    /// 生成分配方案
    ///
    /// # 参数
    /// - `bags`: 捐赠袋（不可分配的会被忽略）
    /// - `orders`: 订单（不可分配的会被忽略）
    /// - `now`: 评分基准时间
    ///
    /// # 错误
    /// - `EngineError::CandidateLimitExceeded`: 穷举策略候选过多（整次运行失败）
    #[instrument(skip(self, bags, orders), fields(
        bags_count = bags.len(),
        orders_count = orders.len(),
        strategy = %self.matcher.strategy()
    ))]
    pub fn plan(
        &self,
        bags: &[DonationBag],
        orders: &[Order],
        now: DateTime<Utc>,
    ) -> EngineResult<PlanningReport> {
        let candidates = eligible_bags(bags);
        let mut report = PlanningReport {
            eligible_bag_count: candidates.len(),
            ..PlanningReport::default()
        };

        // ==========================================
        // 步骤1: 评分（非法订单剔除，不中止运行）
        // ==========================================
        let mut seen_orders = HashSet::new();
        let mut scored = Vec::new();
        for order in orders.iter().filter(|o| o.is_eligible()) {
            if !seen_orders.insert(order.order_id.as_str()) {
                warn!(order_id = %order.order_id, "重复的订单ID，已忽略");
                continue;
            }
            match self.scorer.score_order(order.clone(), now) {
                Ok(s) => scored.push(s),
                Err(EngineError::InvalidOrder { order_id, reason }) => {
                    warn!(%order_id, %reason, "订单无效，已剔除");
                    report.rejected.push(RejectedOrder { order_id, reason });
                }
                Err(e) => return Err(e),
            }
        }

        // ==========================================
        // 步骤2: 按重要度降序排序（sort_by 为稳定排序）
        // ==========================================
        scored.sort_by(|a, b| b.importance_score.cmp(&a.importance_score));

        // ==========================================
        // 步骤3: 逐单匹配
        // ==========================================
        let mut claimed = ClaimedBags::new();
        for item in &scored {
            let order = &item.order;
            let found = self.matcher.find_best_subset(
                &candidates,
                &claimed,
                order.requested_quantity_kg,
            )?;

            let Some(found) = found else {
                debug!(order_id = %order.order_id, "无可行子集，跳过");
                report.unmatched.push(order.order_id.clone());
                continue;
            };

            let bag_ids = found.bag_ids(&candidates);
            claimed.claim(bag_ids.iter().cloned());

            for &i in &found.indices {
                report
                    .snapshot
                    .bag_revisions
                    .insert(candidates[i].bag_id.clone(), candidates[i].revision);
            }
            report
                .snapshot
                .order_revisions
                .insert(order.order_id.clone(), order.revision);

            debug!(
                order_id = %order.order_id,
                importance_score = item.importance_score,
                bag_count = bag_ids.len(),
                total_weight_kg = found.total_weight_kg,
                excess_kg = found.excess_kg,
                "订单已分配"
            );

            report.plan.allocations.push(Allocation {
                order_id: order.order_id.clone(),
                bag_ids,
                total_weight_kg: found.total_weight_kg,
            });
        }

        report.scored = scored;

        info!(
            allocations = report.plan.allocations.len(),
            bags_used = report.plan.total_bags_used(),
            rejected = report.rejected.len(),
            unmatched = report.unmatched.len(),
            "分配方案生成完成"
        );

        Ok(report)
    }
}

/// 过滤可分配捐赠袋（保持输入顺序，重复ID只保留首个）
fn eligible_bags(bags: &[DonationBag]) -> Vec<DonationBag> {
    let mut seen = HashSet::new();
    bags.iter()
        .filter(|b| b.is_eligible())
        .filter(|b| {
            let fresh = seen.insert(b.bag_id.as_str());
            if !fresh {
                warn!(bag_id = %b.bag_id, "重复的捐赠袋ID，已忽略");
            }
            fresh
        })
        .cloned()
        .collect()
}
