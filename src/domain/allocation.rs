// ==========================================
// 捐赠物资分配引擎 - 分配方案领域模型
// ==========================================
// 红线: 同一方案内各分配的捐赠袋集合两两不相交
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ==========================================
// Allocation - 单个订单的分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub order_id: String,
    pub bag_ids: Vec<String>, // 有序（按候选列表顺序）
    pub total_weight_kg: f64,
}

impl Allocation {
    pub fn bag_count(&self) -> usize {
        self.bag_ids.len()
    }
}

// ==========================================
// AllocationPlan - 一次运行产生的分配方案
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
}

impl AllocationPlan {
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// 方案使用的全部捐赠袋ID（按分配顺序）
    pub fn bag_ids(&self) -> Vec<&str> {
        self.allocations
            .iter()
            .flat_map(|a| a.bag_ids.iter().map(String::as_str))
            .collect()
    }

    /// 方案使用的捐赠袋总数
    pub fn total_bags_used(&self) -> usize {
        self.allocations.iter().map(Allocation::bag_count).sum()
    }

    /// 方案分配的总重量
    pub fn total_weight_kg(&self) -> f64 {
        self.allocations.iter().map(|a| a.total_weight_kg).sum()
    }

    /// 校验捐赠袋互斥（无重复占用）
    pub fn is_disjoint(&self) -> bool {
        let mut seen = HashSet::new();
        self.bag_ids().into_iter().all(|id| seen.insert(id))
    }
}

// ==========================================
// PlanSnapshot - 方案生成时的修订号快照
// ==========================================
// 用途: 提交时做乐观锁校验，拒绝过期方案
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub bag_revisions: BTreeMap<String, i64>,
    pub order_revisions: BTreeMap<String, i64>,
}
