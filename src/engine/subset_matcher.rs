// ==========================================
// 捐赠物资分配引擎 - 最小超额子集匹配
// ==========================================
// 输入: 候选捐赠袋列表 + 本次运行已占用集合 + 目标需求量
// 输出: 总重 >= 目标且超额 (sum - target) 最小的子集；无解返回 None
// ==========================================
// 红线: 平局取“枚举顺序最早”的子集
//   枚举顺序 = 以候选列表下标为位的二进制掩码升序
//   比较使用严格小于，后出现的等超额子集不会替换先出现的
// ==========================================
// 子集重量一律按候选下标升序以 f64 累加，不做取整：
//   两种策略的和与超额逐位一致；非负数逐个加入时累加和单调不减
// ==========================================

use crate::domain::bag::DonationBag;
use crate::engine::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// 穷举策略的硬上限（掩码为 u64）
pub const EXHAUSTIVE_HARD_LIMIT: usize = 63;

/// 穷举策略的默认候选上限
pub const DEFAULT_EXHAUSTIVE_MAX_CANDIDATES: usize = 20;

// ==========================================
// ClaimedBags - 本次运行已占用的捐赠袋
// ==========================================
// 只由 AllocationPlanner 持有并在规划循环中传递，不跨运行共享
#[derive(Debug, Clone, Default)]
pub struct ClaimedBags {
    ids: HashSet<String>,
}

impl ClaimedBags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, bag_id: &str) -> bool {
        self.ids.contains(bag_id)
    }

    /// 登记占用；返回新登记的数量
    pub fn claim<I, S>(&mut self, bag_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for id in bag_ids {
            if self.ids.insert(id.into()) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ==========================================
// MatchStrategy - 搜索策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStrategy {
    /// 掩码升序穷举（参考实现，候选数受限）
    Exhaustive,
    /// 深度优先 + 剪枝，访问顺序与掩码升序一致
    BranchAndBound,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Exhaustive => write!(f, "EXHAUSTIVE"),
            MatchStrategy::BranchAndBound => write!(f, "BRANCH_AND_BOUND"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EXHAUSTIVE" => Ok(MatchStrategy::Exhaustive),
            "BRANCH_AND_BOUND" => Ok(MatchStrategy::BranchAndBound),
            other => Err(format!("未知的匹配策略: {}", other)),
        }
    }
}

// ==========================================
// SubsetMatch - 匹配结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetMatch {
    /// 候选列表下标（升序，非空）
    pub indices: Vec<usize>,
    /// 总重量 (kg)，按下标升序累加
    pub total_weight_kg: f64,
    /// 超额 (kg) = total_weight_kg - target_kg
    pub excess_kg: f64,
}

impl SubsetMatch {
    /// 取出匹配到的捐赠袋ID（保持候选列表顺序）
    pub fn bag_ids(&self, candidates: &[DonationBag]) -> Vec<String> {
        self.indices
            .iter()
            .map(|&i| candidates[i].bag_id.clone())
            .collect()
    }
}

// ==========================================
// SubsetMatcher - 子集匹配器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct SubsetMatcher {
    strategy: MatchStrategy,
    exhaustive_max_candidates: usize,
}

impl Default for SubsetMatcher {
    fn default() -> Self {
        Self::new(MatchStrategy::BranchAndBound)
    }
}

impl SubsetMatcher {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self {
            strategy,
            exhaustive_max_candidates: DEFAULT_EXHAUSTIVE_MAX_CANDIDATES,
        }
    }

    /// 设置穷举策略的候选上限（不超过 EXHAUSTIVE_HARD_LIMIT）
    pub fn with_exhaustive_max_candidates(mut self, limit: usize) -> Self {
        self.exhaustive_max_candidates = limit.min(EXHAUSTIVE_HARD_LIMIT);
        self
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// 查找最小超额覆盖子集
    ///
    /// # 参数
    /// - `candidates`: 候选捐赠袋（已过滤为可分配）
    /// - `claimed`: 本次运行已被更高优先级订单占用的捐赠袋
    /// - `target_kg`: 目标需求量
    ///
    /// # 返回
    /// - Ok(Some(SubsetMatch)): 最优子集
    /// - Ok(None): 无子集能达到目标，或无未占用候选
    ///
    /// # 错误
    /// - `EngineError::InvalidTarget`: 目标非正或非有限数
    /// - `EngineError::CandidateLimitExceeded`: 穷举策略下未占用候选超过上限
    #[instrument(skip(self, candidates, claimed), fields(
        strategy = %self.strategy,
        candidates_count = candidates.len(),
        claimed_count = claimed.len()
    ))]
    pub fn find_best_subset(
        &self,
        candidates: &[DonationBag],
        claimed: &ClaimedBags,
        target_kg: f64,
    ) -> EngineResult<Option<SubsetMatch>> {
        if !target_kg.is_finite() || target_kg <= 0.0 {
            return Err(EngineError::InvalidTarget { target_kg });
        }

        // 未占用候选（保持原下标升序）
        let pool: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, bag)| !claimed.contains(&bag.bag_id))
            .map(|(i, _)| i)
            .collect();

        if pool.is_empty() {
            debug!("无未占用候选");
            return Ok(None);
        }

        let weights: Vec<f64> = pool.iter().map(|&i| candidates[i].weight_kg).collect();

        let best = match self.strategy {
            MatchStrategy::Exhaustive => {
                if pool.len() > self.exhaustive_max_candidates {
                    return Err(EngineError::CandidateLimitExceeded {
                        count: pool.len(),
                        limit: self.exhaustive_max_candidates,
                    });
                }
                exhaustive(&weights, target_kg)
            }
            MatchStrategy::BranchAndBound => branch_and_bound(&weights, target_kg),
        };

        let Some(positions) = best else {
            debug!(target_kg, "无子集能覆盖目标");
            return Ok(None);
        };

        let total_weight_kg = ascending_sum(&weights, positions.iter().copied());
        let excess_kg = total_weight_kg - target_kg;
        let indices: Vec<usize> = positions.iter().map(|&p| pool[p]).collect();

        debug!(
            target_kg,
            total_weight_kg,
            excess_kg,
            bag_count = indices.len(),
            "找到最小超额子集"
        );

        Ok(Some(SubsetMatch {
            indices,
            total_weight_kg,
            excess_kg,
        }))
    }
}

/// 按位置升序累加（唯一的求和方式）
fn ascending_sum<I>(weights: &[f64], positions: I) -> f64
where
    I: IntoIterator<Item = usize>,
{
    positions.into_iter().fold(0.0, |acc, p| acc + weights[p])
}

/// 掩码升序穷举，返回 pool 内位置（升序）
fn exhaustive(weights: &[f64], target_kg: f64) -> Option<Vec<usize>> {
    let n = weights.len();
    let members = |mask: u64| (0..n).filter(move |j| mask & (1u64 << j) != 0);
    let mut best: Option<(u64, f64)> = None;

    for mask in 1u64..(1u64 << n) {
        let sum = ascending_sum(weights, members(mask));
        if sum < target_kg {
            continue;
        }
        let excess = sum - target_kg;
        if best.map_or(true, |(_, best_excess)| excess < best_excess) {
            best = Some((mask, excess));
        }
    }

    best.map(|(mask, _)| members(mask).collect())
}

/// 分支定界搜索
///
/// 从最高位置向最低位置逐个决定，先“不选”后“选”：
/// 不选分支内的掩码全部小于选分支，因此访问顺序即掩码升序。
/// 一旦已选集合达到目标即记录（剩余全不选就是该子树最小掩码，
/// 再加袋子只会让超额不减），不再向下展开。
/// 剪枝上界 = 已选集合加上全部未决位置的升序和，即子树内的最大和。
fn branch_and_bound(weights: &[f64], target_kg: f64) -> Option<Vec<usize>> {
    // prefix[k] = weights[0..k] 的升序累加和
    let mut prefix = Vec::with_capacity(weights.len() + 1);
    let mut acc = 0.0;
    prefix.push(acc);
    for &w in weights {
        acc += w;
        prefix.push(acc);
    }

    let mut search = Search {
        weights,
        prefix: &prefix,
        target_kg,
        chosen: Vec::new(),
        best: None,
    };
    search.descend(weights.len());

    search.best.map(|(mut positions, _)| {
        positions.sort_unstable();
        positions
    })
}

struct Search<'a> {
    weights: &'a [f64],
    prefix: &'a [f64],
    target_kg: f64,
    // 按位置降序入栈
    chosen: Vec<usize>,
    best: Option<(Vec<usize>, f64)>,
}

impl Search<'_> {
    /// 从 `start` 起按升序累加已选位置（已选位置都高于未决位置）
    fn chosen_sum_from(&self, start: f64) -> f64 {
        self.chosen
            .iter()
            .rev()
            .fold(start, |acc, &p| acc + self.weights[p])
    }

    /// `undecided`: 位置 0..undecided 尚未决定
    fn descend(&mut self, undecided: usize) {
        if matches!(self.best, Some((_, excess)) if excess == 0.0) {
            return;
        }

        let sum = self.chosen_sum_from(0.0);
        if sum >= self.target_kg {
            let excess = sum - self.target_kg;
            if self
                .best
                .as_ref()
                .map_or(true, |(_, best_excess)| excess < *best_excess)
            {
                self.best = Some((self.chosen.clone(), excess));
            }
            return;
        }

        if undecided == 0 || self.chosen_sum_from(self.prefix[undecided]) < self.target_kg {
            return;
        }

        let k = undecided - 1;

        self.descend(k);

        self.chosen.push(k);
        self.descend(k);
        self.chosen.pop();
    }
}
