// ==========================================
// 捐赠物资分配引擎 - 分配配置读取 Trait
// ==========================================
// 职责: 定义引擎/接口层所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::engine::subset_matcher::MatchStrategy;
use async_trait::async_trait;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// AllocationConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
// 约定: 配置缺失或非法时返回默认值并记录 warn，不返回错误
#[async_trait]
pub trait AllocationConfigReader: Send + Sync {
    // ===== 取货日期 =====

    /// 取货日期偏移区间 [min, max]（天）
    ///
    /// # 默认值
    /// - (1, 2)
    async fn get_pickup_offset_range(&self) -> ConfigResult<(i64, i64)>;

    // ===== 两阶段提交 =====

    /// 提案有效期（分钟）
    ///
    /// # 默认值
    /// - 30
    async fn get_proposal_ttl_minutes(&self) -> ConfigResult<i64>;

    // ===== 子集匹配 =====

    /// 子集搜索策略
    ///
    /// # 默认值
    /// - BRANCH_AND_BOUND
    async fn get_match_strategy(&self) -> ConfigResult<MatchStrategy>;

    /// 穷举策略候选上限
    ///
    /// # 默认值
    /// - 20
    async fn get_exhaustive_max_candidates(&self) -> ConfigResult<usize>;
}
