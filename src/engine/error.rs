// ==========================================
// 捐赠物资分配引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 订单输入非法（缺 priority/created_at、需求量非正等）
    /// 只剔除该订单，不中止整次运行
    #[error("订单无效: order_id={order_id}, reason={reason}")]
    InvalidOrder { order_id: String, reason: String },

    /// 匹配目标非正或非有限数（上游应已按 InvalidOrder 剔除）
    #[error("匹配目标无效: target_kg={target_kg}")]
    InvalidTarget { target_kg: f64 },

    /// 穷举策略的候选数量超过上限
    #[error("候选捐赠袋过多: count={count}, limit={limit}")]
    CandidateLimitExceeded { count: usize, limit: usize },

    /// 引擎配置非法
    #[error("引擎配置错误: {0}")]
    InvalidConfig(String),

    /// 提交时间加偏移后超出可表示的日期范围
    #[error("取货日期超出范围: committed_at={committed_at}, offset_days={offset_days}")]
    PickupDateOutOfRange {
        committed_at: String,
        offset_days: i64,
    },
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

// ==========================================
// CommitError - 方案提交错误
// ==========================================
// 任一变体返回时，持久化状态保持不变
#[derive(Error, Debug)]
pub enum CommitError {
    /// 方案自身不一致（捐赠袋重复占用、快照缺少修订号）
    #[error("方案不一致: {0}")]
    InconsistentPlan(String),

    /// 规划后捐赠袋/订单已被并发修改
    #[error("方案已过期: {0}")]
    StalePlan(#[source] RepositoryError),

    /// 取货日期无法计算（未写入任何数据）
    #[error("取货日期计算失败: {0}")]
    Scheduling(#[source] EngineError),

    /// 存储层失败
    #[error("提交失败: {0}")]
    Storage(#[source] RepositoryError),
}

impl From<RepositoryError> for CommitError {
    fn from(err: RepositoryError) -> Self {
        match err {
            e if e.is_conflict() => CommitError::StalePlan(e),
            e @ RepositoryError::NotFound { .. } => CommitError::StalePlan(e),
            e => CommitError::Storage(e),
        }
    }
}

impl CommitError {
    pub fn is_stale(&self) -> bool {
        matches!(self, CommitError::StalePlan(_))
    }
}
