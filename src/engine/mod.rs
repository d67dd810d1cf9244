// ==========================================
// 捐赠物资分配引擎 - 引擎层
// ==========================================
// 职责: 评分 / 子集匹配 / 贪心规划 / 原子提交
// 红线: 规划是纯计算，只有 PlanCommitter 经仓储层写库
// ==========================================

pub mod committer;
pub mod error;
pub mod pickup;
pub mod planner;
pub mod scorer;
pub mod subset_matcher;
pub mod summary;

// 重导出核心引擎
pub use committer::PlanCommitter;
pub use error::{CommitError, EngineError, EngineResult};
pub use pickup::{FixedPickupScheduler, PickupScheduler, RandomPickupScheduler};
pub use planner::{AllocationPlanner, PlanningReport, RejectedOrder};
pub use scorer::ImportanceScorer;
pub use subset_matcher::{ClaimedBags, MatchStrategy, SubsetMatch, SubsetMatcher};
pub use summary::{PlanSummary, SummaryLine};
