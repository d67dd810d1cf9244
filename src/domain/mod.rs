// ==========================================
// 捐赠物资分配引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod allocation;
pub mod bag;
pub mod commit;
pub mod order;
pub mod proposal;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use allocation::{Allocation, AllocationPlan, PlanSnapshot};
pub use bag::DonationBag;
pub use commit::{BagUpdate, CommitBatch, CommitReceipt, OrderUpdate};
pub use order::{Order, ScoredOrder};
pub use proposal::AllocationProposal;
pub use types::{BagStatus, OrderStatus, Priority, ProposalStatus};
