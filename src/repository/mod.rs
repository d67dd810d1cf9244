// ==========================================
// 捐赠物资分配引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod bag_repo;
pub mod commit_repo;
pub mod error;
pub mod order_repo;
pub mod proposal_repo;
pub mod time_fmt;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use bag_repo::DonationBagRepository;
pub use commit_repo::AllocationCommitRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use order_repo::OrderRepository;
pub use proposal_repo::AllocationProposalRepository;
