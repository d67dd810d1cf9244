// ==========================================
// 捐赠物资分配引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供命令行调用
// ==========================================

pub mod allocation_api;
pub mod error;
pub mod inventory_api;
pub mod notice;

// 重导出核心类型
pub use allocation_api::{AllocationApi, CommitResult, ProposalResult};
pub use error::{ApiError, ApiResult};
pub use inventory_api::InventoryApi;
pub use notice::{AbortReason, AllocationNotice};
