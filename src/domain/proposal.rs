// ==========================================
// 捐赠物资分配引擎 - 分配提案领域模型
// ==========================================
// 两阶段协议: propose(plan) -> proposal_id，外部审核后 commit(proposal_id)
// 未决提案超过 expires_at 视为放弃（EXPIRED）
// ==========================================

use crate::domain::allocation::{AllocationPlan, PlanSnapshot};
use crate::domain::types::ProposalStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// AllocationProposal - 分配提案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationProposal {
    pub proposal_id: String,                  // 提案ID (uuid v4)
    pub status: ProposalStatus,               // 状态
    pub plan: AllocationPlan,                 // 分配方案
    pub snapshot: PlanSnapshot,               // 修订号快照（乐观锁）
    pub config_snapshot_json: Option<String>, // 配置快照 (JSON)
    pub created_by: String,                   // 发起人
    pub created_at: DateTime<Utc>,            // 创建时间
    pub expires_at: DateTime<Utc>,            // 过期时间
    pub decided_by: Option<String>,           // 确认/拒绝人
    pub decided_at: Option<DateTime<Utc>>,    // 确认/拒绝时间
    pub failure_reason: Option<String>,       // 失败/拒绝原因
}

impl AllocationProposal {
    /// 是否已过期（仅对 PROPOSED 有意义）
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// 是否可被确认/拒绝
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::Proposed && !self.is_expired_at(now)
    }
}
