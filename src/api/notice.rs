// ==========================================
// 捐赠物资分配引擎 - 中止通知
// ==========================================
// 任一中止路径（无可分配捐赠袋/订单、无可行分配、拒绝确认、提交失败）
// 都返回结构化通知，且不修改任何数据
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// AbortReason - 中止原因
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    NoEligibleBags,
    NoEligibleOrders,
    Infeasible,
    ConfirmationDeclined,
    ProposalExpired,
    CommitFailed,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::NoEligibleBags => "NO_ELIGIBLE_BAGS",
            AbortReason::NoEligibleOrders => "NO_ELIGIBLE_ORDERS",
            AbortReason::Infeasible => "INFEASIBLE",
            AbortReason::ConfirmationDeclined => "CONFIRMATION_DECLINED",
            AbortReason::ProposalExpired => "PROPOSAL_EXPIRED",
            AbortReason::CommitFailed => "COMMIT_FAILED",
        }
    }

    /// 是否可通过重新规划恢复（所有中止路径都不破坏持久化状态）
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AbortReason::ConfirmationDeclined)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// AllocationNotice - 结构化中止通知
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationNotice {
    pub reason: AbortReason,
    /// 按当前语言渲染的说明
    pub message: String,
    pub proposal_id: Option<String>,
}

impl AllocationNotice {
    pub fn with_proposal(mut self, proposal_id: &str) -> Self {
        self.proposal_id = Some(proposal_id.to_string());
        self
    }
}

impl fmt::Display for AllocationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.reason, self.message)
    }
}
