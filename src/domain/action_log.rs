// ==========================================
// 捐赠物资分配引擎 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录
// 用途: 审计追踪
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,              // 日志ID
    pub proposal_id: Option<String>,    // 关联提案 (导入等操作可为None)
    pub action_type: ActionType,        // 操作类型
    pub action_ts: DateTime<Utc>,       // 操作时间戳
    pub actor: String,                  // 操作人
    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,         // 详细描述
}

impl ActionLog {
    pub fn new(action_type: ActionType, actor: &str, action_ts: DateTime<Utc>) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            proposal_id: None,
            action_type,
            action_ts,
            actor: actor.to_string(),
            payload_json: None,
            detail: None,
        }
    }

    pub fn with_proposal(mut self, proposal_id: &str) -> Self {
        self.proposal_id = Some(proposal_id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Propose,      // 生成分配提案
    Commit,       // 确认并提交
    Decline,      // 人工拒绝
    Expire,       // 提案超时
    CommitFailed, // 提交失败（整体回滚）
    ImportBags,   // 导入捐赠袋
    ImportOrders, // 导入订单
    MarkCleaned,  // 清洗完成
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Propose => "PROPOSE",
            ActionType::Commit => "COMMIT",
            ActionType::Decline => "DECLINE",
            ActionType::Expire => "EXPIRE",
            ActionType::CommitFailed => "COMMIT_FAILED",
            ActionType::ImportBags => "IMPORT_BAGS",
            ActionType::ImportOrders => "IMPORT_ORDERS",
            ActionType::MarkCleaned => "MARK_CLEANED",
        }
    }

    pub fn parse(s: &str) -> Option<ActionType> {
        match s.trim().to_uppercase().as_str() {
            "PROPOSE" => Some(ActionType::Propose),
            "COMMIT" => Some(ActionType::Commit),
            "DECLINE" => Some(ActionType::Decline),
            "EXPIRE" => Some(ActionType::Expire),
            "COMMIT_FAILED" => Some(ActionType::CommitFailed),
            "IMPORT_BAGS" => Some(ActionType::ImportBags),
            "IMPORT_ORDERS" => Some(ActionType::ImportOrders),
            "MARK_CLEANED" => Some(ActionType::MarkCleaned),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
