// ==========================================
// 捐赠物资分配引擎 - 领域类型定义
// ==========================================
// 状态值序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 捐赠袋状态 (Bag Status)
// ==========================================
// 只有 AVAILABLE 且无需清洗的捐赠袋才能进入分配引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BagStatus {
    Available, // 在库可分配
    Reserved,  // 已预留
    InTransit, // 运输中
    Delivered, // 已认领（提交后的终态）
}

impl BagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BagStatus::Available => "AVAILABLE",
            BagStatus::Reserved => "RESERVED",
            BagStatus::InTransit => "IN_TRANSIT",
            BagStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for BagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BagStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "AVAILABLE" | "IN_STORAGE" | "INSTORAGE" => Ok(BagStatus::Available),
            "RESERVED" => Ok(BagStatus::Reserved),
            "IN_TRANSIT" | "INTRANSIT" => Ok(BagStatus::InTransit),
            "DELIVERED" => Ok(BagStatus::Delivered),
            other => Err(format!("未知的捐赠袋状态: {}", other)),
        }
    }
}

// ==========================================
// 订单状态 (Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,   // 待分配
    Allocated, // 已分配（提交后的下一阶段）
    InTransit, // 配送中
    Delivered, // 已送达
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Allocated => "ALLOCATED",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "ALLOCATED" => Ok(OrderStatus::Allocated),
            "IN_TRANSIT" | "INTRANSIT" => Ok(OrderStatus::InTransit),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            other => Err(format!("未知的订单状态: {}", other)),
        }
    }
}

// ==========================================
// 分配提案状态 (Proposal Status)
// ==========================================
// 两阶段协议: PROPOSED -> COMMITTED / DECLINED / EXPIRED / FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Proposed,
    Committed,
    Declined,
    Expired,
    Failed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Proposed => "PROPOSED",
            ProposalStatus::Committed => "COMMITTED",
            ProposalStatus::Declined => "DECLINED",
            ProposalStatus::Expired => "EXPIRED",
            ProposalStatus::Failed => "FAILED",
        }
    }

    /// 是否为终态（终态提案不可再确认/拒绝）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Proposed)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PROPOSED" => Ok(ProposalStatus::Proposed),
            "COMMITTED" => Ok(ProposalStatus::Committed),
            "DECLINED" => Ok(ProposalStatus::Declined),
            "EXPIRED" => Ok(ProposalStatus::Expired),
            "FAILED" => Ok(ProposalStatus::Failed),
            other => Err(format!("未知的提案状态: {}", other)),
        }
    }
}

// ==========================================
// 优先级 (Priority)
// ==========================================
// 正整数；兼容展示层的文字标签 Low/Medium/High
pub struct Priority;

impl Priority {
    pub const LOW: i64 = 1;
    pub const MEDIUM: i64 = 2;
    pub const HIGH: i64 = 3;

    /// 解析优先级（整数或文字标签）
    ///
    /// # 返回
    /// - Ok(i64): 正整数优先级
    /// - Err(String): 空值、非正数或未知标签
    pub fn parse(raw: &str) -> Result<i64, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("优先级为空".to_string());
        }

        if let Ok(value) = trimmed.parse::<i64>() {
            if value <= 0 {
                return Err(format!("优先级必须为正整数: {}", value));
            }
            return Ok(value);
        }

        match trimmed.to_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "medium" => Ok(Self::MEDIUM),
            "high" => Ok(Self::HIGH),
            other => Err(format!("未知的优先级标签: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bag_status_accepts_legacy_in_storage() {
        assert_eq!("InStorage".parse::<BagStatus>().unwrap(), BagStatus::Available);
        assert_eq!("in-transit".parse::<BagStatus>().unwrap(), BagStatus::InTransit);
        assert!("Lost".parse::<BagStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_db_format() {
        let json = serde_json::to_string(&OrderStatus::InTransit).unwrap();
        assert_eq!(json, "\"IN_TRANSIT\"");
        assert_eq!(OrderStatus::InTransit.as_str(), "IN_TRANSIT");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("3").unwrap(), 3);
        assert_eq!(Priority::parse(" High ").unwrap(), Priority::HIGH);
        assert_eq!(Priority::parse("low").unwrap(), Priority::LOW);
        assert!(Priority::parse("0").is_err());
        assert!(Priority::parse("-2").is_err());
        assert!(Priority::parse("").is_err());
        assert!(Priority::parse("urgent").is_err());
    }

    #[test]
    fn test_proposal_terminal_states() {
        assert!(!ProposalStatus::Proposed.is_terminal());
        assert!(ProposalStatus::Committed.is_terminal());
        assert!(ProposalStatus::Expired.is_terminal());
    }
}
