// ==========================================
// 捐赠物资分配引擎 - 提交批次领域模型
// ==========================================
// 红线: 一个批次作为单一事务写入，全部成功或全部回滚
// ==========================================

use crate::domain::types::{BagStatus, OrderStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// OrderUpdate - 订单写入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub expected_revision: i64,    // 规划时读取的修订号
    pub new_status: OrderStatus,
    pub fulfilled_by: Vec<String>, // 有序捐赠袋ID
    pub pickup_date: NaiveDate,
}

// ==========================================
// BagUpdate - 捐赠袋写入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BagUpdate {
    pub bag_id: String,
    pub expected_revision: i64,
    pub new_status: BagStatus,
}

// ==========================================
// CommitBatch - 一次提交的全部写入
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBatch {
    /// 关联提案（同一事务内置为 COMMITTED；None 表示直接提交）
    pub proposal_id: Option<String>,
    pub committed_by: String,
    pub committed_at: DateTime<Utc>,
    pub orders: Vec<OrderUpdate>,
    pub bags: Vec<BagUpdate>,
}

// ==========================================
// CommitReceipt - 提交回执
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub proposal_id: Option<String>,
    pub orders_updated: usize,
    pub bags_updated: usize,
    pub pickup_dates: Vec<(String, NaiveDate)>,
    pub committed_at: DateTime<Utc>,
}
