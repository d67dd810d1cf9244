// ==========================================
// 捐赠物资分配引擎 - 订单领域模型
// ==========================================
// 红线: priority / created_at 缺失时由引擎拒绝，不做默认值推断
// ==========================================

use crate::domain::types::OrderStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Order - 物资需求订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,                  // 订单ID
    pub priority: Option<i64>,             // 优先级（正整数）
    pub requested_quantity_kg: f64,        // 需求量 (kg)
    pub created_at: Option<DateTime<Utc>>, // 提交时间
    pub status: OrderStatus,               // 状态
    pub fulfilled_by: Vec<String>,         // 分配的捐赠袋ID（有序）
    pub pickup_date: Option<NaiveDate>,    // 取货日期（提交时生成）
    pub revision: i64,                     // 乐观锁：修订号
}

impl Order {
    /// 构造一个待分配订单
    pub fn pending(
        order_id: impl Into<String>,
        priority: i64,
        requested_quantity_kg: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            priority: Some(priority),
            requested_quantity_kg,
            created_at: Some(created_at),
            status: OrderStatus::Pending,
            fulfilled_by: Vec::new(),
            pickup_date: None,
            revision: 0,
        }
    }

    /// 是否可进入分配引擎
    ///
    /// 条件: status = PENDING 且 fulfilled_by 为空
    /// 字段合法性（priority/created_at/需求量）由评分器校验
    pub fn is_eligible(&self) -> bool {
        self.status == OrderStatus::Pending && self.fulfilled_by.is_empty()
    }
}

// ==========================================
// ScoredOrder - 带重要度评分的订单（每次运行重算）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOrder {
    pub order: Order,
    pub importance_score: i64,
}
