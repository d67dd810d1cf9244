// ==========================================
// 捐赠物资分配引擎 - 重要度评分器
// ==========================================
// 公式: importance_score = priority * 10 + age_in_days
// age_in_days = floor((now - created_at) / 1天)，向零截断
// ==========================================
// 红线: 不为缺失字段推断默认值
// ==========================================

use crate::domain::order::{Order, ScoredOrder};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};

/// 优先级权重
pub const PRIORITY_WEIGHT: i64 = 10;

// ==========================================
// ImportanceScorer - 重要度评分器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportanceScorer {
    // 无状态引擎，不需要注入依赖
}

impl ImportanceScorer {
    pub fn new() -> Self {
        Self {}
    }

    /// 计算订单重要度评分（越高越紧急）
    ///
    /// # 错误
    /// - `EngineError::InvalidOrder`: priority 缺失或非正、created_at 缺失或晚于 now、
    ///   需求量非正或非有限数
    pub fn score(&self, order: &Order, now: DateTime<Utc>) -> EngineResult<i64> {
        let priority = order
            .priority
            .ok_or_else(|| invalid(order, "priority 缺失"))?;
        if priority <= 0 {
            return Err(invalid(order, &format!("priority 必须为正整数: {}", priority)));
        }

        let created_at = order
            .created_at
            .ok_or_else(|| invalid(order, "created_at 缺失"))?;
        if created_at > now {
            return Err(invalid(order, "created_at 晚于当前时间"));
        }

        let quantity = order.requested_quantity_kg;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(invalid(order, &format!("需求量必须为正数: {}", quantity)));
        }

        // num_days 向零截断
        let age_in_days = (now - created_at).num_days();

        priority
            .checked_mul(PRIORITY_WEIGHT)
            .and_then(|p| p.checked_add(age_in_days))
            .ok_or_else(|| invalid(order, "评分溢出"))
    }

    /// 评分并包装为 ScoredOrder
    pub fn score_order(&self, order: Order, now: DateTime<Utc>) -> EngineResult<ScoredOrder> {
        let importance_score = self.score(&order, now)?;
        Ok(ScoredOrder {
            order,
            importance_score,
        })
    }
}

fn invalid(order: &Order, reason: &str) -> EngineError {
    EngineError::InvalidOrder {
        order_id: order.order_id.clone(),
        reason: reason.to_string(),
    }
}
