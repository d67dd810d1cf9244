// ==========================================
// 捐赠物资分配引擎 - 捐赠袋领域模型
// ==========================================
// 所有权: 由库存子系统创建/维护；引擎只读，提交时只写 status
// ==========================================

use crate::domain::types::BagStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// DonationBag - 捐赠袋
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationBag {
    pub bag_id: String,           // 捐赠袋ID（唯一、稳定）
    pub weight_kg: f64,           // 重量 (kg, 非负)
    pub status: BagStatus,        // 状态
    pub needs_cleaning: bool,     // 是否需要清洗
    pub revision: i64,            // 乐观锁：修订号
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DonationBag {
    /// 构造一个在库可分配的捐赠袋
    pub fn available(bag_id: impl Into<String>, weight_kg: f64) -> Self {
        let now = Utc::now();
        Self {
            bag_id: bag_id.into(),
            weight_kg,
            status: BagStatus::Available,
            needs_cleaning: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否可进入分配引擎
    ///
    /// 条件: status = AVAILABLE 且 needs_cleaning = false，且重量为有限非负数
    pub fn is_eligible(&self) -> bool {
        self.status == BagStatus::Available
            && !self.needs_cleaning
            && self.weight_kg.is_finite()
            && self.weight_kg >= 0.0
    }
}
