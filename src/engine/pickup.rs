// ==========================================
// 捐赠物资分配引擎 - 取货日期调度
// ==========================================
// 取货日期 = 提交日期 + 偏移天数
// 默认偏移在 [1, 2] 天内均匀随机，区间可配置
// 偏移天数限定在 [0, MAX_PICKUP_OFFSET_DAYS]，日期加法使用 checked 版本
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;

/// 默认最小偏移天数
pub const DEFAULT_PICKUP_MIN_OFFSET_DAYS: i64 = 1;
/// 默认最大偏移天数
pub const DEFAULT_PICKUP_MAX_OFFSET_DAYS: i64 = 2;
/// 偏移天数上限
pub const MAX_PICKUP_OFFSET_DAYS: i64 = 365;

// ==========================================
// PickupScheduler Trait
// ==========================================
pub trait PickupScheduler: Send + Sync {
    /// 为一个分配计算取货日期
    ///
    /// # 错误
    /// - `EngineError::PickupDateOutOfRange`: 结果超出 chrono 可表示范围
    fn pickup_date(&self, committed_at: DateTime<Utc>) -> EngineResult<NaiveDate>;
}

fn validate_offset(offset_days: i64) -> EngineResult<()> {
    if !(0..=MAX_PICKUP_OFFSET_DAYS).contains(&offset_days) {
        return Err(EngineError::InvalidConfig(format!(
            "取货偏移天数超出范围: {} (允许 0..={})",
            offset_days, MAX_PICKUP_OFFSET_DAYS
        )));
    }
    Ok(())
}

fn offset_date(committed_at: DateTime<Utc>, offset_days: i64) -> EngineResult<NaiveDate> {
    Duration::try_days(offset_days)
        .and_then(|offset| committed_at.checked_add_signed(offset))
        .map(|at| at.date_naive())
        .ok_or_else(|| EngineError::PickupDateOutOfRange {
            committed_at: committed_at.to_rfc3339(),
            offset_days,
        })
}

// ==========================================
// RandomPickupScheduler - 区间内均匀随机
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct RandomPickupScheduler {
    min_offset_days: i64,
    max_offset_days: i64,
}

impl Default for RandomPickupScheduler {
    fn default() -> Self {
        Self {
            min_offset_days: DEFAULT_PICKUP_MIN_OFFSET_DAYS,
            max_offset_days: DEFAULT_PICKUP_MAX_OFFSET_DAYS,
        }
    }
}

impl RandomPickupScheduler {
    pub fn new(min_offset_days: i64, max_offset_days: i64) -> EngineResult<Self> {
        validate_offset(min_offset_days)?;
        validate_offset(max_offset_days)?;
        if max_offset_days < min_offset_days {
            return Err(EngineError::InvalidConfig(format!(
                "取货偏移区间非法: [{}, {}]",
                min_offset_days, max_offset_days
            )));
        }
        Ok(Self {
            min_offset_days,
            max_offset_days,
        })
    }

    pub fn range(&self) -> (i64, i64) {
        (self.min_offset_days, self.max_offset_days)
    }
}

impl PickupScheduler for RandomPickupScheduler {
    fn pickup_date(&self, committed_at: DateTime<Utc>) -> EngineResult<NaiveDate> {
        let offset = rand::rng().random_range(self.min_offset_days..=self.max_offset_days);
        offset_date(committed_at, offset)
    }
}

// ==========================================
// FixedPickupScheduler - 固定偏移（测试/人工指定）
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct FixedPickupScheduler {
    offset_days: i64,
}

impl FixedPickupScheduler {
    pub fn new(offset_days: i64) -> EngineResult<Self> {
        validate_offset(offset_days)?;
        Ok(Self { offset_days })
    }
}

impl PickupScheduler for FixedPickupScheduler {
    fn pickup_date(&self, committed_at: DateTime<Utc>) -> EngineResult<NaiveDate> {
        offset_date(committed_at, self.offset_days)
    }
}
