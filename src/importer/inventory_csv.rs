// ==========================================
// 捐赠物资分配引擎 - 库存/订单 CSV 导入
// ==========================================
// 捐赠袋列: bag_id, weight_kg, [status], [needs_cleaning]
// 订单列:   order_id, requested_quantity_kg, [priority], [created_at], [status]
// ==========================================
// 红线: priority / created_at 缺失照常入库，由引擎在规划时剔除
// 说明: 非法行跳过并记录原因，合法行整体一次事务写入
// ==========================================

use crate::domain::bag::DonationBag;
use crate::domain::order::Order;
use crate::domain::types::{BagStatus, OrderStatus, Priority};
use crate::importer::error::ImportResult;
use crate::importer::file_parser::{CsvParser, RawRecord};
use crate::repository::bag_repo::DonationBagRepository;
use crate::repository::order_repo::OrderRepository;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const BAG_REQUIRED_COLUMNS: &[&str] = &["bag_id", "weight_kg"];
pub const ORDER_REQUIRED_COLUMNS: &[&str] = &["order_id", "requested_quantity_kg"];

// ==========================================
// 导入结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub imported: usize,
    pub rejected: Vec<RowRejection>,
}

// ==========================================
// InventoryCsvImporter
// ==========================================
pub struct InventoryCsvImporter {
    bag_repo: Arc<DonationBagRepository>,
    order_repo: Arc<OrderRepository>,
}

impl InventoryCsvImporter {
    pub fn new(bag_repo: Arc<DonationBagRepository>, order_repo: Arc<OrderRepository>) -> Self {
        Self {
            bag_repo,
            order_repo,
        }
    }

    /// 导入捐赠袋（按 bag_id upsert）
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn import_bags(&self, path: &Path, now: DateTime<Utc>) -> ImportResult<ImportSummary> {
        let records = CsvParser.parse_to_raw_records(path, BAG_REQUIRED_COLUMNS)?;
        let mut summary = ImportSummary {
            total_rows: records.len(),
            ..ImportSummary::default()
        };

        let mut seen = HashSet::new();
        let mut bags = Vec::new();
        for record in &records {
            match parse_bag_row(record, now) {
                Ok(bag) if !seen.insert(bag.bag_id.clone()) => {
                    summary.rejected.push(RowRejection {
                        row: record.row,
                        reason: format!("bag_id 重复: {}", bag.bag_id),
                    });
                }
                Ok(bag) => bags.push(bag),
                Err(reason) => summary.rejected.push(RowRejection {
                    row: record.row,
                    reason,
                }),
            }
        }

        summary.imported = self.bag_repo.batch_upsert(&bags)?;
        log_summary("捐赠袋", &summary);
        Ok(summary)
    }

    /// 导入订单（按 order_id upsert）
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn import_orders(&self, path: &Path) -> ImportResult<ImportSummary> {
        let records = CsvParser.parse_to_raw_records(path, ORDER_REQUIRED_COLUMNS)?;
        let mut summary = ImportSummary {
            total_rows: records.len(),
            ..ImportSummary::default()
        };

        let mut seen = HashSet::new();
        let mut orders = Vec::new();
        for record in &records {
            match parse_order_row(record) {
                Ok(order) if !seen.insert(order.order_id.clone()) => {
                    summary.rejected.push(RowRejection {
                        row: record.row,
                        reason: format!("order_id 重复: {}", order.order_id),
                    });
                }
                Ok(order) => orders.push(order),
                Err(reason) => summary.rejected.push(RowRejection {
                    row: record.row,
                    reason,
                }),
            }
        }

        summary.imported = self.order_repo.batch_upsert(&orders)?;
        log_summary("订单", &summary);
        Ok(summary)
    }
}

fn log_summary(kind: &str, summary: &ImportSummary) {
    for rejection in &summary.rejected {
        warn!(kind, row = rejection.row, reason = %rejection.reason, "导入行被跳过");
    }
    info!(
        kind,
        total_rows = summary.total_rows,
        imported = summary.imported,
        rejected = summary.rejected.len(),
        "导入完成"
    );
}

// ==========================================
// 行映射
// ==========================================

fn parse_bag_row(record: &RawRecord, now: DateTime<Utc>) -> Result<DonationBag, String> {
    let bag_id = record
        .get("bag_id")
        .ok_or_else(|| "bag_id 为空".to_string())?;

    let weight_kg = parse_non_negative(record, "weight_kg")?;

    let status = match record.get("status") {
        Some(raw) => raw.parse::<BagStatus>()?,
        None => BagStatus::Available,
    };

    let needs_cleaning = match record.get("needs_cleaning") {
        Some(raw) => parse_bool(raw)?,
        None => false,
    };

    Ok(DonationBag {
        bag_id: bag_id.to_string(),
        weight_kg,
        status,
        needs_cleaning,
        revision: 0,
        created_at: now,
        updated_at: now,
    })
}

fn parse_order_row(record: &RawRecord) -> Result<Order, String> {
    let order_id = record
        .get("order_id")
        .ok_or_else(|| "order_id 为空".to_string())?;

    let requested_quantity_kg = parse_non_negative(record, "requested_quantity_kg")?;

    let priority = record.get("priority").map(Priority::parse).transpose()?;

    let created_at = record.get("created_at").map(parse_timestamp).transpose()?;

    let status = match record.get("status") {
        Some(raw) => raw.parse::<OrderStatus>()?,
        None => OrderStatus::Pending,
    };

    Ok(Order {
        order_id: order_id.to_string(),
        priority,
        requested_quantity_kg,
        created_at,
        status,
        fulfilled_by: Vec::new(),
        pickup_date: None,
        revision: 0,
    })
}

fn parse_non_negative(record: &RawRecord, column: &str) -> Result<f64, String> {
    let raw = record
        .get(column)
        .ok_or_else(|| format!("{} 为空", column))?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| format!("{} 不是数字: {}", column, raw))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} 必须为非负数: {}", column, raw));
    }
    Ok(value)
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        other => Err(format!("needs_cleaning 不是布尔值: {}", other)),
    }
}

/// 解析时间戳（RFC3339 / `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DD`，后两者按 UTC）
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Some(dt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc());
    }
    Err(format!("created_at 时间格式错误: {}", raw))
}
