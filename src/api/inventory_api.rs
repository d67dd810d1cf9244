// ==========================================
// 捐赠物资分配引擎 - 库存 API
// ==========================================
// 职责: 分配引擎的上下游数据边界
// - 可分配捐赠袋/订单查询
// - 清洗完成登记
// - CSV 导入
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::bag::DonationBag;
use crate::domain::order::Order;
use crate::importer::{ImportSummary, InventoryCsvImporter};
use crate::repository::{ActionLogRepository, DonationBagRepository, OrderRepository};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct InventoryApi {
    bag_repo: Arc<DonationBagRepository>,
    order_repo: Arc<OrderRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    importer: InventoryCsvImporter,
}

impl InventoryApi {
    pub fn new(
        bag_repo: Arc<DonationBagRepository>,
        order_repo: Arc<OrderRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        let importer = InventoryCsvImporter::new(bag_repo.clone(), order_repo.clone());
        Self {
            bag_repo,
            order_repo,
            action_log_repo,
            importer,
        }
    }

    /// 可分配捐赠袋（AVAILABLE 且无需清洗）
    pub fn list_eligible_bags(&self) -> ApiResult<Vec<DonationBag>> {
        Ok(self.bag_repo.list_eligible()?)
    }

    /// 待分配订单（PENDING 且未履约）
    pub fn list_eligible_orders(&self) -> ApiResult<Vec<Order>> {
        Ok(self.order_repo.list_eligible()?)
    }

    pub fn get_bag(&self, bag_id: &str) -> ApiResult<DonationBag> {
        self.bag_repo
            .find_by_id(bag_id)?
            .ok_or_else(|| ApiError::NotFound(format!("DonationBag(id={})不存在", bag_id)))
    }

    pub fn get_order(&self, order_id: &str) -> ApiResult<Order> {
        self.order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Order(id={})不存在", order_id)))
    }

    /// 登记清洗完成
    #[instrument(skip(self))]
    pub fn mark_cleaned(&self, bag_id: &str, actor: &str, now: DateTime<Utc>) -> ApiResult<()> {
        if bag_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("bag_id 不能为空".to_string()));
        }

        self.bag_repo.mark_cleaned(bag_id, now)?;
        self.action_log_repo.insert(
            &ActionLog::new(ActionType::MarkCleaned, actor, now)
                .with_detail(format!("bag_id={}", bag_id)),
        )?;

        info!(%bag_id, "捐赠袋清洗完成");
        Ok(())
    }

    /// 导入捐赠袋 CSV
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn import_bags(
        &self,
        path: &Path,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<ImportSummary> {
        let summary = self.importer.import_bags(path, now)?;
        self.log_import(ActionType::ImportBags, path, actor, now, &summary)?;
        Ok(summary)
    }

    /// 导入订单 CSV
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn import_orders(
        &self,
        path: &Path,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<ImportSummary> {
        let summary = self.importer.import_orders(path)?;
        self.log_import(ActionType::ImportOrders, path, actor, now, &summary)?;
        Ok(summary)
    }

    fn log_import(
        &self,
        action_type: ActionType,
        path: &Path,
        actor: &str,
        now: DateTime<Utc>,
        summary: &ImportSummary,
    ) -> ApiResult<()> {
        let payload = serde_json::to_value(summary)
            .map_err(|e| ApiError::InternalError(format!("导入摘要序列化失败: {}", e)))?;
        self.action_log_repo.insert(
            &ActionLog::new(action_type, actor, now)
                .with_payload(payload)
                .with_detail(path.display().to_string()),
        )?;
        Ok(())
    }
}
