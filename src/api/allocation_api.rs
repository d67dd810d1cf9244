// ==========================================
// 捐赠物资分配引擎 - 分配 API（两阶段协议）
// ==========================================
// 流程:
// 1) propose: 读取可分配数据 -> 规划 -> 持久化 PROPOSED 提案
// 2) 外部审核
// 3) confirm: 原子提交 / decline: 仅关闭提案
// 4) expire_stale: 超时未决的提案置为 EXPIRED
// ==========================================
// 红线: 任何中止路径都不修改捐赠袋/订单
// ==========================================

use crate::api::error::{config_result, ApiError, ApiResult};
use crate::api::notice::{AbortReason, AllocationNotice};
use crate::config::{AllocationConfigReader, ConfigManager};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::commit::CommitReceipt;
use crate::domain::proposal::AllocationProposal;
use crate::domain::types::ProposalStatus;
use crate::engine::committer::PlanCommitter;
use crate::engine::pickup::{PickupScheduler, RandomPickupScheduler};
use crate::engine::planner::{AllocationPlanner, PlanningReport};
use crate::engine::subset_matcher::SubsetMatcher;
use crate::engine::summary::PlanSummary;
use crate::i18n::t_with_args;
use crate::repository::{
    ActionLogRepository, AllocationCommitRepository, AllocationProposalRepository,
    DonationBagRepository, OrderRepository, RepositoryError,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ==========================================
// 返回结构
// ==========================================

/// propose 结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResult {
    pub proposal_id: String,
    pub expires_at: DateTime<Utc>,
    pub summary: PlanSummary,
    pub report: PlanningReport,
}

/// confirm 结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub proposal_id: String,
    pub receipt: CommitReceipt,
    pub summary: PlanSummary,
}

// ==========================================
// AllocationApi - 分配 API
// ==========================================
pub struct AllocationApi {
    bag_repo: Arc<DonationBagRepository>,
    order_repo: Arc<OrderRepository>,
    proposal_repo: Arc<AllocationProposalRepository>,
    commit_repo: Arc<AllocationCommitRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
    // 指定后忽略取货偏移配置
    pickup_scheduler: Option<Arc<dyn PickupScheduler>>,
}

impl AllocationApi {
    pub fn new(
        bag_repo: Arc<DonationBagRepository>,
        order_repo: Arc<OrderRepository>,
        proposal_repo: Arc<AllocationProposalRepository>,
        commit_repo: Arc<AllocationCommitRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            bag_repo,
            order_repo,
            proposal_repo,
            commit_repo,
            action_log_repo,
            config_manager,
            pickup_scheduler: None,
        }
    }

    /// 指定取货日期调度器
    pub fn with_pickup_scheduler(mut self, scheduler: Arc<dyn PickupScheduler>) -> Self {
        self.pickup_scheduler = Some(scheduler);
        self
    }

    // ==========================================
    // 阶段一: 生成提案
    // ==========================================

    /// 生成分配提案
    ///
    /// # 错误
    /// - `ApiError::NoEligibleBags` / `ApiError::NoEligibleOrders`: 规划前中止
    /// - `ApiError::Infeasible`: 方案为空
    #[instrument(skip(self))]
    pub async fn propose(&self, actor: &str, now: DateTime<Utc>) -> ApiResult<ProposalResult> {
        validate_actor(actor)?;

        let bags = self.bag_repo.list_eligible()?;
        if bags.is_empty() {
            info!("没有可分配的捐赠袋，中止");
            return Err(ApiError::NoEligibleBags);
        }

        let orders = self.order_repo.list_eligible()?;
        if orders.is_empty() {
            info!("没有待分配的订单，中止");
            return Err(ApiError::NoEligibleOrders);
        }

        let planner = AllocationPlanner::new(self.build_matcher().await?);
        let report = planner.plan(&bags, &orders, now)?;

        if report.plan.is_empty() {
            info!(
                rejected = report.rejected.len(),
                unmatched = report.unmatched.len(),
                "没有可行分配，中止"
            );
            return Err(ApiError::Infeasible {
                rejected: report.rejected.len(),
                unmatched: report.unmatched.len(),
            });
        }

        let ttl = config_result(self.config_manager.get_proposal_ttl_minutes().await)?;
        let expires_at = Duration::try_minutes(ttl)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                ApiError::ConfigError(format!("提案有效期超出可表示范围: ttl_minutes={}", ttl))
            })?;
        let config_snapshot = config_result(self.config_manager.get_config_snapshot())?;

        let proposal = AllocationProposal {
            proposal_id: uuid::Uuid::new_v4().to_string(),
            status: ProposalStatus::Proposed,
            plan: report.plan.clone(),
            snapshot: report.snapshot.clone(),
            config_snapshot_json: Some(config_snapshot),
            created_by: actor.to_string(),
            created_at: now,
            expires_at,
            decided_by: None,
            decided_at: None,
            failure_reason: None,
        };
        self.proposal_repo.insert(&proposal)?;

        let summary = PlanSummary::from_report(&report);
        self.action_log_repo.insert(
            &ActionLog::new(ActionType::Propose, actor, now)
                .with_proposal(&proposal.proposal_id)
                .with_payload(json!({
                    "allocations": report.plan.allocations.len(),
                    "bags_used": summary.total_bags_used,
                    "total_weight_kg": summary.total_weight_kg,
                    "rejected": report.rejected,
                    "unmatched": report.unmatched,
                    "expires_at": proposal.expires_at,
                })),
        )?;

        info!(
            proposal_id = %proposal.proposal_id,
            allocations = report.plan.allocations.len(),
            "分配提案已生成"
        );

        Ok(ProposalResult {
            proposal_id: proposal.proposal_id,
            expires_at: proposal.expires_at,
            summary,
            report,
        })
    }

    // ==========================================
    // 阶段二: 确认 / 拒绝
    // ==========================================

    /// 确认并提交提案
    ///
    /// # 错误
    /// - `ApiError::ProposalNotFound` / `ApiError::ProposalClosed`
    /// - `ApiError::ProposalExpired`: 提案已超时（同时置为 EXPIRED）
    /// - `ApiError::StalePlan` / `ApiError::CommitFailed`: 整批回滚，提案置为 FAILED
    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        proposal_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<CommitResult> {
        validate_actor(actor)?;
        let proposal = self.load_open_proposal(proposal_id)?;

        if proposal.is_expired_at(now) {
            self.expire_one(&proposal, now)?;
            return Err(ApiError::ProposalExpired(proposal_id.to_string()));
        }

        let committer = PlanCommitter::new(self.commit_repo.clone(), self.scheduler().await?);
        let outcome = committer.commit(
            &proposal.plan,
            &proposal.snapshot,
            actor,
            now,
            Some(proposal_id),
        );

        match outcome {
            Ok(receipt) => {
                let pickup_dates: serde_json::Map<String, serde_json::Value> = receipt
                    .pickup_dates
                    .iter()
                    .map(|(order_id, date)| (order_id.clone(), json!(date)))
                    .collect();
                // 分配已落库，此后只记录告警
                if let Err(e) = self.action_log_repo.insert(
                    &ActionLog::new(ActionType::Commit, actor, now)
                        .with_proposal(proposal_id)
                        .with_payload(json!({
                            "orders_updated": receipt.orders_updated,
                            "bags_updated": receipt.bags_updated,
                            "pickup_dates": pickup_dates,
                        })),
                ) {
                    warn!(error = %e, %proposal_id, "提交已生效，但操作日志写入失败");
                }

                Ok(CommitResult {
                    proposal_id: proposal_id.to_string(),
                    summary: summarize(&proposal),
                    receipt,
                })
            }
            Err(commit_err) => {
                let err = ApiError::from(commit_err);
                let reason = err.to_string();

                // 提交事务已回滚，这里单独关闭提案
                match self.proposal_repo.close(
                    proposal_id,
                    ProposalStatus::Failed,
                    actor,
                    now,
                    Some(&reason),
                ) {
                    Ok(()) => {}
                    Err(e @ RepositoryError::StaleState { .. }) => {
                        warn!(error = %e, "提案状态已被并发修改，保留现状");
                    }
                    Err(e) => return Err(e.into()),
                }

                self.action_log_repo.insert(
                    &ActionLog::new(ActionType::CommitFailed, actor, now)
                        .with_proposal(proposal_id)
                        .with_detail(reason),
                )?;

                Err(err)
            }
        }
    }

    /// 拒绝提案（用户层面的空操作，只关闭提案）
    #[instrument(skip(self))]
    pub fn decline(
        &self,
        proposal_id: &str,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<AllocationNotice> {
        validate_actor(actor)?;
        self.load_open_proposal(proposal_id)?;

        self.proposal_repo
            .close(proposal_id, ProposalStatus::Declined, actor, now, reason)
            .map_err(|e| closed_or(e, proposal_id))?;

        let mut log = ActionLog::new(ActionType::Decline, actor, now).with_proposal(proposal_id);
        if let Some(reason) = reason {
            log = log.with_detail(reason);
        }
        self.action_log_repo.insert(&log)?;

        info!(%proposal_id, "提案已被拒绝");

        Ok(AllocationNotice {
            reason: AbortReason::ConfirmationDeclined,
            message: t_with_args("notice.confirmation_declined", &[("proposal_id", proposal_id)]),
            proposal_id: Some(proposal_id.to_string()),
        })
    }

    /// 将超时未决的提案置为 EXPIRED
    ///
    /// # 返回
    /// - 被过期的提案数量
    #[instrument(skip(self))]
    pub fn expire_stale(&self, now: DateTime<Utc>) -> ApiResult<usize> {
        let expired = self.proposal_repo.expire_before(now)?;

        let logs: Vec<ActionLog> = expired
            .iter()
            .map(|id| ActionLog::new(ActionType::Expire, "system", now).with_proposal(id))
            .collect();
        self.action_log_repo.batch_insert(&logs)?;

        if !expired.is_empty() {
            info!(count = expired.len(), "已过期未决提案");
        }
        Ok(expired.len())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_proposal(&self, proposal_id: &str) -> ApiResult<AllocationProposal> {
        self.proposal_repo
            .find_by_id(proposal_id)?
            .ok_or_else(|| ApiError::ProposalNotFound(proposal_id.to_string()))
    }

    pub fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
    ) -> ApiResult<Vec<AllocationProposal>> {
        Ok(self.proposal_repo.list(status)?)
    }

    /// 提案的操作记录（按时间正序）
    pub fn proposal_history(&self, proposal_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self.action_log_repo.list_by_proposal(proposal_id)?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    async fn build_matcher(&self) -> ApiResult<SubsetMatcher> {
        let strategy = config_result(self.config_manager.get_match_strategy().await)?;
        let limit = config_result(self.config_manager.get_exhaustive_max_candidates().await)?;
        Ok(SubsetMatcher::new(strategy).with_exhaustive_max_candidates(limit))
    }

    async fn scheduler(&self) -> ApiResult<Arc<dyn PickupScheduler>> {
        if let Some(scheduler) = &self.pickup_scheduler {
            return Ok(scheduler.clone());
        }
        let (min, max) = config_result(self.config_manager.get_pickup_offset_range().await)?;
        Ok(Arc::new(RandomPickupScheduler::new(min, max)?))
    }

    fn load_open_proposal(&self, proposal_id: &str) -> ApiResult<AllocationProposal> {
        let proposal = self.get_proposal(proposal_id)?;
        if proposal.status != ProposalStatus::Proposed {
            return Err(ApiError::ProposalClosed {
                proposal_id: proposal_id.to_string(),
                status: proposal.status.to_string(),
            });
        }
        Ok(proposal)
    }

    fn expire_one(&self, proposal: &AllocationProposal, now: DateTime<Utc>) -> ApiResult<()> {
        self.proposal_repo
            .close(
                &proposal.proposal_id,
                ProposalStatus::Expired,
                "system",
                now,
                Some("提案超时未确认"),
            )
            .map_err(|e| closed_or(e, &proposal.proposal_id))?;

        self.action_log_repo.insert(
            &ActionLog::new(ActionType::Expire, "system", now).with_proposal(&proposal.proposal_id),
        )?;

        warn!(proposal_id = %proposal.proposal_id, "提案已超时");
        Ok(())
    }
}

fn validate_actor(actor: &str) -> ApiResult<()> {
    if actor.trim().is_empty() {
        return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
    }
    Ok(())
}

fn summarize(proposal: &AllocationProposal) -> PlanSummary {
    PlanSummary::from_report(&PlanningReport {
        plan: proposal.plan.clone(),
        ..PlanningReport::default()
    })
}

/// 提案状态并发变更 -> ProposalClosed
fn closed_or(err: RepositoryError, proposal_id: &str) -> ApiError {
    match err {
        RepositoryError::StaleState { actual, .. } => ApiError::ProposalClosed {
            proposal_id: proposal_id.to_string(),
            status: actual,
        },
        RepositoryError::NotFound { .. } => ApiError::ProposalNotFound(proposal_id.to_string()),
        other => other.into(),
    }
}
