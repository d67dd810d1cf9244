// ==========================================
// 捐赠物资分配引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository/Engine错误为用户可读的错误消息
// 约束: 所有中止路径都能映射为 AllocationNotice
// ==========================================

use crate::api::notice::{AbortReason, AllocationNotice};
use crate::config::ConfigResult;
use crate::engine::error::{CommitError, EngineError};
use crate::i18n::{t, t_with_args};
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 规划中止（不修改任何数据）
    // ==========================================
    #[error("没有可分配的捐赠袋")]
    NoEligibleBags,

    #[error("没有待分配的订单")]
    NoEligibleOrders,

    #[error("没有任何订单能被完整满足: rejected={rejected}, unmatched={unmatched}")]
    Infeasible { rejected: usize, unmatched: usize },

    // ==========================================
    // 两阶段协议
    // ==========================================
    #[error("提案不存在: {0}")]
    ProposalNotFound(String),

    #[error("提案已过期: {0}")]
    ProposalExpired(String),

    #[error("提案已关闭: proposal_id={proposal_id}, status={status}")]
    ProposalClosed { proposal_id: String, status: String },

    // ==========================================
    // 提交失败（整批回滚）
    // ==========================================
    #[error("方案已过期，数据已被并发修改: {0}")]
    StalePlan(String),

    #[error("提交失败: {0}")]
    CommitFailed(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("引擎错误: {0}")]
    EngineError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            e @ (RepositoryError::OptimisticLockFailure { .. }
            | RepositoryError::StaleState { .. }) => ApiError::StalePlan(e.to_string()),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InternalError(format!("字段{}数据错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError / CommitError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidConfig(msg) => ApiError::ConfigError(msg),
            other => ApiError::EngineError(other.to_string()),
        }
    }
}

impl From<CommitError> for ApiError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::StalePlan(e) => ApiError::StalePlan(e.to_string()),
            other => ApiError::CommitFailed(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(e) => ApiError::from(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

impl ApiError {
    /// 配置读取错误
    pub fn config(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ApiError::ConfigError(err.to_string())
    }

    /// 中止路径对应的结构化通知
    ///
    /// # 返回
    /// - Some(AllocationNotice): 规划/确认/提交的中止原因
    /// - None: 非中止类错误（输入错误、数据库故障等）
    pub fn notice(&self) -> Option<AllocationNotice> {
        let (reason, message) = match self {
            ApiError::NoEligibleBags => (
                AbortReason::NoEligibleBags,
                t("notice.no_eligible_bags"),
            ),
            ApiError::NoEligibleOrders => (
                AbortReason::NoEligibleOrders,
                t("notice.no_eligible_orders"),
            ),
            ApiError::Infeasible { .. } => (
                AbortReason::Infeasible,
                t("notice.infeasible"),
            ),
            ApiError::ProposalExpired(id) => (
                AbortReason::ProposalExpired,
                t_with_args("notice.proposal_expired", &[("proposal_id", id.as_str())]),
            ),
            ApiError::StalePlan(detail) => (
                AbortReason::CommitFailed,
                t_with_args("notice.stale_plan", &[("detail", detail.as_str())]),
            ),
            ApiError::CommitFailed(detail) => (
                AbortReason::CommitFailed,
                t_with_args("notice.commit_failed", &[("detail", detail.as_str())]),
            ),
            _ => return None,
        };

        Some(AllocationNotice {
            reason,
            message,
            proposal_id: None,
        })
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 配置读取结果转换
pub(crate) fn config_result<T>(result: ConfigResult<T>) -> ApiResult<T> {
    result.map_err(ApiError::config)
}
