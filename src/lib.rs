// ==========================================
// 捐赠物资分配引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统 (人工确认后才提交)
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 评分/匹配/规划/提交
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BagStatus, OrderStatus, Priority, ProposalStatus};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Allocation, AllocationPlan, AllocationProposal, DonationBag, Order,
    PlanSnapshot, ScoredOrder,
};

// 引擎
pub use engine::{
    AllocationPlanner, ImportanceScorer, MatchStrategy, PlanCommitter, PlanSummary,
    PlanningReport, SubsetMatcher,
};

// API
pub use api::{AbortReason, AllocationApi, AllocationNotice, ApiError, InventoryApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "捐赠物资分配引擎";
