// ==========================================
// 捐赠物资分配引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AllocationApi, InventoryApi};
use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::repository::{
    ActionLogRepository, AllocationCommitRepository, AllocationProposalRepository,
    DonationBagRepository, OrderRepository,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "REGAIN_ALLOCATION_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源（单一共享连接）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 分配API（两阶段协议）
    pub allocation_api: Arc<AllocationApi>,

    /// 库存API
    pub inventory_api: Arc<InventoryApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并初始化 schema（幂等）
    /// 2. 初始化所有Repository
    /// 3. 创建所有API实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let bag_repo = Arc::new(DonationBagRepository::new(conn.clone()));
        let order_repo = Arc::new(OrderRepository::new(conn.clone()));
        let proposal_repo = Arc::new(AllocationProposalRepository::new(conn.clone()));
        let commit_repo = Arc::new(AllocationCommitRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        // 配置管理器（共享连接）
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 创建API实例
        // ==========================================
        let allocation_api = Arc::new(AllocationApi::new(
            bag_repo.clone(),
            order_repo.clone(),
            proposal_repo,
            commit_repo,
            action_log_repo.clone(),
            config_manager.clone(),
        ));
        let inventory_api = Arc::new(InventoryApi::new(
            bag_repo,
            order_repo,
            action_log_repo.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            allocation_api,
            inventory_api,
            config_manager,
            action_log_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 REGAIN_ALLOCATION_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./regain_allocation.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        let dir = data_dir.join("regain-allocation-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("regain-allocation");

        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("regain_allocation.db");
        }
    }

    path.to_string_lossy().to_string()
}
