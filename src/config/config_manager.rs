// ==========================================
// 捐赠物资分配引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocation_config_trait::{AllocationConfigReader, ConfigResult};
use crate::db::open_sqlite_connection;
use crate::engine::pickup::{
    DEFAULT_PICKUP_MAX_OFFSET_DAYS, DEFAULT_PICKUP_MIN_OFFSET_DAYS, MAX_PICKUP_OFFSET_DAYS,
};
use crate::engine::subset_matcher::{
    MatchStrategy, DEFAULT_EXHAUSTIVE_MAX_CANDIDATES, EXHAUSTIVE_HARD_LIMIT,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 提案默认有效期（分钟）
pub const DEFAULT_PROPOSAL_TTL_MINUTES: i64 = 30;
/// 提案有效期上限（7 天）
pub const MAX_PROPOSAL_TTL_MINUTES: i64 = 7 * 24 * 60;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 的配置值（upsert）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 生成提案时记录配置快照，便于事后追溯方案依据
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    fn get_i64_or_default(&self, key: &str, default: i64) -> ConfigResult<i64> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, default, "配置值不是整数，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// AllocationConfigReader Trait 实现
// ==========================================
#[async_trait]
impl AllocationConfigReader for ConfigManager {
    async fn get_pickup_offset_range(&self) -> ConfigResult<(i64, i64)> {
        let min = self.get_i64_or_default(
            config_keys::PICKUP_OFFSET_MIN_DAYS,
            DEFAULT_PICKUP_MIN_OFFSET_DAYS,
        )?;
        let max = self.get_i64_or_default(
            config_keys::PICKUP_OFFSET_MAX_DAYS,
            DEFAULT_PICKUP_MAX_OFFSET_DAYS,
        )?;

        if min < 0 || max < min || max > MAX_PICKUP_OFFSET_DAYS {
            tracing::warn!(
                min,
                max,
                upper_bound = MAX_PICKUP_OFFSET_DAYS,
                "取货偏移区间非法，使用默认值"
            );
            return Ok((DEFAULT_PICKUP_MIN_OFFSET_DAYS, DEFAULT_PICKUP_MAX_OFFSET_DAYS));
        }
        Ok((min, max))
    }

    async fn get_proposal_ttl_minutes(&self) -> ConfigResult<i64> {
        let ttl = self.get_i64_or_default(
            config_keys::PROPOSAL_TTL_MINUTES,
            DEFAULT_PROPOSAL_TTL_MINUTES,
        )?;

        if ttl <= 0 || ttl > MAX_PROPOSAL_TTL_MINUTES {
            tracing::warn!(
                ttl,
                upper_bound = MAX_PROPOSAL_TTL_MINUTES,
                "提案有效期超出 (0, 上限]，使用默认值"
            );
            return Ok(DEFAULT_PROPOSAL_TTL_MINUTES);
        }
        Ok(ttl)
    }

    async fn get_match_strategy(&self) -> ConfigResult<MatchStrategy> {
        let Some(raw) = self.get_global_config_value(config_keys::MATCH_STRATEGY)? else {
            return Ok(MatchStrategy::BranchAndBound);
        };

        Ok(raw.parse::<MatchStrategy>().unwrap_or_else(|e| {
            tracing::warn!(raw_value = %raw, error = %e, "匹配策略配置非法，使用 BRANCH_AND_BOUND");
            MatchStrategy::BranchAndBound
        }))
    }

    async fn get_exhaustive_max_candidates(&self) -> ConfigResult<usize> {
        let limit = self.get_i64_or_default(
            config_keys::EXHAUSTIVE_MAX_CANDIDATES,
            DEFAULT_EXHAUSTIVE_MAX_CANDIDATES as i64,
        )?;

        match usize::try_from(limit) {
            Ok(v) if (1..=EXHAUSTIVE_HARD_LIMIT).contains(&v) => Ok(v),
            _ => {
                tracing::warn!(
                    limit,
                    hard_limit = EXHAUSTIVE_HARD_LIMIT,
                    "穷举候选上限超出范围，使用默认值"
                );
                Ok(DEFAULT_EXHAUSTIVE_MAX_CANDIDATES)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 取货日期
    pub const PICKUP_OFFSET_MIN_DAYS: &str = "pickup_offset_min_days";
    pub const PICKUP_OFFSET_MAX_DAYS: &str = "pickup_offset_max_days";

    // 两阶段提交
    pub const PROPOSAL_TTL_MINUTES: &str = "proposal_ttl_minutes";

    // 子集匹配
    pub const MATCH_STRATEGY: &str = "match_strategy";
    pub const EXHAUSTIVE_MAX_CANDIDATES: &str = "exhaustive_max_candidates";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let cm = manager();
        assert_eq!(cm.get_pickup_offset_range().await.unwrap(), (1, 2));
        assert_eq!(cm.get_proposal_ttl_minutes().await.unwrap(), 30);
        assert_eq!(
            cm.get_match_strategy().await.unwrap(),
            MatchStrategy::BranchAndBound
        );
        assert_eq!(cm.get_exhaustive_max_candidates().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_overrides_are_read() {
        let cm = manager();
        cm.set_global_config_value(config_keys::PICKUP_OFFSET_MIN_DAYS, "0").unwrap();
        cm.set_global_config_value(config_keys::PICKUP_OFFSET_MAX_DAYS, "5").unwrap();
        cm.set_global_config_value(config_keys::MATCH_STRATEGY, "exhaustive").unwrap();
        cm.set_global_config_value(config_keys::EXHAUSTIVE_MAX_CANDIDATES, "12").unwrap();

        assert_eq!(cm.get_pickup_offset_range().await.unwrap(), (0, 5));
        assert_eq!(cm.get_match_strategy().await.unwrap(), MatchStrategy::Exhaustive);
        assert_eq!(cm.get_exhaustive_max_candidates().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_invalid_values_fall_back() {
        let cm = manager();
        cm.set_global_config_value(config_keys::PICKUP_OFFSET_MIN_DAYS, "3").unwrap();
        cm.set_global_config_value(config_keys::PICKUP_OFFSET_MAX_DAYS, "1").unwrap();
        cm.set_global_config_value(config_keys::PROPOSAL_TTL_MINUTES, "abc").unwrap();
        cm.set_global_config_value(config_keys::MATCH_STRATEGY, "GREEDY").unwrap();
        cm.set_global_config_value(config_keys::EXHAUSTIVE_MAX_CANDIDATES, "64").unwrap();

        assert_eq!(cm.get_pickup_offset_range().await.unwrap(), (1, 2));
        assert_eq!(cm.get_proposal_ttl_minutes().await.unwrap(), 30);
        assert_eq!(
            cm.get_match_strategy().await.unwrap(),
            MatchStrategy::BranchAndBound
        );
        assert_eq!(cm.get_exhaustive_max_candidates().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_out_of_bound_values_fall_back() {
        let cm = manager();
        cm.set_global_config_value(config_keys::PICKUP_OFFSET_MIN_DAYS, "0").unwrap();
        cm.set_global_config_value(
            config_keys::PICKUP_OFFSET_MAX_DAYS,
            &i64::MAX.to_string(),
        )
        .unwrap();
        cm.set_global_config_value(
            config_keys::PROPOSAL_TTL_MINUTES,
            &i64::MAX.to_string(),
        )
        .unwrap();

        assert_eq!(cm.get_pickup_offset_range().await.unwrap(), (1, 2));
        assert_eq!(cm.get_proposal_ttl_minutes().await.unwrap(), 30);

        cm.set_global_config_value(
            config_keys::PICKUP_OFFSET_MAX_DAYS,
            &MAX_PICKUP_OFFSET_DAYS.to_string(),
        )
        .unwrap();
        cm.set_global_config_value(
            config_keys::PROPOSAL_TTL_MINUTES,
            &MAX_PROPOSAL_TTL_MINUTES.to_string(),
        )
        .unwrap();

        assert_eq!(
            cm.get_pickup_offset_range().await.unwrap(),
            (0, MAX_PICKUP_OFFSET_DAYS)
        );
        assert_eq!(
            cm.get_proposal_ttl_minutes().await.unwrap(),
            MAX_PROPOSAL_TTL_MINUTES
        );
    }

    #[test]
    fn test_snapshot_is_sorted_json() {
        let cm = manager();
        cm.set_global_config_value("proposal_ttl_minutes", "45").unwrap();
        cm.set_global_config_value("match_strategy", "EXHAUSTIVE").unwrap();

        let snapshot = cm.get_config_snapshot().unwrap();
        assert_eq!(
            snapshot,
            r#"{"match_strategy":"EXHAUSTIVE","proposal_ttl_minutes":"45"}"#
        );

        cm.set_global_config_value("proposal_ttl_minutes", "60").unwrap();
        assert_eq!(
            cm.get_global_config_value("proposal_ttl_minutes").unwrap().as_deref(),
            Some("60")
        );
    }
}
