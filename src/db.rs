// ==========================================
// 捐赠物资分配引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表脚本，保证仓储层与测试使用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建表脚本（幂等）
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS donation_bag (
    bag_id TEXT PRIMARY KEY,
    weight_kg REAL NOT NULL CHECK(weight_kg >= 0),
    status TEXT NOT NULL CHECK(status IN ('AVAILABLE', 'RESERVED', 'IN_TRANSIT', 'DELIVERED')),
    needs_cleaning INTEGER NOT NULL DEFAULT 0,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_donation_bag_status ON donation_bag(status, needs_cleaning);

CREATE TABLE IF NOT EXISTS donation_order (
    order_id TEXT PRIMARY KEY,
    priority INTEGER,
    requested_quantity_kg REAL NOT NULL,
    created_at TEXT,
    status TEXT NOT NULL CHECK(status IN ('PENDING', 'ALLOCATED', 'IN_TRANSIT', 'DELIVERED')),
    pickup_date TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_donation_order_status ON donation_order(status);

CREATE TABLE IF NOT EXISTS order_fulfillment (
    order_id TEXT NOT NULL REFERENCES donation_order(order_id) ON DELETE CASCADE,
    seq_no INTEGER NOT NULL,
    bag_id TEXT NOT NULL UNIQUE REFERENCES donation_bag(bag_id),
    PRIMARY KEY (order_id, seq_no)
);

CREATE TABLE IF NOT EXISTS allocation_proposal (
    proposal_id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK(status IN ('PROPOSED', 'COMMITTED', 'DECLINED', 'EXPIRED', 'FAILED')),
    plan_json TEXT NOT NULL,
    snapshot_json TEXT NOT NULL,
    config_snapshot_json TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    decided_by TEXT,
    decided_at TEXT,
    failure_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_allocation_proposal_status ON allocation_proposal(status, expires_at);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    proposal_id TEXT,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    payload_json TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_action_log_proposal ON action_log(proposal_id);
CREATE INDEX IF NOT EXISTS idx_action_log_ts ON action_log(action_ts DESC);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema（幂等），并登记当前 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
