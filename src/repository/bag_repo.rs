// ==========================================
// 捐赠物资分配引擎 - 捐赠袋数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化
// ==========================================

use crate::domain::bag::DonationBag;
use crate::domain::types::BagStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::time_fmt::{format_ts, parse_ts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT bag_id, weight_kg, status, needs_cleaning, revision, created_at, updated_at
    FROM donation_bag
"#;

/// 行原始值（先按原始类型读取，再在仓储层外转换领域类型）
struct BagRow {
    bag_id: String,
    weight_kg: f64,
    status: String,
    needs_cleaning: bool,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl BagRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            bag_id: row.get(0)?,
            weight_kg: row.get(1)?,
            status: row.get(2)?,
            needs_cleaning: row.get::<_, i64>(3)? != 0,
            revision: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_domain(self) -> RepositoryResult<DonationBag> {
        let status = self
            .status
            .parse::<BagStatus>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "donation_bag.status".to_string(),
                message,
            })?;

        Ok(DonationBag {
            bag_id: self.bag_id,
            weight_kg: self.weight_kg,
            status,
            needs_cleaning: self.needs_cleaning,
            revision: self.revision,
            created_at: parse_ts("donation_bag.created_at", &self.created_at)?,
            updated_at: parse_ts("donation_bag.updated_at", &self.updated_at)?,
        })
    }
}

// ==========================================
// DonationBagRepository - 捐赠袋仓储
// ==========================================
pub struct DonationBagRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DonationBagRepository {
    /// 创建新的DonationBagRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入捐赠袋
    pub fn insert(&self, bag: &DonationBag) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO donation_bag (
                bag_id, weight_kg, status, needs_cleaning, revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                bag.bag_id,
                bag.weight_kg,
                bag.status.as_str(),
                bag.needs_cleaning as i32,
                bag.revision,
                format_ts(&bag.created_at),
                format_ts(&bag.updated_at),
            ],
        )?;

        Ok(())
    }

    /// 批量写入捐赠袋（upsert）
    ///
    /// # 说明
    /// - 已存在的 bag_id 更新重量/状态/清洗标记，revision + 1
    /// - 使用事务确保原子性
    pub fn batch_upsert(&self, bags: &[DonationBag]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO donation_bag (
                    bag_id, weight_kg, status, needs_cleaning, revision, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(bag_id) DO UPDATE SET
                    weight_kg = excluded.weight_kg,
                    status = excluded.status,
                    needs_cleaning = excluded.needs_cleaning,
                    revision = donation_bag.revision + 1,
                    updated_at = excluded.updated_at
                "#,
            )?;

            for bag in bags {
                stmt.execute(params![
                    bag.bag_id,
                    bag.weight_kg,
                    bag.status.as_str(),
                    bag.needs_cleaning as i32,
                    bag.revision,
                    format_ts(&bag.created_at),
                    format_ts(&bag.updated_at),
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    /// 按 bag_id 查询
    pub fn find_by_id(&self, bag_id: &str) -> RepositoryResult<Option<DonationBag>> {
        let conn = self.get_conn()?;

        let row = conn
            .query_row(
                &format!("{} WHERE bag_id = ?1", SELECT_COLUMNS),
                params![bag_id],
                BagRow::read,
            )
            .optional()?;

        row.map(BagRow::into_domain).transpose()
    }

    /// 查询可分配捐赠袋（AVAILABLE 且无需清洗）
    ///
    /// 顺序固定为 created_at, bag_id 升序：候选列表顺序决定子集平局的结果
    pub fn list_eligible(&self) -> RepositoryResult<Vec<DonationBag>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'AVAILABLE' AND needs_cleaning = 0 ORDER BY created_at ASC, bag_id ASC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], BagRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(BagRow::into_domain).collect()
    }

    /// 按状态查询
    pub fn list_by_status(&self, status: BagStatus) -> RepositoryResult<Vec<DonationBag>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = ?1 ORDER BY created_at ASC, bag_id ASC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![status.as_str()], BagRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(BagRow::into_domain).collect()
    }

    /// 标记清洗完成（needs_cleaning = false）
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: bag_id 不存在
    pub fn mark_cleaned(&self, bag_id: &str, now: DateTime<Utc>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            r#"UPDATE donation_bag
               SET needs_cleaning = 0, revision = revision + 1, updated_at = ?2
               WHERE bag_id = ?1"#,
            params![bag_id, format_ts(&now)],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DonationBag".to_string(),
                id: bag_id.to_string(),
            });
        }

        Ok(())
    }
}
