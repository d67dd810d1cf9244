// ==========================================
// 捐赠物资分配引擎 - 订单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 存储: donation_order + order_fulfillment (fulfilled_by 有序明细)
// ==========================================

use crate::domain::order::Order;
use crate::domain::types::OrderStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::time_fmt::{format_date, format_ts, parse_date, parse_ts};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT order_id, priority, requested_quantity_kg, created_at, status, pickup_date, revision
    FROM donation_order
"#;

struct OrderRow {
    order_id: String,
    priority: Option<i64>,
    requested_quantity_kg: f64,
    created_at: Option<String>,
    status: String,
    pickup_date: Option<String>,
    revision: i64,
}

impl OrderRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            order_id: row.get(0)?,
            priority: row.get(1)?,
            requested_quantity_kg: row.get(2)?,
            created_at: row.get(3)?,
            status: row.get(4)?,
            pickup_date: row.get(5)?,
            revision: row.get(6)?,
        })
    }

    fn into_domain(self, fulfilled_by: Vec<String>) -> RepositoryResult<Order> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|message| RepositoryError::FieldValueError {
                field: "donation_order.status".to_string(),
                message,
            })?;

        Ok(Order {
            order_id: self.order_id,
            priority: self.priority,
            requested_quantity_kg: self.requested_quantity_kg,
            created_at: self
                .created_at
                .as_deref()
                .map(|raw| parse_ts("donation_order.created_at", raw))
                .transpose()?,
            status,
            fulfilled_by,
            pickup_date: self
                .pickup_date
                .as_deref()
                .map(|raw| parse_date("donation_order.pickup_date", raw))
                .transpose()?,
            revision: self.revision,
        })
    }
}

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入订单（含 fulfilled_by 明细）
    pub fn insert(&self, order: &Order) -> RepositoryResult<()> {
        self.batch_upsert(std::slice::from_ref(order)).map(|_| ())
    }

    /// 批量写入订单（upsert）
    ///
    /// # 说明
    /// - 已存在的 order_id 更新全部字段，revision + 1
    /// - fulfilled_by 明细整体替换
    /// - 使用事务确保原子性
    pub fn batch_upsert(&self, orders: &[Order]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = format_ts(&Utc::now());

        let mut count = 0;
        {
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO donation_order (
                    order_id, priority, requested_quantity_kg, created_at,
                    status, pickup_date, revision, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(order_id) DO UPDATE SET
                    priority = excluded.priority,
                    requested_quantity_kg = excluded.requested_quantity_kg,
                    created_at = excluded.created_at,
                    status = excluded.status,
                    pickup_date = excluded.pickup_date,
                    revision = donation_order.revision + 1,
                    updated_at = excluded.updated_at
                "#,
            )?;
            let mut clear = tx.prepare("DELETE FROM order_fulfillment WHERE order_id = ?1")?;
            let mut link = tx.prepare(
                "INSERT INTO order_fulfillment (order_id, seq_no, bag_id) VALUES (?1, ?2, ?3)",
            )?;

            for order in orders {
                upsert.execute(params![
                    order.order_id,
                    order.priority,
                    order.requested_quantity_kg,
                    order.created_at.map(|t| format_ts(&t)),
                    order.status.as_str(),
                    order.pickup_date.map(|d| format_date(&d)),
                    order.revision,
                    now,
                ])?;

                clear.execute(params![order.order_id])?;
                for (seq_no, bag_id) in order.fulfilled_by.iter().enumerate() {
                    link.execute(params![order.order_id, seq_no as i64, bag_id])?;
                }
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    /// 按 order_id 查询
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;

        let row = conn
            .query_row(
                &format!("{} WHERE order_id = ?1", SELECT_COLUMNS),
                params![order_id],
                OrderRow::read,
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT bag_id FROM order_fulfillment WHERE order_id = ?1 ORDER BY seq_no ASC",
        )?;
        let fulfilled_by = stmt
            .query_map(params![order_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        row.into_domain(fulfilled_by).map(Some)
    }

    /// 查询可分配订单（PENDING 且 fulfilled_by 为空）
    ///
    /// 顺序固定为 created_at, order_id 升序：同分订单按此顺序处理
    pub fn list_eligible(&self) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"{} WHERE status = 'PENDING'
                 AND NOT EXISTS (
                     SELECT 1 FROM order_fulfillment f
                     WHERE f.order_id = donation_order.order_id
                 )
               ORDER BY created_at ASC, order_id ASC"#,
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], OrderRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| row.into_domain(Vec::new()))
            .collect()
    }

    /// 按状态查询（含 fulfilled_by）
    pub fn list_by_status(&self, status: OrderStatus) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = ?1 ORDER BY created_at ASC, order_id ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![status.as_str()], OrderRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut links = conn.prepare(
            r#"SELECT f.order_id, f.bag_id
               FROM order_fulfillment f
               JOIN donation_order o ON o.order_id = f.order_id
               WHERE o.status = ?1
               ORDER BY f.order_id ASC, f.seq_no ASC"#,
        )?;
        let mut fulfilled: HashMap<String, Vec<String>> = HashMap::new();
        let pairs = links.query_map(params![status.as_str()], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        for pair in pairs {
            let (order_id, bag_id) = pair?;
            fulfilled.entry(order_id).or_default().push(bag_id);
        }

        rows.into_iter()
            .map(|row| {
                let bags = fulfilled.remove(&row.order_id).unwrap_or_default();
                row.into_domain(bags)
            })
            .collect()
    }
}
