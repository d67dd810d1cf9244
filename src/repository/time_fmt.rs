// ==========================================
// 捐赠物资分配引擎 - 时间字段存储格式
// ==========================================
// 时间戳统一存为 UTC 微秒精度 RFC3339 (定长)，字符串比较即时间先后
// 日期统一存为 YYYY-MM-DD
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("{} ({})", e, raw),
        })
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(field: &str, raw: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("{} ({})", e, raw),
    })
}
