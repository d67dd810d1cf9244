// ==========================================
// 捐赠物资分配引擎 - CSV 文件解析
// ==========================================
// 输出: 原始行记录（列名 -> 去首尾空白的值），保留文件行号
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

// ==========================================
// RawRecord - 原始行
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 文件行号（表头为第 1 行）
    pub row: usize,
    pub fields: HashMap<String, String>,
}

impl RawRecord {
    /// 取非空字段值
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

// ==========================================
// CsvParser
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// 解析 CSV 为原始行记录
    ///
    /// # 参数
    /// - `required_columns`: 表头必须包含的列（小写比较）
    pub fn parse_to_raw_records(
        &self,
        file_path: &Path,
        required_columns: &[&str],
    ) -> ImportResult<Vec<RawRecord>> {
        // 检查文件存在
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        // 检查扩展名
        if let Some(ext) = file_path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        // 表头统一小写
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();

        for column in required_columns {
            if !headers.iter().any(|h| h == column) {
                return Err(ImportError::MissingColumn(column.to_string()));
            }
        }

        let mut records = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result?;
            let mut fields = HashMap::new();

            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    fields.insert(header.clone(), value.trim().to_string());
                }
            }

            // 跳过完全空白的行
            if fields.values().all(|v| v.is_empty()) {
                continue;
            }

            let row = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(row_idx + 2);
            records.push(RawRecord { row, fields });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_parse_valid_file() {
        let file = csv_file("Bag_ID, Weight_KG\nA,3\n\n,\nB, 4.5 \n");
        let records = CsvParser
            .parse_to_raw_records(file.path(), &["bag_id", "weight_kg"])
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row, 2);
        assert_eq!(records[0].get("bag_id"), Some("A"));
        assert_eq!(records[1].get("weight_kg"), Some("4.5"));
    }

    #[test]
    fn test_missing_required_column() {
        let file = csv_file("bag_id\nA\n");
        let err = CsvParser
            .parse_to_raw_records(file.path(), &["bag_id", "weight_kg"])
            .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn(c) if c == "weight_kg"));
    }

    #[test]
    fn test_file_not_found() {
        let err = CsvParser
            .parse_to_raw_records(Path::new("/nonexistent/bags.csv"), &[])
            .unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = Builder::new().suffix(".xlsx").tempfile().unwrap();
        let err = CsvParser.parse_to_raw_records(file.path(), &[]).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    }
}
