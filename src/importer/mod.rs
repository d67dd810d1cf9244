// ==========================================
// 捐赠物资分配引擎 - 导入层
// ==========================================
// 职责: 外部 CSV 数据导入捐赠袋/订单
// ==========================================

pub mod error;
pub mod file_parser;
pub mod inventory_csv;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, RawRecord};
pub use inventory_csv::{ImportSummary, InventoryCsvImporter, RowRejection};
