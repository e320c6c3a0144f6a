// ==========================================
// 教会行政数据交换系统 - 导出层
// ==========================================
// 职责: 已存记录 → 可读表头与取值 → CSV / 多表工作簿
// ==========================================

pub mod csv_writer;
pub mod data_exporter;
pub mod error;
pub mod formatter;
pub mod workbook_writer;

pub use csv_writer::write_csv;
pub use data_exporter::{DataExporter, ExportFile};
pub use error::{ExportError, ExporterResult};
pub use formatter::{format_amount, RecordFormatter, SheetData, SummaryInfo};
pub use workbook_writer::WorkbookWriter;
