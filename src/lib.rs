// ==========================================
// 教会行政数据交换系统 - 核心库
// ==========================================
// 管道: 上传解析 → 表头映射 → 模式校验 → 引用校验 → 分批落库
//       读取记录 → 格式化 → 写出 CSV / 工作簿
//       备份 = 导出扇出到全部类型；恢复 = 导入扇入全部工作表
// 技术栈: Rust + SQLite
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录类型、字段模式、结果
pub mod domain;

// 数据仓储层 - 外部存储接口
pub mod repository;

// 导入层 - 解析、校验、落库
pub mod importer;

// 导出层 - 格式化与写出
pub mod exporter;

// 备份与恢复
pub mod backup;

// 配置层 - 运行参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 编程接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    BackupMode, BackupOptions, CancellationToken, DuplicateMode, ExportFormat, ExportOptions,
    FieldValue, ImportOptions, ProgressCallback, Record, RecordFilter, RecordType,
    RestoreOptions, RestoreScope,
};

// 结果类型
pub use domain::{
    BackupResult, ExportResult, ImportError, ImportResult, ImportSummary, ParsedRow,
    RestorePreview, RestoreResult, UploadResult,
};

// 存储
pub use repository::{InMemoryRecordStore, RecordStore, SqliteRecordStore};

// API
pub use api::{ApiError, ApiResult, InterchangeApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "教会行政数据交换系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
