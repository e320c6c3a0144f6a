// ==========================================
// 教会行政数据交换系统 - 领域模型层
// ==========================================
// 职责: 记录类型、字段模式、取值、结果、选项、校验上下文
// 红线: 不含数据访问逻辑,不含管道编排逻辑
// ==========================================

pub mod context;
pub mod enum_alias;
pub mod options;
pub mod progress;
pub mod record_type;
pub mod result;
pub mod schema;
pub mod value;

// 重导出核心类型
pub use context::{MemberSnapshot, OrganizationSnapshot, ReferenceEntry, Resolution, ValidationContext};
pub use enum_alias::{EnumEntry, EnumTable};
pub use options::{
    BackupMode, BackupOptions, DuplicateMode, ExportFormat, ExportOptions, ImportOptions,
    RecordFilter, RestoreOptions, RestoreScope,
};
pub use progress::{CancellationToken, Cancelled, ProgressCallback, ProgressReporter};
pub use record_type::{RecordType, SheetKind, SUMMARY_SHEET_NAME};
pub use result::{
    BackupResult, ExportResult, ImportError, ImportResult, ImportSummary, ParsedRow, PersistAction,
    PreviewTotals, RestorePreview, RestoreResult, RowRecord, SheetPreview, SheetReport, UploadResult,
};
pub use schema::{FieldKind, FieldSpec, ReferenceTarget};
pub use value::{FieldValue, Record};
