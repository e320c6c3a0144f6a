// ==========================================
// 教会行政数据交换系统 - 导入层
// ==========================================
// 职责: 上传文件 → 规范字段 → 校验 → 落库
// 支持: Excel (.xlsx/.xls), 分隔文本 (.csv/.tsv/.txt)
// ==========================================

// 模块声明
pub mod batch_persister;
pub mod data_cleaner;
pub mod data_importer_impl;
pub mod data_importer_trait;
pub mod encoding;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod reference_validator;
pub mod schema_validator;

// 重导出核心类型
pub use batch_persister::{BatchPersister, PersistOutcome, PersistSettings};
pub use data_cleaner::{CoercionError, DataCleaner};
pub use data_importer_impl::{DataImporterImpl, ImportRun, ValidationOutcome};
pub use error::{IngestError, IngestResult};
pub use field_mapper::ColumnNormalizer;
pub use file_parser::{
    CsvParser, ExcelParser, FileFormat, FileIngestor, IngestLimits, RawFile, RawSheet,
    UniversalFileParser,
};
pub use reference_validator::{load_validation_context, ReferenceValidator};
pub use schema_validator::SchemaValidator;

// 重导出 Trait 接口
pub use data_importer_trait::{DataImporter, FileParser};
