// ==========================================
// 教会行政数据交换系统 - 导入模块错误类型
// ==========================================
// 范围: 致命的文件读取错误（整个操作失败）
// 行级问题不走此类型，统一累积为 domain::ImportError
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::progress::Cancelled;
use thiserror::Error;

/// 文件读取/解析错误类型
#[derive(Error, Debug)]
pub enum IngestError {
    // ===== 容量限制 =====
    #[error("文件过大: {size} 字节（上限 {limit} 字节）")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("数据行过多: {rows} 行（上限 {limit} 行）")]
    TooManyRows { rows: usize, limit: usize },

    // ===== 文件内容错误 =====
    #[error("文件为空")]
    EmptyFile,

    #[error("缺少表头行: {0}")]
    NoHeaderRow(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv/.tsv/.txt）")]
    UnsupportedFormat(String),

    #[error("文件签名无效: {0}")]
    InvalidSignature(String),

    #[error("无法识别文本编码")]
    UndecodableText,

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    // ===== 运行控制 =====
    #[error("操作已取消或超时")]
    Cancelled,
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for IngestError {
    fn from(err: calamine::Error) -> Self {
        IngestError::ExcelParseError(err.to_string())
    }
}

impl From<Cancelled> for IngestError {
    fn from(_: Cancelled) -> Self {
        IngestError::Cancelled
    }
}

/// Result 类型别名
pub type IngestResult<T> = Result<T, IngestError>;
