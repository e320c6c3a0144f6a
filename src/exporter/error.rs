// ==========================================
// 教会行政数据交换系统 - 导出模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::progress::Cancelled;
use crate::repository::RepositoryError;
use thiserror::Error;

/// 导出/备份错误类型
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("读取记录失败: {0}")]
    Repository(#[from] RepositoryError),

    #[error("CSV 写出失败: {0}")]
    CsvWriteError(String),

    #[error("工作簿写出失败: {0}")]
    WorkbookWriteError(String),

    #[error("CSV 导出只能包含一种记录类型（当前 {0} 种）")]
    CsvNeedsSingleType(usize),

    #[error("没有可导出的记录类型")]
    NothingToExport,

    #[error("操作已取消或超时")]
    Cancelled,
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::CsvWriteError(err.to_string())
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        ExportError::WorkbookWriteError(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::WorkbookWriteError(err.to_string())
    }
}

impl From<Cancelled> for ExportError {
    fn from(_: Cancelled) -> Self {
        ExportError::Cancelled
    }
}

pub type ExporterResult<T> = Result<T, ExportError>;
