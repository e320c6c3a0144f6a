// ==========================================
// 教会行政数据交换系统 - API层错误类型
// ==========================================
// 职责: 将各层错误转换为调用方可读的操作级错误
// 行级问题不在此处，统一进入 ImportResult.errors
// ==========================================

use crate::backup::RestoreError;
use crate::exporter::ExportError;
use crate::importer::IngestError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 文件级错误（整个操作失败）
    // ==========================================
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 导出错误
    // ==========================================
    #[error("导出失败: {0}")]
    ExportFailed(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("配置读取失败: {0}")]
    ConfigError(String),

    #[error("操作已取消或超时")]
    Cancelled,

    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) | RepositoryError::Unavailable(msg) => {
                ApiError::StoreUnavailable(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::StoreUnavailable(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Repository(inner) => ApiError::from(inner),
            ExportError::Cancelled => ApiError::Cancelled,
            ExportError::CsvNeedsSingleType(_) | ExportError::NothingToExport => {
                ApiError::InvalidInput(err.to_string())
            }
            other => ApiError::ExportFailed(other.to_string()),
        }
    }
}

impl From<RestoreError> for ApiError {
    fn from(err: RestoreError) -> Self {
        match err {
            RestoreError::Ingest(IngestError::Cancelled) => ApiError::Cancelled,
            RestoreError::Ingest(inner) => ApiError::Ingest(inner),
            RestoreError::Repository(inner) => ApiError::from(inner),
        }
    }
}

impl ApiError {
    /// 是否为文件本身的问题（调用方应提示用户更换文件）
    pub fn is_file_error(&self) -> bool {
        matches!(self, ApiError::Ingest(_))
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
