// ==========================================
// 教会行政数据交换系统 - 恢复错误类型
// ==========================================
// 范围: 恢复/预览的操作级失败（文件无法解析、存储不可用）
// 行级问题仍累积在结果的 errors 中
// ==========================================

use crate::importer::error::IngestError;
use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type RestoreOutcome<T> = Result<T, RestoreError>;
