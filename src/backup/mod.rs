// ==========================================
// 教会行政数据交换系统 - 备份与恢复
// ==========================================
// 备份: 导出路径扇出到全部启用的记录类型，合成一个多表文件
// 恢复: 导入路径扇入全部可识别的工作表
// ==========================================

pub mod backup_orchestrator;
pub mod error;
pub mod restore_orchestrator;

pub use backup_orchestrator::BackupOrchestrator;
pub use error::{RestoreError, RestoreOutcome};
pub use restore_orchestrator::{ClassifiedBundle, ClassifiedSheet, RestoreOrchestrator};
