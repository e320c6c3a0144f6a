// ==========================================
// 教会行政数据交换系统 - 数据仓储层
// ==========================================
// 职责: 记录持久化与参考目录读取
// 红线: Repository 不含校验规则，只做数据 CRUD
// ==========================================

pub mod error;
pub mod memory_store;
pub mod record_store;
pub mod sqlite_store;

pub use error::{RepositoryError, RepositoryResult};
pub use memory_store::InMemoryRecordStore;
pub use record_store::{RecordStore, ReferenceKind, StoredRecord};
pub use sqlite_store::SqliteRecordStore;
