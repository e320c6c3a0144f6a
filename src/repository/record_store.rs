// ==========================================
// 教会行政数据交换系统 - 记录存储 Trait
// ==========================================
// 职责: 定义交换管道使用的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含校验规则，只做数据 CRUD
// ==========================================

use crate::domain::context::ReferenceEntry;
use crate::domain::options::RecordFilter;
use crate::domain::record_type::RecordType;
use crate::domain::value::{FieldValue, Record};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已落库的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub record_type: RecordType,
    pub fields: Record,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 只读参考目录的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Position,
    Department,
}

impl ReferenceKind {
    pub fn key(&self) -> &'static str {
        match self {
            ReferenceKind::Position => "position",
            ReferenceKind::Department => "department",
        }
    }
}

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 交换管道的持久化边界
// 实现者: InMemoryRecordStore / SqliteRecordStore
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 新增记录
    ///
    /// # 参数
    /// - record_type: 记录类型
    /// - id: 指定 ID（恢复时沿用备份中的编号）；None 时生成新 ID
    /// - fields: 规范字段
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 指定 ID 已存在
    async fn create(
        &self,
        record_type: RecordType,
        id: Option<String>,
        fields: Record,
    ) -> RepositoryResult<StoredRecord>;

    /// 更新记录（传入字段覆盖已有字段，未传入的字段保留）
    ///
    /// # 返回
    /// - Err(NotFound): 记录不存在
    async fn update(
        &self,
        record_type: RecordType,
        id: &str,
        fields: Record,
    ) -> RepositoryResult<StoredRecord>;

    async fn find_by_id(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> RepositoryResult<Option<StoredRecord>>;

    /// 按字段等值查找（文本忽略大小写，全部条件同时满足）
    async fn find_by_fields(
        &self,
        record_type: RecordType,
        criteria: &[(String, FieldValue)],
    ) -> RepositoryResult<Vec<StoredRecord>>;

    /// 按筛选条件列出记录（按创建时间排序）
    async fn find_all(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> RepositoryResult<Vec<StoredRecord>>;

    async fn count(&self, record_type: RecordType) -> RepositoryResult<usize>;

    /// 读取只读参考目录（职分/部门）
    async fn list_reference_entries(
        &self,
        kind: ReferenceKind,
    ) -> RepositoryResult<Vec<ReferenceEntry>>;
}

// ==========================================
// 两种实现共享的匹配逻辑
// ==========================================

/// 记录是否满足全部等值条件
pub(crate) fn matches_criteria(fields: &Record, criteria: &[(String, FieldValue)]) -> bool {
    criteria.iter().all(|(key, expected)| {
        fields
            .get(key)
            .map(|actual| actual.match_key() == expected.match_key())
            .unwrap_or(false)
    })
}

/// 记录是否满足筛选条件
///
/// 设置了日期范围时，主日期字段缺失的记录被排除。
pub(crate) fn matches_filter(record: &StoredRecord, filter: &RecordFilter) -> bool {
    if let Some(after) = filter.modified_after {
        if record.updated_at <= after {
            return false;
        }
    }
    if filter.date_from.is_none() && filter.date_to.is_none() {
        return true;
    }
    let date_field = record.record_type.primary_date_field();
    let Some(date) = record.fields.get(date_field).and_then(FieldValue::as_date) else {
        return false;
    };
    if matches!(filter.date_from, Some(from) if date < from) {
        return false;
    }
    if matches!(filter.date_to, Some(to) if date > to) {
        return false;
    }
    true
}
