// ==========================================
// 教会行政数据交换系统 - 内存记录存储
// ==========================================
// 用途: 测试与预演环境；进程退出即丢失
// ==========================================

use crate::domain::context::ReferenceEntry;
use crate::domain::options::RecordFilter;
use crate::domain::record_type::RecordType;
use crate::domain::value::{FieldValue, Record};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{
    matches_criteria, matches_filter, RecordStore, ReferenceKind, StoredRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<StoredRecord>>,
    references: RwLock<HashMap<ReferenceKind, Vec<ReferenceEntry>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一条参考目录项，返回其 ID
    pub fn add_reference_entry(&self, kind: ReferenceKind, name: &str) -> RepositoryResult<String> {
        let mut guard = self
            .references
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        guard.entry(kind).or_default().push(ReferenceEntry {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(
        &self,
        record_type: RecordType,
        id: Option<String>,
        fields: Record,
    ) -> RepositoryResult<StoredRecord> {
        let mut guard = self
            .records
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if guard.iter().any(|r| r.id == id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "{} id={}",
                record_type, id
            )));
        }
        let now = Utc::now();
        let record = StoredRecord {
            id,
            record_type,
            fields,
            created_at: now,
            updated_at: now,
        };
        guard.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        record_type: RecordType,
        id: &str,
        fields: Record,
    ) -> RepositoryResult<StoredRecord> {
        let mut guard = self
            .records
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let record = guard
            .iter_mut()
            .find(|r| r.record_type == record_type && r.id == id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: record_type.to_string(),
                id: id.to_string(),
            })?;
        record.fields.extend(fields);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn find_by_id(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> RepositoryResult<Option<StoredRecord>> {
        let guard = self
            .records
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(guard
            .iter()
            .find(|r| r.record_type == record_type && r.id == id)
            .cloned())
    }

    async fn find_by_fields(
        &self,
        record_type: RecordType,
        criteria: &[(String, FieldValue)],
    ) -> RepositoryResult<Vec<StoredRecord>> {
        let guard = self
            .records
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|r| r.record_type == record_type && matches_criteria(&r.fields, criteria))
            .cloned()
            .collect())
    }

    async fn find_all(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> RepositoryResult<Vec<StoredRecord>> {
        let guard = self
            .records
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|r| r.record_type == record_type && matches_filter(r, filter))
            .cloned()
            .collect())
    }

    async fn count(&self, record_type: RecordType) -> RepositoryResult<usize> {
        let guard = self
            .records
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(guard.iter().filter(|r| r.record_type == record_type).count())
    }

    async fn list_reference_entries(
        &self,
        kind: ReferenceKind,
    ) -> RepositoryResult<Vec<ReferenceEntry>> {
        let guard = self
            .references
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(guard.get(&kind).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> Record {
        let mut fields = Record::new();
        fields.insert("name".into(), FieldValue::text(name));
        fields
    }

    #[tokio::test]
    async fn test_create_with_existing_id_is_rejected() {
        let store = InMemoryRecordStore::new();
        store
            .create(RecordType::Member, Some("m1".into()), member("Kim"))
            .await
            .unwrap();
        let err = store
            .create(RecordType::Member, Some("m1".into()), member("Lee"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = InMemoryRecordStore::new();
        let mut fields = member("Kim");
        fields.insert("phone".into(), FieldValue::text("010-1234-5678"));
        let created = store.create(RecordType::Member, None, fields).await.unwrap();

        let mut patch = Record::new();
        patch.insert("name".into(), FieldValue::text("Kim Minsu"));
        let updated = store
            .update(RecordType::Member, &created.id, patch)
            .await
            .unwrap();

        assert_eq!(updated.fields["name"], FieldValue::text("Kim Minsu"));
        assert_eq!(updated.fields["phone"], FieldValue::text("010-1234-5678"));
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store
            .update(RecordType::Member, "missing", member("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reference_entries_by_kind() {
        let store = InMemoryRecordStore::new();
        let id = store
            .add_reference_entry(ReferenceKind::Department, "诗班")
            .unwrap();
        let departments = store
            .list_reference_entries(ReferenceKind::Department)
            .await
            .unwrap();
        assert_eq!(departments.len(), 1);
        assert_eq!(departments[0].id, id);
        assert!(store
            .list_reference_entries(ReferenceKind::Position)
            .await
            .unwrap()
            .is_empty());
    }
}
