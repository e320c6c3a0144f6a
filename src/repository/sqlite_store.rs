// ==========================================
// 教会行政数据交换系统 - SQLite 记录存储
// ==========================================
// 表: interchange_record（字段以 JSON 保存）/ reference_entry
// 时间戳以 RFC 3339（微秒精度，UTC）保存
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::context::ReferenceEntry;
use crate::domain::options::RecordFilter;
use crate::domain::record_type::RecordType;
use crate::domain::value::{FieldValue, Record};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{
    matches_criteria, matches_filter, RecordStore, ReferenceKind, StoredRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 打开数据库文件并建表
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> RepositoryResult<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 共享连接（配置管理器复用同一连接）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// 写入一条参考目录项，返回其 ID
    pub fn add_reference_entry(&self, kind: ReferenceKind, name: &str) -> RepositoryResult<String> {
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO reference_entry (id, kind, name) VALUES (?1, ?2, ?3)",
            params![id, kind.key(), name],
        )?;
        Ok(id)
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn load_by_type(conn: &Connection, record_type: RecordType) -> RepositoryResult<Vec<StoredRecord>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, fields_json, created_at, updated_at
            FROM interchange_record
            WHERE record_type = ?1
            ORDER BY created_at, rowid
            "#,
        )?;
        let rows = stmt.query_map(params![record_type.key()], raw_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode(record_type, row?)?);
        }
        Ok(records)
    }

    fn load_one(
        conn: &Connection,
        record_type: RecordType,
        id: &str,
    ) -> RepositoryResult<Option<StoredRecord>> {
        let raw = conn
            .query_row(
                r#"
                SELECT id, fields_json, created_at, updated_at
                FROM interchange_record
                WHERE record_type = ?1 AND id = ?2
                "#,
                params![record_type.key(), id],
                raw_row,
            )
            .optional()?;
        raw.map(|raw| decode(record_type, raw)).transpose()
    }
}

type RawRow = (String, String, String, String);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode(record_type: RecordType, raw: RawRow) -> RepositoryResult<StoredRecord> {
    let (id, fields_json, created_at, updated_at) = raw;
    Ok(StoredRecord {
        id,
        record_type,
        fields: serde_json::from_str(&fields_json)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: "updated_at".to_string(),
            message: format!("{}: {}", raw, e),
        })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(
        &self,
        record_type: RecordType,
        id: Option<String>,
        fields: Record,
    ) -> RepositoryResult<StoredRecord> {
        let conn = self.lock()?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let ts = now();
        conn.execute(
            r#"
            INSERT INTO interchange_record (id, record_type, fields_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![
                id,
                record_type.key(),
                serde_json::to_string(&fields)?,
                format_timestamp(&ts)
            ],
        )?;
        Ok(StoredRecord {
            id,
            record_type,
            fields,
            created_at: ts,
            updated_at: ts,
        })
    }

    async fn update(
        &self,
        record_type: RecordType,
        id: &str,
        fields: Record,
    ) -> RepositoryResult<StoredRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut record =
            Self::load_one(&tx, record_type, id)?.ok_or_else(|| RepositoryError::NotFound {
                entity: record_type.to_string(),
                id: id.to_string(),
            })?;
        record.fields.extend(fields);
        record.updated_at = now();
        tx.execute(
            r#"
            UPDATE interchange_record
            SET fields_json = ?1, updated_at = ?2
            WHERE record_type = ?3 AND id = ?4
            "#,
            params![
                serde_json::to_string(&record.fields)?,
                format_timestamp(&record.updated_at),
                record_type.key(),
                id
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    async fn find_by_id(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> RepositoryResult<Option<StoredRecord>> {
        let conn = self.lock()?;
        Self::load_one(&conn, record_type, id)
    }

    async fn find_by_fields(
        &self,
        record_type: RecordType,
        criteria: &[(String, FieldValue)],
    ) -> RepositoryResult<Vec<StoredRecord>> {
        let conn = self.lock()?;
        Ok(Self::load_by_type(&conn, record_type)?
            .into_iter()
            .filter(|r| matches_criteria(&r.fields, criteria))
            .collect())
    }

    async fn find_all(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> RepositoryResult<Vec<StoredRecord>> {
        let conn = self.lock()?;
        Ok(Self::load_by_type(&conn, record_type)?
            .into_iter()
            .filter(|r| matches_filter(r, filter))
            .collect())
    }

    async fn count(&self, record_type: RecordType) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM interchange_record WHERE record_type = ?1",
            params![record_type.key()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn list_reference_entries(
        &self,
        kind: ReferenceKind,
    ) -> RepositoryResult<Vec<ReferenceEntry>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name FROM reference_entry WHERE kind = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![kind.key()], |row| {
            Ok(ReferenceEntry {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn contribution(amount: f64, day: u32) -> Record {
        let mut fields = Record::new();
        fields.insert("amount".into(), FieldValue::Amount(amount));
        fields.insert(
            "contribution_date".into(),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, day).unwrap()),
        );
        fields
    }

    #[tokio::test]
    async fn test_create_and_reload_preserves_typed_fields() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let created = store
            .create(RecordType::Contribution, None, contribution(120.5, 7))
            .await
            .unwrap();

        let loaded = store
            .find_by_id(RecordType::Contribution, &created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, created);
        assert!(store
            .find_by_id(RecordType::Member, &created.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_maps_to_unique_violation() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store
            .create(RecordType::Contribution, Some("c1".into()), contribution(1.0, 1))
            .await
            .unwrap();
        let err = store
            .create(RecordType::Contribution, Some("c1".into()), contribution(2.0, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_find_all_applies_date_filter() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        for day in [1, 10, 20] {
            store
                .create(RecordType::Contribution, None, contribution(10.0, day))
                .await
                .unwrap();
        }
        let filter = RecordFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 5),
            date_to: NaiveDate::from_ymd_opt(2024, 1, 20),
            modified_after: None,
        };
        let found = store
            .find_all(RecordType::Contribution, &filter)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.count(RecordType::Contribution).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_and_find_by_fields() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let created = store
            .create(RecordType::Contribution, None, contribution(10.0, 3))
            .await
            .unwrap();
        let mut patch = Record::new();
        patch.insert("receipt_no".into(), FieldValue::text("R-001"));
        store
            .update(RecordType::Contribution, &created.id, patch)
            .await
            .unwrap();

        let found = store
            .find_by_fields(
                RecordType::Contribution,
                &[("receipt_no".into(), FieldValue::text("r-001"))],
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fields["amount"], FieldValue::Amount(10.0));
    }

    #[tokio::test]
    async fn test_reference_entries_roundtrip() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store
            .add_reference_entry(ReferenceKind::Position, "执事")
            .unwrap();
        let positions = store
            .list_reference_entries(ReferenceKind::Position)
            .await
            .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].name, "执事");
    }
}
