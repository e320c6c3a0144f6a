// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、数据行构造、可注入故障的存储
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use congregation_interchange::domain::context::ReferenceEntry;
use congregation_interchange::repository::{
    RecordStore, ReferenceKind, RepositoryError, RepositoryResult, StoredRecord,
};
use congregation_interchange::{
    FieldValue, ImportOptions, InMemoryRecordStore, ParsedRow, Record, RecordFilter, RecordType,
    SqliteRecordStore,
};
use std::collections::HashSet;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 固定的"今天"，避免测试受运行日期影响
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

/// 带固定日期的导入选项
pub fn import_options() -> ImportOptions {
    ImportOptions {
        today: Some(today()),
        ..ImportOptions::default()
    }
}

/// 创建临时 SQLite 存储
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - SqliteRecordStore: 已初始化 schema 的存储
pub fn create_test_db() -> Result<(NamedTempFile, SqliteRecordStore), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let store = SqliteRecordStore::new(&db_path)?;
    Ok((temp_file, store))
}

/// 由 (表头, 值) 列表构造数据行
pub fn row(row_number: usize, cells: &[(&str, &str)]) -> ParsedRow {
    let values: Record = cells
        .iter()
        .map(|(k, v)| (k.to_string(), FieldValue::text(*v)))
        .collect();
    ParsedRow::new(row_number, values)
}

/// 由 (字段, 值) 列表构造记录
pub fn record(cells: &[(&str, FieldValue)]) -> Record {
    cells
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// 生成成员数据行；`bad` 中的行号使用非法邮箱
pub fn member_rows(count: usize, bad: &[usize]) -> Vec<ParsedRow> {
    (1..=count)
        .map(|n| {
            let email = if bad.contains(&n) {
                "not-an-email".to_string()
            } else {
                format!("member{}@example.com", n)
            };
            let name = format!("成员{}", n);
            row(n, &[("姓名", name.as_str()), ("邮箱", email.as_str())])
        })
        .collect()
}

/// 写入一批成员，返回存储
pub async fn seeded_memory_store(names: &[&str]) -> Arc<InMemoryRecordStore> {
    let store = Arc::new(InMemoryRecordStore::new());
    for name in names {
        store
            .create(
                RecordType::Member,
                None,
                record(&[("name", FieldValue::text(*name))]),
            )
            .await
            .unwrap();
    }
    store
}

// ==========================================
// 可注入故障的存储
// ==========================================

/// 包装一个存储，按需让指定类型的读取/写入失败
pub struct FaultyStore {
    inner: Arc<dyn RecordStore>,
    failing_reads: Mutex<HashSet<RecordType>>,
    failing_names: Mutex<HashSet<String>>,
    offline: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            failing_reads: Mutex::new(HashSet::new()),
            failing_names: Mutex::new(HashSet::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// 读取该类型的全部记录时失败
    pub fn fail_reads(&self, record_type: RecordType) {
        self.failing_reads.lock().unwrap().insert(record_type);
    }

    /// 写入 name 字段等于该值的记录时失败
    pub fn fail_writes_named(&self, name: &str) {
        self.failing_names.lock().unwrap().insert(name.to_string());
    }

    /// 所有操作都失败
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn check_online(&self) -> RepositoryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, fields: &Record) -> RepositoryResult<()> {
        self.check_online()?;
        let name = fields.get("name").and_then(|v| v.as_text()).unwrap_or_default();
        if self.failing_names.lock().unwrap().contains(name) {
            return Err(RepositoryError::DatabaseQueryError(format!("write rejected: {}", name)));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn create(
        &self,
        record_type: RecordType,
        id: Option<String>,
        fields: Record,
    ) -> RepositoryResult<StoredRecord> {
        self.check_write(&fields)?;
        self.inner.create(record_type, id, fields).await
    }

    async fn update(
        &self,
        record_type: RecordType,
        id: &str,
        fields: Record,
    ) -> RepositoryResult<StoredRecord> {
        self.check_write(&fields)?;
        self.inner.update(record_type, id, fields).await
    }

    async fn find_by_id(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> RepositoryResult<Option<StoredRecord>> {
        self.check_online()?;
        self.inner.find_by_id(record_type, id).await
    }

    async fn find_by_fields(
        &self,
        record_type: RecordType,
        criteria: &[(String, FieldValue)],
    ) -> RepositoryResult<Vec<StoredRecord>> {
        self.check_online()?;
        self.inner.find_by_fields(record_type, criteria).await
    }

    async fn find_all(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
    ) -> RepositoryResult<Vec<StoredRecord>> {
        self.check_online()?;
        if self.failing_reads.lock().unwrap().contains(&record_type) {
            return Err(RepositoryError::DatabaseQueryError(format!(
                "read rejected: {}",
                record_type
            )));
        }
        self.inner.find_all(record_type, filter).await
    }

    async fn count(&self, record_type: RecordType) -> RepositoryResult<usize> {
        self.check_online()?;
        self.inner.count(record_type).await
    }

    async fn list_reference_entries(
        &self,
        kind: ReferenceKind,
    ) -> RepositoryResult<Vec<ReferenceEntry>> {
        self.check_online()?;
        self.inner.list_reference_entries(kind).await
    }
}
