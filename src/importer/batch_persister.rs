// ==========================================
// 教会行政数据交换系统 - 分批落库（BatchPersister）
// ==========================================
// 批次: 固定大小，严格按顺序执行（第 N+1 批不会在第 N 批完成前开始）
// 批内: 行级写入并发执行（上限 max_concurrency），结果按行序收集
// 行号: 始终取自候选记录自身，与批大小无关
// 出错即停（skip_errors = false）: 逐行顺序执行，首个错误后剩余行标记为未处理
// 组织上级占位: 批内并发部分完成后按行序顺序解析
// 记录占用: 同一次运行中一条已有记录最多由一行更新；被其他行新建或更新过的记录不再按自然键命中
// ==========================================

use crate::domain::options::DuplicateMode;
use crate::domain::progress::{CancellationToken, ProgressReporter};
use crate::domain::record_type::RecordType;
use crate::domain::result::{ImportError, PersistAction, RowRecord};
use crate::domain::schema::ID_FIELD;
use crate::domain::value::{FieldValue, Record};
use crate::i18n::{t, t_with_args};
use crate::repository::{RecordStore, RepositoryError, StoredRecord};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// 组织上级 ID 字段（可能为待解析占位）
const PARENT_ID_FIELD: &str = "parent_id";

/// 落库结果
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub data: Vec<RowRecord>,
    pub errors: Vec<ImportError>,
    /// 中途停止的原因（取消/超时）
    pub halted: Option<String>,
}

/// 落库参数
#[derive(Debug, Clone, Copy)]
pub struct PersistSettings {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub duplicate_mode: DuplicateMode,
    pub skip_errors: bool,
}

pub struct BatchPersister {
    store: Arc<dyn RecordStore>,
    settings: PersistSettings,
    /// 本次运行中已被某一行新建或更新的记录 ID
    claimed: Mutex<HashSet<String>>,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn RecordStore>, settings: PersistSettings) -> Self {
        Self {
            store,
            settings: PersistSettings {
                batch_size: settings.batch_size.max(1),
                max_concurrency: settings.max_concurrency.clamp(1, settings.batch_size.max(1)),
                ..settings
            },
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// 占用记录 ID；已被占用时返回 false
    fn claim(&self, id: &str) -> bool {
        match self.claimed.lock() {
            Ok(mut claimed) => claimed.insert(id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(id.to_string()),
        }
    }

    fn reset_claims(&self) {
        match self.claimed.lock() {
            Ok(mut claimed) => claimed.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// 按批次落库
    ///
    /// # 参数
    /// - record_type: 记录类型
    /// - candidates: 通过校验的候选记录（行号已确定）
    /// - progress: 进度上报（每批一次）
    /// - cancel: 取消令牌（批次之间检查）
    #[instrument(skip_all, fields(record_type = %record_type, rows = candidates.len()))]
    pub async fn persist(
        &self,
        record_type: RecordType,
        candidates: Vec<RowRecord>,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();
        self.reset_claims();
        let batches: Vec<Vec<RowRecord>> = candidates
            .chunks(self.settings.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let batch_count = batches.len();
        let mut remaining = batches.into_iter().enumerate();

        while let Some((index, batch)) = remaining.next() {
            // === 批次之间检查取消 ===
            if cancel.is_cancelled() {
                warn!(batch = index + 1, "落库已取消");
                let message = t("persist.cancelled");
                let later: Vec<RowRecord> = remaining.by_ref().flat_map(|(_, b)| b).collect();
                for row in batch.iter().chain(later.iter()) {
                    outcome.errors.push(ImportError::new(row.row, message.clone()));
                }
                outcome.halted = Some(t("api.cancelled"));
                break;
            }

            progress.report(
                percent(index, batch_count),
                &t_with_args(
                    "progress.persisting",
                    &[
                        ("batch", &(index + 1).to_string()),
                        ("batches", &batch_count.to_string()),
                    ],
                ),
            );

            let failed_at = if self.settings.skip_errors {
                self.persist_concurrent(record_type, batch, &mut outcome).await;
                None
            } else {
                self.persist_sequential(record_type, batch, &mut outcome).await
            };

            if let Some((failed_row, rest)) = failed_at {
                // 出错即停: 本批剩余行与后续批次全部标记为未处理
                let message = t_with_args("persist.not_processed", &[("row", &failed_row.to_string())]);
                let later: Vec<RowRecord> = remaining.by_ref().flat_map(|(_, b)| b).collect();
                for row in rest.iter().chain(later.iter()) {
                    outcome.errors.push(ImportError::new(row.row, message.clone()));
                }
                info!(failed_row, "首个行错误后停止落库");
                break;
            }
            debug!(batch = index + 1, batches = batch_count, "批次完成");
        }

        progress.report(100, &t("progress.done"));
        outcome.data.sort_by_key(|r| r.row);
        outcome.errors.sort_by_key(|e| e.row);
        outcome
    }

    /// 批内并发写入；上级占位的组织行在并发部分之后顺序处理
    async fn persist_concurrent(
        &self,
        record_type: RecordType,
        batch: Vec<RowRecord>,
        outcome: &mut PersistOutcome,
    ) {
        let (deferred, immediate): (Vec<RowRecord>, Vec<RowRecord>) =
            batch.into_iter().partition(has_deferred_parent);

        let results: Vec<(RowRecord, Result<StoredRecord, String>, Option<PersistAction>)> =
            stream::iter(immediate)
                .map(|row| async move {
                    let (result, action) = self.persist_one(record_type, row.fields.clone()).await;
                    (row, result, action)
                })
                .buffered(self.settings.max_concurrency)
                .collect()
                .await;

        for (row, result, action) in results {
            record_result(outcome, row, result, action);
        }

        for mut row in deferred {
            if let Err(message) = self.resolve_parent(&mut row.fields).await {
                outcome.errors.push(
                    ImportError::new(row.row, message).with_field("parent_name"),
                );
                continue;
            }
            let (result, action) = self.persist_one(record_type, row.fields.clone()).await;
            record_result(outcome, row, result, action);
        }
    }

    /// 逐行顺序写入，返回首个失败行号与本批未处理的行
    async fn persist_sequential(
        &self,
        record_type: RecordType,
        batch: Vec<RowRecord>,
        outcome: &mut PersistOutcome,
    ) -> Option<(usize, Vec<RowRecord>)> {
        let mut rows = batch.into_iter();
        while let Some(mut row) = rows.next() {
            if has_deferred_parent(&row) {
                if let Err(message) = self.resolve_parent(&mut row.fields).await {
                    let failed_row = row.row;
                    outcome.errors.push(
                        ImportError::new(failed_row, message).with_field("parent_name"),
                    );
                    return Some((failed_row, rows.collect()));
                }
            }
            let (result, action) = self.persist_one(record_type, row.fields.clone()).await;
            let failed_row = row.row;
            let failed = result.is_err();
            record_result(outcome, row, result, action);
            if failed {
                return Some((failed_row, rows.collect()));
            }
        }
        None
    }

    /// 写入单条记录（按重复策略决定新增或更新）
    async fn persist_one(
        &self,
        record_type: RecordType,
        mut fields: Record,
    ) -> (Result<StoredRecord, String>, Option<PersistAction>) {
        let id = fields
            .remove(ID_FIELD)
            .and_then(|v| v.as_text().map(str::to_string))
            .filter(|id| !id.trim().is_empty());
        if let Some(id) = id.as_deref() {
            self.claim(id);
        }

        if self.settings.duplicate_mode == DuplicateMode::UpdateExisting {
            match self.find_existing(record_type, id.as_deref(), &fields).await {
                Ok(Some(existing_id)) => {
                    let result = self
                        .store
                        .update(record_type, &existing_id, fields)
                        .await
                        .map_err(persist_failed);
                    return (result, Some(PersistAction::Updated));
                }
                Ok(None) => {}
                Err(message) => return (Err(message), None),
            }
        }

        let result = self
            .store
            .create(record_type, id, fields)
            .await
            .map_err(persist_failed);
        if let Ok(stored) = &result {
            self.claim(&stored.id);
        }
        (result, Some(PersistAction::Created))
    }

    /// 更新模式的预查找: 先按 ID，再按各组自然键
    ///
    /// 自然键命中的记录若已被本次运行的其他行占用，则视为未命中。
    ///
    /// # 返回
    /// - Ok(Some(id)): 唯一命中
    /// - Ok(None): 未命中（新增）
    /// - Err: 命中多条或存储错误
    async fn find_existing(
        &self,
        record_type: RecordType,
        id: Option<&str>,
        fields: &Record,
    ) -> Result<Option<String>, String> {
        if let Some(id) = id {
            if let Some(found) = self
                .store
                .find_by_id(record_type, id)
                .await
                .map_err(persist_failed)?
            {
                return Ok(Some(found.id));
            }
        }

        for key_set in record_type.natural_keys() {
            let criteria: Option<Vec<(String, FieldValue)>> = key_set
                .iter()
                .map(|key| {
                    fields
                        .get(*key)
                        .filter(|v| !v.is_blank() && !matches!(v, FieldValue::Reference(_)))
                        .map(|v| (key.to_string(), v.clone()))
                })
                .collect();
            let Some(criteria) = criteria else {
                continue;
            };

            let matches = self
                .store
                .find_by_fields(record_type, &criteria)
                .await
                .map_err(persist_failed)?;
            match matches.len() {
                0 => continue,
                1 => {
                    let found = &matches[0].id;
                    if self.claim(found) {
                        return Ok(Some(found.clone()));
                    }
                    debug!(existing_id = %found, "自然键命中的记录已被本次运行的其他行占用");
                }
                count => {
                    return Err(t_with_args(
                        "persist.ambiguous_match",
                        &[("count", &count.to_string())],
                    ))
                }
            }
        }
        Ok(None)
    }

    /// 将上级组织占位解析为已落库的组织 ID
    async fn resolve_parent(&self, fields: &mut Record) -> Result<(), String> {
        let Some(FieldValue::Reference(name)) = fields.get(PARENT_ID_FIELD).cloned() else {
            return Ok(());
        };
        let criteria = [("name".to_string(), FieldValue::text(name.clone()))];
        let found = self
            .store
            .find_by_fields(RecordType::OrganizationNode, &criteria)
            .await
            .map_err(persist_failed)?;
        if found.len() != 1 {
            return Err(t_with_args("persist.parent_unresolved", &[("name", &name)]));
        }
        fields.insert(PARENT_ID_FIELD.to_string(), FieldValue::Text(found[0].id.clone()));
        Ok(())
    }
}

fn has_deferred_parent(row: &RowRecord) -> bool {
    matches!(row.fields.get(PARENT_ID_FIELD), Some(FieldValue::Reference(_)))
}

fn persist_failed(err: RepositoryError) -> String {
    t_with_args("persist.failed", &[("error", &err.to_string())])
}

fn record_result(
    outcome: &mut PersistOutcome,
    row: RowRecord,
    result: Result<StoredRecord, String>,
    action: Option<PersistAction>,
) {
    match result {
        Ok(stored) => outcome.data.push(RowRecord {
            row: row.row,
            id: Some(stored.id),
            action,
            fields: stored.fields,
        }),
        Err(message) => {
            warn!(row_number = row.row, error = %message, "行落库失败");
            outcome.errors.push(ImportError::new(row.row, message));
        }
    }
}

fn percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((index * 100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRecordStore;

    fn candidate(row: usize, pairs: &[(&str, FieldValue)]) -> RowRecord {
        RowRecord::validated(
            row,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn settings(batch_size: usize, mode: DuplicateMode, skip_errors: bool) -> PersistSettings {
        PersistSettings {
            batch_size,
            max_concurrency: 4,
            duplicate_mode: mode,
            skip_errors,
        }
    }

    #[tokio::test]
    async fn test_create_and_update_existing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let persister = BatchPersister::new(
            store.clone(),
            settings(2, DuplicateMode::UpdateExisting, true),
        );
        let rows = vec![
            candidate(1, &[("name", FieldValue::text("Kim")), ("email", FieldValue::text("kim@x.com"))]),
            candidate(2, &[("name", FieldValue::text("Lee"))]),
        ];
        let first = persister
            .persist(RecordType::Member, rows.clone(), &ProgressReporter::silent(), &CancellationToken::new())
            .await;
        assert_eq!(first.data.len(), 2);
        assert!(first.data.iter().all(|r| r.action == Some(PersistAction::Created)));

        let second = persister
            .persist(RecordType::Member, rows, &ProgressReporter::silent(), &CancellationToken::new())
            .await;
        assert!(second.data.iter().all(|r| r.action == Some(PersistAction::Updated)));
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rows_sharing_a_name_keep_their_own_ids() {
        let store = Arc::new(InMemoryRecordStore::new());
        let persister = BatchPersister::new(
            store.clone(),
            settings(1, DuplicateMode::UpdateExisting, true),
        );
        let rows = vec![
            candidate(1, &[("id", FieldValue::text("id-a")), ("name", FieldValue::text("李四"))]),
            candidate(2, &[("id", FieldValue::text("id-b")), ("name", FieldValue::text("李四"))]),
        ];
        let outcome = persister
            .persist(RecordType::Member, rows, &ProgressReporter::silent(), &CancellationToken::new())
            .await;

        assert!(outcome.errors.is_empty());
        let ids: Vec<_> = outcome
            .data
            .iter()
            .map(|r| (r.id.clone().unwrap(), r.action))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("id-a".to_string(), Some(PersistAction::Created)),
                ("id-b".to_string(), Some(PersistAction::Created)),
            ]
        );
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_marks_remaining_rows() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .create(RecordType::Member, Some("dup".into()), Record::new())
            .await
            .unwrap();
        let persister = BatchPersister::new(store, settings(2, DuplicateMode::CreateOnly, false));
        let rows = vec![
            candidate(1, &[("name", FieldValue::text("A"))]),
            candidate(2, &[("id", FieldValue::text("dup")), ("name", FieldValue::text("B"))]),
            candidate(3, &[("name", FieldValue::text("C"))]),
            candidate(4, &[("name", FieldValue::text("D"))]),
        ];
        let outcome = persister
            .persist(RecordType::Member, rows, &ProgressReporter::silent(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.data.len(), 1);
        let rows: Vec<usize> = outcome.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let store = Arc::new(InMemoryRecordStore::new());
        let persister = BatchPersister::new(store.clone(), settings(1, DuplicateMode::CreateOnly, true));
        let token = CancellationToken::new();
        token.cancel();
        let rows = vec![
            candidate(1, &[("name", FieldValue::text("A"))]),
            candidate(2, &[("name", FieldValue::text("B"))]),
        ];
        let outcome = persister
            .persist(RecordType::Member, rows, &ProgressReporter::silent(), &token)
            .await;

        assert!(outcome.halted.is_some());
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deferred_parent_resolved_after_batch() {
        let store = Arc::new(InMemoryRecordStore::new());
        let persister = BatchPersister::new(store.clone(), settings(10, DuplicateMode::CreateOnly, true));
        let rows = vec![
            candidate(1, &[("code", FieldValue::text("ROOT")), ("name", FieldValue::text("总堂"))]),
            candidate(
                2,
                &[
                    ("code", FieldValue::text("N1")),
                    ("name", FieldValue::text("北区")),
                    ("parent_id", FieldValue::Reference("总堂".into())),
                ],
            ),
        ];
        let outcome = persister
            .persist(RecordType::OrganizationNode, rows, &ProgressReporter::silent(), &CancellationToken::new())
            .await;

        assert!(outcome.errors.is_empty());
        let root_id = outcome.data[0].id.clone().unwrap();
        assert_eq!(outcome.data[1].fields["parent_id"], FieldValue::Text(root_id));
    }
}
