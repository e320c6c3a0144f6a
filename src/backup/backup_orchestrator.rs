// ==========================================
// 教会行政数据交换系统 - 备份编排（BackupOrchestrator）
// ==========================================
// 状态: 开始 → 逐类型读取 → 逐类型格式化 → 组装 → 写出 → 完成
// 模式: 完整 / 增量（仅水位时间之后修改过的记录）
// 失败策略: continue_on_error = false 时任一类型失败即放弃整个备份；
//           true 时跳过该类型并记入 failed_tables
// ==========================================

use crate::domain::options::{BackupMode, BackupOptions, RecordFilter};
use crate::domain::progress::{CancellationToken, ProgressReporter};
use crate::domain::record_type::RecordType;
use crate::domain::result::BackupResult;
use crate::exporter::{DataExporter, ExportError, ExporterResult, SheetData, SummaryInfo, WorkbookWriter};
use crate::i18n::t;
use crate::repository::RecordStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct BackupOrchestrator {
    exporter: DataExporter,
}

impl BackupOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            exporter: DataExporter::new(store),
        }
    }

    /// 生成备份文件
    ///
    /// # 返回
    /// - Ok(BackupResult): success = true，payload 为 .xlsx 内容
    /// - Err: 读取/格式化失败（未开启 continue_on_error）、写出失败或取消
    #[instrument(skip_all, fields(mode = ?options.mode))]
    pub async fn create_backup(
        &self,
        options: &BackupOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExporterResult<BackupResult> {
        // === 步骤 1: 开始 ===
        let types = options.effective_types();
        if types.is_empty() {
            return Err(ExportError::NothingToExport);
        }
        let filter = match options.mode {
            BackupMode::Full => RecordFilter::default(),
            BackupMode::Incremental { since } => RecordFilter {
                modified_after: Some(since),
                ..RecordFilter::default()
            },
        };
        info!(types = types.len(), "开始备份");

        // === 步骤 2: 逐类型读取与格式化 ===
        let fetch_progress = progress.scoped(0, 80);
        let mut sheets: Vec<(RecordType, SheetData)> = Vec::with_capacity(types.len());
        let mut failed_tables = BTreeMap::new();
        for (index, record_type) in types.iter().enumerate() {
            cancel.check()?;
            let from = (index * 100 / types.len()) as u8;
            let to = ((index + 1) * 100 / types.len()) as u8;

            match self
                .exporter
                .fetch_sheet(*record_type, &filter, &fetch_progress.scoped(from, to))
                .await
            {
                Ok(sheet) => sheets.push((*record_type, sheet)),
                Err(e) if options.continue_on_error => {
                    warn!(record_type = %record_type, error = %e, "记录类型读取失败，已跳过");
                    failed_tables.insert(record_type.key().to_string(), e.to_string());
                }
                Err(e) => {
                    error!(record_type = %record_type, error = %e, "记录类型读取失败，放弃备份");
                    return Err(e);
                }
            }
        }
        if sheets.is_empty() {
            return Err(ExportError::NothingToExport);
        }

        // === 步骤 3: 组装（数据表 + 汇总表）===
        progress.report(85, &t("progress.composing"));
        let formatter = self.exporter.formatter();
        let generated_at = Utc::now();
        let summary = formatter.format_summary(&SummaryInfo {
            title: t("summary.title"),
            generated_at,
            mode: Some(options.mode),
            filter,
            counts: sheets
                .iter()
                .map(|(_, sheet)| (sheet.name.clone(), sheet.record_count()))
                .collect(),
        });
        let record_counts = formatter.record_counts(&sheets);
        let included_tables: Vec<String> =
            sheets.iter().map(|(rt, _)| rt.key().to_string()).collect();

        // === 步骤 4: 写出 ===
        progress.report(90, &t("progress.writing"));
        let mut bundle: Vec<SheetData> = sheets.into_iter().map(|(_, sheet)| sheet).collect();
        bundle.push(summary);
        let payload = WorkbookWriter.write(&bundle)?;

        // === 步骤 5: 完成 ===
        let mode_key = match options.mode {
            BackupMode::Full => "full",
            BackupMode::Incremental { .. } => "incremental",
        };
        let filename = options.filename.clone().unwrap_or_else(|| {
            format!(
                "backup_{}_{}.xlsx",
                mode_key,
                generated_at.format("%Y%m%d_%H%M%S")
            )
        });
        progress.report(100, &t("progress.done"));

        let result = BackupResult {
            success: true,
            filename: Some(filename),
            payload: Some(payload),
            error: None,
            included_tables,
            record_counts,
            failed_tables,
        };
        info!(
            total_records = result.total_records(),
            failed_tables = result.failed_tables.len(),
            "备份完成"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{FieldValue, Record};
    use crate::repository::InMemoryRecordStore;

    async fn seeded_store() -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        for name in ["Kim", "Lee"] {
            let mut fields = Record::new();
            fields.insert("name".into(), FieldValue::text(name));
            store.create(RecordType::Member, None, fields).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_full_backup_counts_every_type() {
        let orchestrator = BackupOrchestrator::new(seeded_store().await);
        let result = orchestrator
            .create_backup(
                &BackupOptions::default(),
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.included_tables.len(), RecordType::ALL.len());
        assert_eq!(result.record_counts["member"], 2);
        assert_eq!(result.total_records(), 2);
        assert!(result.filename.unwrap().starts_with("backup_full_"));
    }

    #[tokio::test]
    async fn test_incremental_after_last_change_is_empty() {
        let orchestrator = BackupOrchestrator::new(seeded_store().await);
        let options = BackupOptions {
            mode: BackupMode::Incremental { since: Utc::now() },
            ..BackupOptions::default()
        };
        let result = orchestrator
            .create_backup(&options, &ProgressReporter::silent(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.total_records(), 0);
    }

    #[tokio::test]
    async fn test_progress_is_reported_to_completion() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = ProgressReporter::new(Some(Arc::new(move |p: u8, _m: &str| {
            sink.lock().unwrap().push(p);
        })));
        BackupOrchestrator::new(seeded_store().await)
            .create_backup(&BackupOptions::default(), &progress, &CancellationToken::new())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
