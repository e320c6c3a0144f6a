// ==========================================
// 教会行政数据交换系统 - 恢复编排（RestoreOrchestrator）
// ==========================================
// 状态: 解析文件 → 工作表分类 → [逐表: 读取 → 映射 → 校验 → 落库] → 汇总 → 完成
// 分类: 工作表名查表（中英文），汇总表忽略，无法识别的表跳过并告警
// 顺序: 按依赖排序（成员最先），与文件内工作表顺序无关
// 存储故障: 当前表记为失败，后续表标记为未处理，已完成工作表的统计照常返回
// 预览: 只校验不落库，与真实恢复共用 DataImporterImpl::validate_rows；
//       前序工作表的有效候选叠加到校验上下文，模拟其已写入
// ==========================================

use crate::backup::error::RestoreOutcome;
use crate::domain::options::RestoreOptions;
use crate::domain::progress::{CancellationToken, ProgressReporter};
use crate::domain::record_type::{RecordType, SheetKind};
use crate::domain::result::{
    ImportError, ImportResult, PreviewTotals, RestorePreview, RestoreResult, SheetPreview,
    SheetReport,
};
use crate::i18n::{t, t_with_args};
use crate::importer::{load_validation_context, DataImporterImpl, RawSheet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// 已分类的工作表
#[derive(Debug, Clone)]
pub struct ClassifiedSheet {
    pub record_type: RecordType,
    pub sheet: RawSheet,
}

/// 已分类的备份文件
#[derive(Debug, Clone, Default)]
pub struct ClassifiedBundle {
    /// 按恢复顺序排列
    pub sheets: Vec<ClassifiedSheet>,
    /// 无法识别的工作表名
    pub skipped: Vec<String>,
}

pub struct RestoreOrchestrator {
    importer: Arc<DataImporterImpl>,
}

impl RestoreOrchestrator {
    pub fn new(importer: Arc<DataImporterImpl>) -> Self {
        Self { importer }
    }

    /// 解析并分类工作表
    pub fn classify(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &RestoreOptions,
    ) -> RestoreOutcome<ClassifiedBundle> {
        let file = self.importer.ingestor().read(bytes, filename)?;
        let mut bundle = ClassifiedBundle::default();

        for sheet in file.sheets {
            match SheetKind::classify(&sheet.name) {
                SheetKind::Record(record_type) if options.scope.includes(record_type) => {
                    bundle.sheets.push(ClassifiedSheet { record_type, sheet });
                }
                SheetKind::Record(record_type) => {
                    debug!(sheet = %sheet.name, record_type = %record_type, "不在恢复范围内");
                }
                SheetKind::Summary => {
                    debug!(sheet = %sheet.name, "汇总表，忽略");
                }
                SheetKind::Unknown(name) => {
                    warn!(sheet = %name, "无法识别的工作表，已跳过");
                    bundle.skipped.push(name);
                }
            }
        }

        // 稳定排序: 同类型的多张表保持文件内顺序
        bundle.sheets.sort_by_key(|s| {
            RecordType::RESTORE_ORDER
                .iter()
                .position(|rt| *rt == s.record_type)
                .unwrap_or(usize::MAX)
        });
        Ok(bundle)
    }

    /// 真实恢复（每张表之前重新加载校验上下文）
    #[instrument(skip(self, bytes, options, progress, cancel), fields(size = bytes.len()))]
    pub async fn restore(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &RestoreOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RestoreOutcome<RestoreResult> {
        // === 步骤 1: 解析与分类 ===
        progress.report(0, &t("progress.parsing"));
        let bundle = self.classify(bytes, filename, options)?;
        info!(
            sheets = bundle.sheets.len(),
            skipped = bundle.skipped.len(),
            "备份文件分类完成"
        );

        // === 步骤 2: 逐表恢复 ===
        let import_options = options.import_options();
        let sheet_count = bundle.sheets.len();
        let mut results = Vec::with_capacity(sheet_count);
        let mut reports = Vec::with_capacity(sheet_count);
        // 停止原因: 取消 / 前序工作表快速失败
        let mut halted: Option<String> = None;

        for (index, classified) in bundle.sheets.into_iter().enumerate() {
            let ClassifiedSheet { record_type, sheet } = classified;
            let sheet_name = sheet.name.clone();
            let total = sheet.rows.len();

            if halted.is_none() && cancel.is_cancelled() {
                halted = Some(t("persist.cancelled"));
            }
            if let Some(message) = halted.clone() {
                // 停止后剩余工作表的每一行都记一条错误
                let errors = sheet
                    .rows
                    .iter()
                    .map(|row| ImportError::new(row.row_number, message.clone()).with_sheet(&sheet_name))
                    .collect();
                results.push(ImportResult::from_rows(total, Vec::new(), errors));
                reports.push(SheetReport {
                    sheet_name,
                    record_type,
                    total,
                    valid: 0,
                    invalid: 0,
                    successful: 0,
                    failed: total,
                });
                continue;
            }

            let from = (10 + index * 90 / sheet_count.max(1)) as u8;
            let to = (10 + (index + 1) * 90 / sheet_count.max(1)) as u8;
            let sheet_progress = progress.scoped(from, to);
            sheet_progress.report(
                0,
                &t_with_args("progress.restoring_sheet", &[("sheet", &sheet_name)]),
            );

            let upload = self.importer.ingestor().coerce_sheet(sheet, record_type);
            let run = match self
                .importer
                .import_rows(
                    &upload.rows,
                    &upload.headers,
                    record_type,
                    &import_options,
                    &sheet_progress,
                    cancel,
                )
                .await
            {
                Ok(run) => run,
                Err(e) => {
                    // 存储不可用: 本表不落库，已完成的工作表统计保留
                    error!(sheet = %sheet_name, error = %e, "恢复过程中存储不可用");
                    let message = t_with_args("api.store_unavailable", &[("error", &e.to_string())]);
                    let errors = upload
                        .rows
                        .iter()
                        .map(|row| ImportError::new(row.row_number, message.clone()).with_sheet(&sheet_name))
                        .collect();
                    results.push(ImportResult::from_rows(total, Vec::new(), errors).with_message(message));
                    reports.push(SheetReport {
                        sheet_name,
                        record_type,
                        total,
                        valid: 0,
                        invalid: 0,
                        successful: 0,
                        failed: total,
                    });
                    halted = Some(t("persist.sheet_skipped"));
                    continue;
                }
            };

            let mut result = run.result;
            for error in &mut result.errors {
                error.sheet = Some(sheet_name.clone());
            }
            if result.message.is_some() {
                halted = Some(if cancel.is_cancelled() {
                    t("persist.cancelled")
                } else {
                    t("persist.sheet_skipped")
                });
            }
            info!(
                sheet = %sheet_name,
                total = result.summary.total,
                successful = result.summary.successful,
                failed = result.summary.failed,
                "工作表恢复完成"
            );
            reports.push(SheetReport {
                sheet_name,
                record_type,
                total,
                valid: run.valid,
                invalid: run.invalid,
                successful: result.summary.successful,
                failed: result.summary.failed,
            });
            results.push(result);
        }

        // === 步骤 3: 汇总 ===
        let mut merged = ImportResult::merge(results);
        if halted.is_some() && merged.message.is_none() {
            merged = merged.with_message(t("api.cancelled"));
        }
        progress.report(100, &t("progress.done"));
        info!(
            total = merged.summary.total,
            successful = merged.summary.successful,
            failed = merged.summary.failed,
            "恢复完成"
        );

        Ok(RestoreResult {
            result: merged,
            sheets: reports,
            skipped_sheets: bundle.skipped,
        })
    }

    /// 恢复预览（只校验，从不落库）
    #[instrument(skip(self, bytes, options, progress, cancel), fields(size = bytes.len()))]
    pub async fn preview(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &RestoreOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RestoreOutcome<RestorePreview> {
        // === 步骤 1: 解析与分类 ===
        progress.report(0, &t("progress.parsing"));
        let bundle = self.classify(bytes, filename, options)?;

        // === 步骤 2: 加载一次上下文 ===
        progress.report(10, &t("progress.loading_context"));
        let mut context = load_validation_context(self.importer.store().as_ref()).await?;

        // === 步骤 3: 逐表校验 ===
        let import_options = options.import_options();
        let sheet_count = bundle.sheets.len();
        let mut previews = Vec::with_capacity(sheet_count);
        for (index, classified) in bundle.sheets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("预览已取消");
                break;
            }
            let ClassifiedSheet { record_type, sheet } = classified;
            let sheet_name = sheet.name.clone();
            progress.report(
                (20 + index * 80 / sheet_count.max(1)) as u8,
                &t_with_args("progress.previewing_sheet", &[("sheet", &sheet_name)]),
            );

            let upload = self.importer.ingestor().coerce_sheet(sheet, record_type);
            let outcome = self.importer.validate_rows(
                &upload.rows,
                &upload.headers,
                record_type,
                &import_options,
                &context,
            );

            // 模拟本表的有效候选已写入，供后续工作表解析引用
            let pending: Vec<_> = outcome
                .valid
                .iter()
                .map(|row| (format!("pending:{}:{}", index, row.row), row.fields.clone()))
                .collect();
            context.overlay_pending(record_type, &pending);

            let invalid = outcome.invalid_count();
            let errors = outcome
                .errors
                .into_iter()
                .map(|e| e.with_sheet(&sheet_name))
                .collect();
            previews.push(SheetPreview {
                sheet_name,
                record_type,
                total: outcome.total,
                valid: outcome.valid.len(),
                invalid,
                errors,
            });
        }

        // === 步骤 4: 合计 ===
        let totals = previews.iter().fold(PreviewTotals::default(), |acc, p| PreviewTotals {
            total: acc.total + p.total,
            valid: acc.valid + p.valid,
            invalid: acc.invalid + p.invalid,
        });
        progress.report(100, &t("progress.done"));
        info!(
            total = totals.total,
            valid = totals.valid,
            invalid = totals.invalid,
            "恢复预览完成"
        );

        Ok(RestorePreview {
            sheets: previews,
            totals,
            skipped_sheets: bundle.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterchangeConfig;
    use crate::exporter::{SheetData, WorkbookWriter};
    use crate::repository::{InMemoryRecordStore, RecordStore};

    fn sheet(name: &str, rows: &[&[&str]]) -> SheetData {
        SheetData {
            name: name.to_string(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// 奉献表排在成员表之前，另含一张无法识别的表和汇总表
    fn bundle_bytes() -> Vec<u8> {
        WorkbookWriter
            .write(&[
                sheet(
                    "奉献",
                    &[
                        &["成员姓名", "奉献日期", "金额", "奉献类别"],
                        &["Kim", "2024-01-07", "100", "十一奉献"],
                    ],
                ),
                sheet("Sheet1", &[&["随便"], &["x"]]),
                sheet("成员", &[&["姓名", "邮箱"], &["Kim", "kim@example.com"]]),
                sheet("汇总信息", &[&["工作表", "记录数"], &["成员", "1"]]),
            ])
            .unwrap()
    }

    fn orchestrator() -> (Arc<InMemoryRecordStore>, RestoreOrchestrator) {
        let store = Arc::new(InMemoryRecordStore::new());
        let importer = DataImporterImpl::new(store.clone(), InterchangeConfig::default());
        (store, RestoreOrchestrator::new(Arc::new(importer)))
    }

    #[test]
    fn test_classify_orders_by_dependency_and_skips_unknown() {
        let (_, orchestrator) = orchestrator();
        let bundle = orchestrator
            .classify(&bundle_bytes(), "backup.xlsx", &RestoreOptions::default())
            .unwrap();

        let order: Vec<_> = bundle.sheets.iter().map(|s| s.record_type).collect();
        assert_eq!(order, vec![RecordType::Member, RecordType::Contribution]);
        assert_eq!(bundle.skipped, vec!["Sheet1".to_string()]);
    }

    #[test]
    fn test_selective_scope_drops_other_types() {
        let (_, orchestrator) = orchestrator();
        let options = RestoreOptions {
            scope: crate::domain::options::RestoreScope::Selective(vec![RecordType::Member]),
            ..RestoreOptions::default()
        };
        let bundle = orchestrator
            .classify(&bundle_bytes(), "backup.xlsx", &options)
            .unwrap();
        assert_eq!(bundle.sheets.len(), 1);
        assert_eq!(bundle.sheets[0].record_type, RecordType::Member);
    }

    #[tokio::test]
    async fn test_restore_resolves_members_from_earlier_sheet() {
        let (store, orchestrator) = orchestrator();
        let result = orchestrator
            .restore(
                &bundle_bytes(),
                "backup.xlsx",
                &RestoreOptions::default(),
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.result.success, "{:?}", result.result.errors);
        assert_eq!(result.result.summary.total, 2);
        assert_eq!(result.result.summary.successful, 2);
        assert_eq!(result.sheets.len(), 2);
        assert_eq!(result.skipped_sheets, vec!["Sheet1".to_string()]);
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 1);
        assert_eq!(store.count(RecordType::Contribution).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_preview_matches_restore_and_writes_nothing() {
        let (store, orchestrator) = orchestrator();
        let preview = orchestrator
            .preview(
                &bundle_bytes(),
                "backup.xlsx",
                &RestoreOptions::default(),
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(preview.totals.total, 2);
        assert_eq!(preview.totals.valid, 2);
        assert_eq!(preview.totals.invalid, 0);
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 0);

        let restored = orchestrator
            .restore(
                &bundle_bytes(),
                "backup.xlsx",
                &RestoreOptions::default(),
                &ProgressReporter::silent(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        for (p, r) in preview.sheets.iter().zip(&restored.sheets) {
            assert_eq!(p.valid, r.valid);
            assert_eq!(p.invalid, r.invalid);
        }
    }

    #[tokio::test]
    async fn test_restore_twice_updates_instead_of_duplicating() {
        let (store, orchestrator) = orchestrator();
        for _ in 0..2 {
            orchestrator
                .restore(
                    &bundle_bytes(),
                    "backup.xlsx",
                    &RestoreOptions::default(),
                    &ProgressReporter::silent(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
        }
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 1);
        assert_eq!(store.count(RecordType::Contribution).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_restore_reports_every_row() {
        let (store, orchestrator) = orchestrator();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator
            .restore(
                &bundle_bytes(),
                "backup.xlsx",
                &RestoreOptions::default(),
                &ProgressReporter::silent(),
                &cancel,
            )
            .await
            .unwrap();

        assert!(!result.result.success);
        assert!(result.result.message.is_some());
        assert_eq!(result.result.summary.failed, 2);
        assert!(result.result.errors.iter().all(|e| e.sheet.is_some()));
        assert_eq!(store.count(RecordType::Member).await.unwrap(), 0);
    }
}
