// ==========================================
// 教会行政数据交换系统 - 数据导出器
// ==========================================
// 流程: 读取（外部存储）→ 格式化 → CSV / 工作簿写出
// CSV: 单一记录类型；工作簿: 每种类型一张表 + 末尾汇总表
// ==========================================

use crate::domain::options::{ExportFormat, ExportOptions, RecordFilter};
use crate::domain::progress::{CancellationToken, ProgressReporter};
use crate::domain::record_type::RecordType;
use crate::exporter::csv_writer::write_csv;
use crate::exporter::error::{ExportError, ExporterResult};
use crate::exporter::formatter::{RecordFormatter, SheetData, SummaryInfo};
use crate::exporter::workbook_writer::WorkbookWriter;
use crate::i18n::{t, t_with_args};
use crate::repository::RecordStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 导出产物
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// 记录类型键 → 导出记录数
    pub record_counts: BTreeMap<String, usize>,
}

pub struct DataExporter {
    store: Arc<dyn RecordStore>,
    formatter: RecordFormatter,
}

impl DataExporter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            formatter: RecordFormatter,
        }
    }

    pub fn formatter(&self) -> &RecordFormatter {
        &self.formatter
    }

    /// 读取一种记录类型并格式化为工作表
    pub async fn fetch_sheet(
        &self,
        record_type: RecordType,
        filter: &RecordFilter,
        progress: &ProgressReporter,
    ) -> ExporterResult<SheetData> {
        progress.report(
            0,
            &t_with_args("progress.fetching", &[("type", record_type.label())]),
        );
        let records = self.store.find_all(record_type, filter).await?;

        progress.report(
            50,
            &t_with_args("progress.formatting", &[("type", record_type.label())]),
        );
        let sheet = self.formatter.format_sheet(record_type, &records);
        debug!(record_type = %record_type, records = records.len(), "工作表格式化完成");
        Ok(sheet)
    }

    /// 按选项导出
    ///
    /// # 返回
    /// - Err(CsvNeedsSingleType): CSV 导出选择了多种记录类型
    /// - Err(Cancelled): 记录类型之间检测到取消
    #[instrument(skip_all, fields(format = ?options.format))]
    pub async fn export(
        &self,
        options: &ExportOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExporterResult<ExportFile> {
        let types = options.effective_types();
        if types.is_empty() {
            return Err(ExportError::NothingToExport);
        }
        if options.format == ExportFormat::Csv && types.len() != 1 {
            return Err(ExportError::CsvNeedsSingleType(types.len()));
        }

        // === 步骤 1: 逐类型读取并格式化 ===
        let fetch_progress = progress.scoped(0, 80);
        let mut sheets: Vec<(RecordType, SheetData)> = Vec::with_capacity(types.len());
        for (index, record_type) in types.iter().enumerate() {
            cancel.check()?;
            let from = (index * 100 / types.len()) as u8;
            let to = ((index + 1) * 100 / types.len()) as u8;
            let sheet = self
                .fetch_sheet(*record_type, &options.filter, &fetch_progress.scoped(from, to))
                .await?;
            sheets.push((*record_type, sheet));
        }
        let record_counts = self.formatter.record_counts(&sheets);

        // === 步骤 2: 写出 ===
        progress.report(85, &t("progress.writing"));
        let generated_at = Utc::now();
        let (bytes, default_name) = match options.format {
            ExportFormat::Csv => {
                let (record_type, sheet) = &sheets[0];
                (write_csv(sheet)?, record_type.key().to_string())
            }
            ExportFormat::Xlsx => {
                let summary = self.formatter.format_summary(&SummaryInfo {
                    title: t("summary.export_title"),
                    generated_at,
                    mode: None,
                    filter: options.filter.clone(),
                    counts: sheets
                        .iter()
                        .map(|(_, sheet)| (sheet.name.clone(), sheet.record_count()))
                        .collect(),
                });
                let mut all: Vec<SheetData> = sheets.into_iter().map(|(_, sheet)| sheet).collect();
                all.push(summary);
                (WorkbookWriter.write(&all)?, "export".to_string())
            }
        };

        let filename = options.filename.clone().unwrap_or_else(|| {
            format!(
                "{}_{}.{}",
                default_name,
                generated_at.format("%Y%m%d_%H%M%S"),
                options.format.extension()
            )
        });
        progress.report(100, &t("progress.done"));
        info!(filename = %filename, bytes = bytes.len(), "导出完成");

        Ok(ExportFile {
            filename,
            bytes,
            record_counts,
        })
    }
}
