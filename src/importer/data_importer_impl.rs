// ==========================================
// 教会行政数据交换系统 - 数据导入器实现
// ==========================================
// 职责: 整合导入流程，从文件到存储
// 流程: 解析 → 表头映射 → 模式校验 → 引用校验 → 分批落库
// 恢复预览与真实恢复共用 validate_rows，保证两者的有效/无效计数一致
// ==========================================

use crate::config::InterchangeConfig;
use crate::domain::context::ValidationContext;
use crate::domain::options::ImportOptions;
use crate::domain::progress::{CancellationToken, ProgressReporter};
use crate::domain::record_type::RecordType;
use crate::domain::result::{ImportError, ImportResult, ParsedRow, RowRecord, UploadResult};
use crate::i18n::{t, t_with_args};
use crate::importer::batch_persister::{BatchPersister, PersistSettings};
use crate::importer::data_importer_trait::DataImporter;
use crate::importer::error::IngestResult;
use crate::importer::field_mapper::ColumnNormalizer;
use crate::importer::file_parser::{FileIngestor, IngestLimits};
use crate::importer::reference_validator::{
    load_validation_context, parents_first, ReferenceValidator,
};
use crate::importer::schema_validator::SchemaValidator;
use crate::repository::{RecordStore, RepositoryResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 校验阶段的输出
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub total: usize,
    /// 通过校验的候选记录（处理顺序；组织行上级在前）
    pub valid: Vec<RowRecord>,
    pub errors: Vec<ImportError>,
    /// 出错即停时首个出错的行号
    pub halted_at: Option<usize>,
}

/// 单次导入的结果与校验阶段计数
#[derive(Debug)]
pub struct ImportRun {
    pub result: ImportResult,
    pub valid: usize,
    pub invalid: usize,
}

impl ValidationOutcome {
    /// 未通过校验的行数（同一行多条错误只计一次）
    pub fn invalid_count(&self) -> usize {
        self.errors.iter().map(|e| e.row).collect::<BTreeSet<_>>().len()
    }

    pub fn into_result(mut self) -> ImportResult {
        self.valid.sort_by_key(|r| r.row);
        ImportResult::from_rows(self.total, self.valid, self.errors)
    }
}

// ==========================================
// DataImporterImpl - 数据导入器实现
// ==========================================
pub struct DataImporterImpl {
    // 外部存储
    store: Arc<dyn RecordStore>,

    // 配置快照
    config: InterchangeConfig,

    // 导入组件
    normalizer: ColumnNormalizer,
    schema_validator: SchemaValidator,
}

impl DataImporterImpl {
    /// 创建导入器
    ///
    /// # 参数
    /// - store: 记录存储
    /// - config: 管道配置快照
    pub fn new(store: Arc<dyn RecordStore>, config: InterchangeConfig) -> Self {
        Self {
            store,
            config,
            normalizer: ColumnNormalizer,
            schema_validator: SchemaValidator::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn config(&self) -> &InterchangeConfig {
        &self.config
    }

    pub fn ingestor(&self) -> FileIngestor {
        FileIngestor::new(IngestLimits::from(&self.config))
    }

    /// 表头映射 + 模式校验 + 引用校验（不访问存储）
    ///
    /// # 参数
    /// - rows: 数据行（表头尚未映射）
    /// - headers: 原始表头顺序（为空时由行内容推断）
    /// - context: 校验上下文
    pub fn validate_rows(
        &self,
        rows: &[ParsedRow],
        headers: &[String],
        record_type: RecordType,
        options: &ImportOptions,
        context: &ValidationContext,
    ) -> ValidationOutcome {
        let mut normalized =
            self.normalizer
                .normalize(record_type, rows, headers, &options.column_mapping);
        if record_type == RecordType::OrganizationNode {
            normalized = parents_first(normalized);
        }
        let today = options.today();
        let mut references = ReferenceValidator::new(context, record_type, options.duplicate_mode);
        let mut outcome = ValidationOutcome {
            total: normalized.len(),
            ..ValidationOutcome::default()
        };

        let mut pending = normalized.into_iter();
        for row in pending.by_ref() {
            let row_errors = match self.schema_validator.validate_row(record_type, &row, today) {
                Ok(mut candidate) => {
                    let errors = references.check_row(row.row_number, &mut candidate);
                    if errors.is_empty() {
                        outcome
                            .valid
                            .push(RowRecord::validated(row.row_number, candidate));
                    }
                    errors
                }
                Err(errors) => errors,
            };

            if row_errors.is_empty() {
                continue;
            }
            debug!(row_number = row.row_number, errors = row_errors.len(), "行校验失败");
            outcome.errors.extend(row_errors);
            if !options.skip_errors {
                outcome.halted_at = Some(row.row_number);
                break;
            }
        }

        if let Some(failed_row) = outcome.halted_at {
            let message = t_with_args("persist.not_processed", &[("row", &failed_row.to_string())]);
            outcome
                .errors
                .extend(pending.map(|row| ImportError::new(row.row_number, message.clone())));
        }
        outcome
    }

    /// 加载上下文并校验
    async fn validate_with_store(
        &self,
        rows: &[ParsedRow],
        headers: &[String],
        record_type: RecordType,
        options: &ImportOptions,
        progress: &ProgressReporter,
    ) -> RepositoryResult<ValidationOutcome> {
        progress.report(0, &t("progress.loading_context"));
        let context = load_validation_context(self.store.as_ref()).await?;

        progress.report(50, &t("progress.validating"));
        Ok(self.validate_rows(rows, headers, record_type, options, &context))
    }

    /// 校验并落库（保留原始表头顺序）
    ///
    /// # 返回
    /// - Ok(ImportRun): 导入结果 + 校验阶段的有效/无效行数
    /// - Err: 参考数据加载失败
    #[instrument(skip_all, fields(record_type = %record_type, rows = rows.len()))]
    pub async fn import_rows(
        &self,
        rows: &[ParsedRow],
        headers: &[String],
        record_type: RecordType,
        options: &ImportOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ImportRun> {
        let total_rows = rows.len();
        info!(total_rows, "开始导入");

        if cancel.is_cancelled() {
            return Ok(ImportRun {
                result: ImportResult::cancelled(rows, &t("persist.cancelled"), t("api.cancelled")),
                valid: 0,
                invalid: 0,
            });
        }

        // === 步骤 1: 表头映射与校验 ===
        let outcome = self
            .validate_with_store(rows, headers, record_type, options, &progress.scoped(0, 30))
            .await?;
        let valid = outcome.valid.len();
        let invalid = outcome.invalid_count();
        info!(valid, invalid, "校验完成");

        // === 步骤 2: 仅校验模式到此为止 ===
        if options.validate_only {
            progress.report(100, &t("progress.done"));
            return Ok(ImportRun {
                result: outcome.into_result(),
                valid,
                invalid,
            });
        }

        // === 步骤 3: 出错即停且校验失败 → 不落库 ===
        if let Some(failed_row) = outcome.halted_at {
            warn!(failed_row, "校验失败，出错即停模式不落库");
            let message =
                t_with_args("persist.not_processed", &[("row", &failed_row.to_string())]);
            let mut errors = outcome.errors;
            errors.extend(
                outcome
                    .valid
                    .iter()
                    .map(|row| ImportError::new(row.row, message.clone())),
            );
            progress.report(100, &t("progress.done"));
            return Ok(ImportRun {
                result: ImportResult::from_rows(outcome.total, Vec::new(), errors),
                valid,
                invalid,
            });
        }

        // === 步骤 4: 分批落库 ===
        let persister = BatchPersister::new(
            self.store.clone(),
            PersistSettings {
                batch_size: self.config.effective_batch_size(options.batch_size),
                max_concurrency: self.config.effective_concurrency(),
                duplicate_mode: options.duplicate_mode,
                skip_errors: options.skip_errors,
            },
        );
        let persisted = persister
            .persist(record_type, outcome.valid, &progress.scoped(30, 100), cancel)
            .await;

        // === 步骤 5: 汇总 ===
        let mut errors = outcome.errors;
        errors.extend(persisted.errors);
        let mut result = ImportResult::from_rows(outcome.total, persisted.data, errors);
        if let Some(message) = persisted.halted {
            result = result.with_message(message);
        }
        info!(
            total = result.summary.total,
            successful = result.summary.successful,
            failed = result.summary.failed,
            created = result.summary.created,
            updated = result.summary.updated,
            "导入完成"
        );
        Ok(ImportRun {
            result,
            valid,
            invalid,
        })
    }
}

#[async_trait]
impl DataImporter for DataImporterImpl {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_file(
        &self,
        bytes: &[u8],
        filename: &str,
        record_type: RecordType,
    ) -> IngestResult<UploadResult> {
        let result = self.ingestor().ingest(bytes, filename, record_type)?;
        info!(
            rows = result.rows.len(),
            cell_errors = result.errors.len(),
            encoding = ?result.encoding,
            "文件解析完成"
        );
        Ok(result)
    }

    #[instrument(skip(self, rows, options, progress, cancel), fields(rows = rows.len()))]
    async fn validate_data(
        &self,
        rows: Vec<ParsedRow>,
        record_type: RecordType,
        options: &ImportOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ImportResult> {
        if cancel.is_cancelled() {
            return Ok(ImportResult::cancelled(
                &rows,
                &t("persist.cancelled"),
                t("api.cancelled"),
            ));
        }

        let outcome = self
            .validate_with_store(&rows, &[], record_type, options, progress)
            .await?;
        progress.report(100, &t("progress.done"));

        let result = outcome.into_result();
        info!(
            total = result.summary.total,
            valid = result.summary.successful,
            invalid = result.summary.failed,
            "校验完成"
        );
        Ok(result)
    }

    async fn import_data(
        &self,
        rows: Vec<ParsedRow>,
        record_type: RecordType,
        options: &ImportOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ImportResult> {
        let run = self
            .import_rows(&rows, &[], record_type, options, progress, cancel)
            .await?;
        Ok(run.result)
    }
}
