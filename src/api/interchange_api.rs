// ==========================================
// 教会行政数据交换系统 - 数据交换 API
// ==========================================
// 职责: 对外提供上传/校验/导入/导出/备份/恢复/恢复预览七个操作
// 约定:
// - 每个操作接受可选进度回调 (百分比 0-100, 消息) 与取消令牌
// - 文件级错误（过大、空文件、无表头等）返回 Err(ApiError)
// - 存储不可用等操作级错误折叠为 success=false 的结果
// - 行级错误从不中断，汇总在结果的 errors 中
// - 每个操作开始时应用语言: with_locale 指定的优先，否则取配置中的 default_locale
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::backup::{BackupOrchestrator, RestoreError, RestoreOrchestrator};
use crate::config::{InterchangeConfig, InterchangeConfigReader};
use crate::domain::options::{BackupOptions, ExportOptions, ImportOptions, RestoreOptions};
use crate::domain::progress::{CancellationToken, ProgressCallback, ProgressReporter};
use crate::domain::record_type::RecordType;
use crate::domain::result::{
    BackupResult, ExportResult, ImportResult, ParsedRow, RestorePreview, RestoreResult,
    UploadResult,
};
use crate::exporter::{DataExporter, ExportError};
use crate::i18n::{self, t, t_with_args};
use crate::importer::{DataImporter, DataImporterImpl};
use crate::repository::{RecordStore, RepositoryError};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// 数据交换 API
pub struct InterchangeApi {
    store: Arc<dyn RecordStore>,
    config: Arc<dyn InterchangeConfigReader>,
    /// 固定语言（覆盖配置中的 default_locale）
    locale: Option<String>,
}

impl InterchangeApi {
    /// 创建 API 实例
    ///
    /// # 参数
    /// - store: 外部存储
    /// - config: 运行参数来源（每次操作开始时读取一次）
    pub fn new(store: Arc<dyn RecordStore>, config: Arc<dyn InterchangeConfigReader>) -> Self {
        Self {
            store,
            config,
            locale: None,
        }
    }

    /// 固定消息语言（如命令行 --locale）
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// 使用默认运行参数
    pub fn with_defaults(store: Arc<dyn RecordStore>) -> Self {
        Self::new(store, Arc::new(InterchangeConfig::default()))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn load_config(&self) -> ApiResult<InterchangeConfig> {
        let config = self
            .config
            .load_snapshot()
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))?
            .validated();
        i18n::set_locale(self.locale.as_deref().unwrap_or(&config.default_locale));
        Ok(config)
    }

    async fn importer(&self) -> ApiResult<DataImporterImpl> {
        let config = self.load_config().await?;
        Ok(DataImporterImpl::new(self.store.clone(), config))
    }

    // ==========================================
    // 导入
    // ==========================================

    /// 解析上传文件
    ///
    /// # 返回
    /// - Ok(UploadResult): 数据行与单元格转换错误
    /// - Err(ApiError::Ingest): 文件级错误
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_file(
        &self,
        bytes: &[u8],
        filename: &str,
        record_type: RecordType,
    ) -> ApiResult<UploadResult> {
        let importer = self.importer().await?;
        let result = importer.upload_file(bytes, filename, record_type).await?;
        Ok(result)
    }

    /// 校验数据行（从不落库）
    #[instrument(skip(self, rows, options, progress, cancel), fields(rows = rows.len()))]
    pub async fn validate_data(
        &self,
        rows: Vec<ParsedRow>,
        record_type: RecordType,
        options: &ImportOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ImportResult {
        let total = rows.len();
        let importer = match self.importer().await {
            Ok(importer) => importer,
            Err(e) => return config_failure(total, e),
        };
        let progress = ProgressReporter::new(progress);
        match importer
            .validate_data(rows, record_type, options, &progress, cancel)
            .await
        {
            Ok(result) => result,
            Err(e) => store_failure(total, e),
        }
    }

    /// 校验并落库（validate_only 时等同校验）
    #[instrument(skip(self, rows, options, progress, cancel), fields(rows = rows.len()))]
    pub async fn import_data(
        &self,
        rows: Vec<ParsedRow>,
        record_type: RecordType,
        options: &ImportOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ImportResult {
        let total = rows.len();
        let importer = match self.importer().await {
            Ok(importer) => importer,
            Err(e) => return config_failure(total, e),
        };
        let progress = ProgressReporter::new(progress);
        match importer
            .import_data(rows, record_type, options, &progress, cancel)
            .await
        {
            Ok(result) => result,
            Err(e) => store_failure(total, e),
        }
    }

    // ==========================================
    // 导出与备份
    // ==========================================

    /// 导出记录
    #[instrument(skip(self, options, progress, cancel), fields(format = ?options.format))]
    pub async fn export_data(
        &self,
        options: &ExportOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ExportResult {
        if let Err(e) = self.load_config().await {
            warn!(error = %e, "配置读取失败");
            return ExportResult::failure(t_with_args("api.config_error", &[("error", &e.to_string())]));
        }
        let exporter = DataExporter::new(self.store.clone());
        let progress = ProgressReporter::new(progress);
        match exporter.export(options, &progress, cancel).await {
            Ok(file) => {
                info!(filename = %file.filename, size = file.bytes.len(), "导出成功");
                ExportResult {
                    success: true,
                    filename: Some(file.filename),
                    payload: Some(file.bytes),
                    error: None,
                    record_counts: file.record_counts,
                }
            }
            Err(e) => {
                warn!(error = %e, "导出失败");
                ExportResult::failure(export_message(e))
            }
        }
    }

    /// 创建备份文件
    #[instrument(skip(self, options, progress, cancel), fields(mode = ?options.mode))]
    pub async fn create_backup(
        &self,
        options: &BackupOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> BackupResult {
        if let Err(e) = self.load_config().await {
            warn!(error = %e, "配置读取失败");
            return BackupResult::failure(t_with_args("api.config_error", &[("error", &e.to_string())]));
        }
        let orchestrator = BackupOrchestrator::new(self.store.clone());
        let progress = ProgressReporter::new(progress);
        match orchestrator.create_backup(options, &progress, cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "备份失败");
                BackupResult::failure(export_message(e))
            }
        }
    }

    // ==========================================
    // 恢复
    // ==========================================

    /// 从备份文件恢复
    ///
    /// # 返回
    /// - Ok(RestoreResult): 合并后的导入结果 + 每表统计
    /// - Err(ApiError): 文件级错误或配置读取失败
    #[instrument(skip(self, bytes, options, progress, cancel), fields(size = bytes.len()))]
    pub async fn restore_backup(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &RestoreOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ApiResult<RestoreResult> {
        let orchestrator = RestoreOrchestrator::new(Arc::new(self.importer().await?));
        let progress = ProgressReporter::new(progress);
        match orchestrator
            .restore(bytes, filename, options, &progress, cancel)
            .await
        {
            Ok(result) => Ok(result),
            Err(RestoreError::Repository(e)) => {
                error!(error = %e, "恢复过程中存储不可用");
                Ok(RestoreResult {
                    result: store_failure(0, e),
                    ..RestoreResult::default()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 恢复预览（只校验，从不落库）
    #[instrument(skip(self, bytes, options, progress, cancel), fields(size = bytes.len()))]
    pub async fn preview_restore(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &RestoreOptions,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> ApiResult<RestorePreview> {
        let orchestrator = RestoreOrchestrator::new(Arc::new(self.importer().await?));
        let progress = ProgressReporter::new(progress);
        let preview = orchestrator
            .preview(bytes, filename, options, &progress, cancel)
            .await?;
        Ok(preview)
    }
}

// ==========================================
// 操作级失败 → 结果
// ==========================================

fn store_failure(total: usize, err: RepositoryError) -> ImportResult {
    error!(error = %err, "存储不可用");
    ImportResult::operational_failure(
        total,
        t_with_args("api.store_unavailable", &[("error", &err.to_string())]),
    )
}

fn config_failure(total: usize, err: ApiError) -> ImportResult {
    error!(error = %err, "配置读取失败");
    ImportResult::operational_failure(
        total,
        t_with_args("api.config_error", &[("error", &err.to_string())]),
    )
}

fn export_message(err: ExportError) -> String {
    match err {
        ExportError::Cancelled => t("api.cancelled"),
        ExportError::Repository(e) => {
            t_with_args("api.store_unavailable", &[("error", &e.to_string())])
        }
        other => other.to_string(),
    }
}
