// ==========================================
// 教会行政数据交换系统 - 数据导入 Trait
// ==========================================
// 职责: 定义导入管道接口（不包含实现）
// 管道: 上传解析 → 表头映射 → 模式校验 → 引用校验 → 分批落库
// ==========================================

use crate::domain::options::ImportOptions;
use crate::domain::progress::{CancellationToken, ProgressReporter};
use crate::domain::record_type::RecordType;
use crate::domain::result::{ImportResult, ParsedRow, UploadResult};
use crate::importer::error::IngestResult;
use crate::importer::file_parser::RawFile;
use crate::repository::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// DataImporter Trait
// ==========================================
// 用途: 导入主接口
// 实现者: DataImporterImpl
#[async_trait]
pub trait DataImporter: Send + Sync {
    /// 解析上传文件
    ///
    /// # 参数
    /// - bytes: 文件内容
    /// - filename: 原始文件名（用于识别格式）
    /// - record_type: 目标记录类型（用于单元格类型推断）
    ///
    /// # 返回
    /// - Ok(UploadResult): 数据行 + 单元格转换错误
    /// - Err: 文件过大、行数过多、空文件、无表头等致命错误
    async fn upload_file(
        &self,
        bytes: &[u8],
        filename: &str,
        record_type: RecordType,
    ) -> IngestResult<UploadResult>;

    /// 校验数据行（从不落库）
    ///
    /// # 参数
    /// - rows: 上传解析得到的数据行
    /// - record_type: 目标记录类型
    /// - options: 导入选项（表头覆盖、重复策略、出错是否继续）
    ///
    /// # 返回
    /// - Ok(ImportResult): data 为通过校验的行，errors 为行级错误
    /// - Err: 参考数据加载失败（存储不可用）
    async fn validate_data(
        &self,
        rows: Vec<ParsedRow>,
        record_type: RecordType,
        options: &ImportOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ImportResult>;

    /// 校验并落库
    ///
    /// # 参数
    /// - rows: 上传解析得到的数据行
    /// - record_type: 目标记录类型
    /// - options: 导入选项；validate_only 时等同 validate_data
    ///
    /// # 返回
    /// - Ok(ImportResult): data 为已落库的行（含 ID 与动作）
    /// - Err: 参考数据加载失败（存储不可用）
    async fn import_data(
        &self,
        rows: Vec<ParsedRow>,
        record_type: RecordType,
        options: &ImportOptions,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ImportResult>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件内容为工作表列表
    ///
    /// # 参数
    /// - bytes: 文件内容
    /// - source_name: 文件名（分隔文本以去掉扩展名的文件名作为工作表名）
    fn parse(&self, bytes: &[u8], source_name: &str) -> IngestResult<RawFile>;
}
