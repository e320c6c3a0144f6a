// ==========================================
// 教会行政数据交换系统 - 管道结果类型
// ==========================================
// 职责: 行级错误 / 导入结果 / 导出结果 / 备份结果 / 恢复预览
// 不变量: summary.total == summary.successful + summary.failed
// ==========================================

use crate::domain::record_type::RecordType;
use crate::domain::value::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 行级错误（不中断管道，逐行累积）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportError {
    /// 数据行号（从 1 开始，不含表头）
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    /// 来源工作表（恢复多表文件时填写）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl ImportError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            message: message.into(),
            value: None,
            sheet: None,
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_value(mut self, value: FieldValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// 读取后的数据行（表头 → 单元格值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    /// 数据行号（从 1 开始，不含表头；被丢弃的空行仍占行号）
    pub row_number: usize,
    pub values: Record,
}

impl ParsedRow {
    pub fn new(row_number: usize, values: Record) -> Self {
        Self { row_number, values }
    }
}

/// 上传解析结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResult {
    pub rows: Vec<ParsedRow>,
    /// 单元格类型转换失败（不中断解析）
    pub errors: Vec<ImportError>,
    pub headers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// 落库动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistAction {
    Created,
    Updated,
}

/// 成功行（校验通过或已落库）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PersistAction>,
    pub fields: Record,
}

impl RowRecord {
    pub fn validated(row: usize, fields: Record) -> Self {
        Self {
            row,
            id: None,
            action: None,
            fields,
        }
    }
}

/// 导入汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub updated: usize,
}

/// 导入/校验结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub data: Vec<RowRecord>,
    pub errors: Vec<ImportError>,
    pub summary: ImportSummary,
    /// 操作级错误说明（取消、存储不可用等）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImportResult {
    /// 由成功行与错误列表构造结果
    ///
    /// failed = 出现在错误列表中的不同行数；同一行的多条字段错误只计一次失败。
    pub fn from_rows(total: usize, data: Vec<RowRecord>, mut errors: Vec<ImportError>) -> Self {
        errors.sort_by_key(|e| e.row);
        let failed = errors.iter().map(|e| e.row).collect::<BTreeSet<_>>().len();
        let created = data
            .iter()
            .filter(|r| r.action == Some(PersistAction::Created))
            .count();
        let updated = data
            .iter()
            .filter(|r| r.action == Some(PersistAction::Updated))
            .count();
        let summary = ImportSummary {
            total,
            successful: data.len(),
            failed,
            created,
            updated,
        };
        Self {
            success: failed == 0,
            data,
            errors,
            summary,
            message: None,
        }
    }

    /// 操作级失败（整体失败，无行级明细；全部行计为失败）
    pub fn operational_failure(total: usize, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            errors: Vec::new(),
            summary: ImportSummary {
                total,
                failed: total,
                ..ImportSummary::default()
            },
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.message = Some(message.into());
        self
    }

    /// 整体取消: 每一行记一条"未处理"错误
    pub fn cancelled(rows: &[ParsedRow], row_message: &str, message: impl Into<String>) -> Self {
        let errors = rows
            .iter()
            .map(|row| ImportError::new(row.row_number, row_message))
            .collect();
        Self::from_rows(rows.len(), Vec::new(), errors).with_message(message)
    }

    /// 出错的行号集合
    pub fn failed_rows(&self) -> BTreeSet<usize> {
        self.errors.iter().map(|e| e.row).collect()
    }

    /// 合并多个结果（恢复时按工作表汇总）
    pub fn merge(results: Vec<ImportResult>) -> ImportResult {
        let mut merged = ImportResult {
            success: true,
            ..ImportResult::default()
        };
        for result in results {
            merged.success &= result.success;
            merged.summary.total += result.summary.total;
            merged.summary.successful += result.summary.successful;
            merged.summary.failed += result.summary.failed;
            merged.summary.created += result.summary.created;
            merged.summary.updated += result.summary.updated;
            merged.data.extend(result.data);
            merged.errors.extend(result.errors);
            if merged.message.is_none() {
                merged.message = result.message;
            }
        }
        merged
    }
}

/// 导出结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub record_counts: BTreeMap<String, usize>,
}

impl ExportResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// 备份结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub included_tables: Vec<String>,
    pub record_counts: BTreeMap<String, usize>,
    /// 跳过的类型及原因（仅 continue_on_error 时出现）
    #[serde(default)]
    pub failed_tables: BTreeMap<String, String>,
}

impl BackupResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn total_records(&self) -> usize {
        self.record_counts.values().sum()
    }
}

/// 单个工作表的恢复统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetReport {
    pub sheet_name: String,
    pub record_type: RecordType,
    pub total: usize,
    /// 通过校验的行数
    pub valid: usize,
    /// 未通过校验的行数
    pub invalid: usize,
    /// 落库成功行数（预览时为 0）
    pub successful: usize,
    /// 落库失败 + 校验失败行数（预览时等于 invalid）
    pub failed: usize,
}

/// 恢复结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    #[serde(flatten)]
    pub result: ImportResult,
    pub sheets: Vec<SheetReport>,
    pub skipped_sheets: Vec<String>,
}

/// 预览中的单表信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetPreview {
    pub sheet_name: String,
    pub record_type: RecordType,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<ImportError>,
}

/// 预览合计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewTotals {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

/// 恢复预览
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestorePreview {
    pub sheets: Vec<SheetPreview>,
    pub totals: PreviewTotals,
    pub skipped_sheets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_field_errors_count_one_failure() {
        let errors = vec![
            ImportError::new(2, "bad").with_field("email"),
            ImportError::new(2, "bad").with_field("name"),
            ImportError::new(1, "bad").with_field("name"),
        ];
        let data = vec![RowRecord::validated(3, Record::new())];
        let result = ImportResult::from_rows(3, data, errors);

        assert_eq!(result.summary.total, 3);
        assert_eq!(result.summary.successful, 1);
        assert_eq!(result.summary.failed, 2);
        assert_eq!(result.errors[0].row, 1);
        assert!(!result.success);
    }

    #[test]
    fn test_merge_sums_counts() {
        let a = ImportResult::from_rows(1, vec![RowRecord::validated(1, Record::new())], vec![]);
        let b = ImportResult::from_rows(2, vec![], vec![ImportError::new(1, "x"), ImportError::new(2, "y")]);
        let merged = ImportResult::merge(vec![a, b]);
        assert_eq!(merged.summary.total, 3);
        assert_eq!(merged.summary.successful, 1);
        assert_eq!(merged.summary.failed, 2);
        assert!(!merged.success);
    }
}
