// ==========================================
// 教会行政数据交换系统 - 管道选项
// ==========================================

use crate::domain::record_type::RecordType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 重复记录处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateMode {
    /// 仅新增；与已有记录冲突时报告行错误
    #[default]
    CreateOnly,
    /// 先按 ID、再按自然键查找，命中则更新
    UpdateExisting,
}

/// 导入选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// 批大小（None 时取配置值）
    pub batch_size: Option<usize>,
    pub duplicate_mode: DuplicateMode,
    /// true: 出错继续并给出完整错误报告；false: 首个行错误即停止
    pub skip_errors: bool,
    /// 仅校验，绝不落库
    pub validate_only: bool,
    /// 调用方提供的表头覆盖映射（表头 → 规范字段）
    pub column_mapping: HashMap<String, String>,
    /// "不晚于今天"校验使用的日期（None 时取本地当天）
    pub today: Option<NaiveDate>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            duplicate_mode: DuplicateMode::CreateOnly,
            skip_errors: true,
            validate_only: false,
            column_mapping: HashMap::new(),
            today: None,
        }
    }
}

impl ImportOptions {
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    #[default]
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// 导出筛选条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    /// 主日期字段下限（含）
    pub date_from: Option<NaiveDate>,
    /// 主日期字段上限（含）
    pub date_to: Option<NaiveDate>,
    /// 仅包含最后修改时间晚于该时刻的记录
    pub modified_after: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none() && self.date_to.is_none() && self.modified_after.is_none()
    }

    /// 筛选条件的可读描述（写入汇总表）
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(from) = self.date_from {
            parts.push(format!(">= {}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = self.date_to {
            parts.push(format!("<= {}", to.format("%Y-%m-%d")));
        }
        if let Some(after) = self.modified_after {
            parts.push(format!("modified > {}", after.to_rfc3339()));
        }
        if parts.is_empty() {
            "-".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// 导出选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// 为空时导出全部类型
    pub record_types: Vec<RecordType>,
    pub format: ExportFormat,
    pub filter: RecordFilter,
    pub filename: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            record_types: Vec::new(),
            format: ExportFormat::Xlsx,
            filter: RecordFilter::default(),
            filename: None,
        }
    }
}

impl ExportOptions {
    pub fn effective_types(&self) -> Vec<RecordType> {
        if self.record_types.is_empty() {
            RecordType::ALL.to_vec()
        } else {
            RecordType::ALL
                .into_iter()
                .filter(|rt| self.record_types.contains(rt))
                .collect()
        }
    }
}

/// 备份模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Full,
    /// 仅包含水位时间之后修改过的记录
    Incremental { since: DateTime<Utc> },
}

/// 备份选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    pub mode: BackupMode,
    /// 启用的记录类型；为空时全部
    pub record_types: Vec<RecordType>,
    /// 与导入一致的失败策略：false 时任一类型失败即放弃整个备份
    pub continue_on_error: bool,
    pub filename: Option<String>,
}

impl BackupOptions {
    pub fn effective_types(&self) -> Vec<RecordType> {
        if self.record_types.is_empty() {
            RecordType::ALL.to_vec()
        } else {
            RecordType::ALL
                .into_iter()
                .filter(|rt| self.record_types.contains(rt))
                .collect()
        }
    }
}

/// 恢复范围
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", content = "types", rename_all = "lowercase")]
pub enum RestoreScope {
    #[default]
    Full,
    Selective(Vec<RecordType>),
}

impl RestoreScope {
    pub fn includes(&self, record_type: RecordType) -> bool {
        match self {
            RestoreScope::Full => true,
            RestoreScope::Selective(types) => types.contains(&record_type),
        }
    }
}

/// 恢复选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOptions {
    pub scope: RestoreScope,
    pub duplicate_mode: DuplicateMode,
    pub batch_size: Option<usize>,
    pub skip_errors: bool,
    pub today: Option<NaiveDate>,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            scope: RestoreScope::Full,
            duplicate_mode: DuplicateMode::UpdateExisting,
            batch_size: None,
            skip_errors: true,
            today: None,
        }
    }
}

impl RestoreOptions {
    /// 转换为单表导入选项
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            duplicate_mode: self.duplicate_mode,
            skip_errors: self.skip_errors,
            validate_only: false,
            column_mapping: HashMap::new(),
            today: self.today,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_types_keeps_canonical_order() {
        let options = ExportOptions {
            record_types: vec![RecordType::ExpenseReport, RecordType::Member],
            ..ExportOptions::default()
        };
        assert_eq!(
            options.effective_types(),
            vec![RecordType::Member, RecordType::ExpenseReport]
        );
        assert_eq!(ExportOptions::default().effective_types().len(), 6);
    }

    #[test]
    fn test_restore_defaults_to_update_existing() {
        let options = RestoreOptions::default();
        assert_eq!(options.duplicate_mode, DuplicateMode::UpdateExisting);
        assert!(options.scope.includes(RecordType::Contribution));
        let selective = RestoreScope::Selective(vec![RecordType::Member]);
        assert!(!selective.includes(RecordType::Contribution));
    }
}
