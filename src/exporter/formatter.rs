// ==========================================
// 教会行政数据交换系统 - 记录格式化（RecordFormatter）
// ==========================================
// 职责: 规范字段 → 中文表头；字段值 → 可读文本
// 日期: YYYY-MM-DD；布尔: 是/否；金额: 千分位两位小数；枚举: 中文标签
// 导出的每种格式都能被导入侧重新解析为等价取值
// ==========================================

use crate::domain::options::{BackupMode, RecordFilter};
use crate::domain::record_type::{RecordType, SUMMARY_SHEET_NAME};
use crate::domain::schema::{self, FieldKind, FieldSpec, ID_LABEL};
use crate::domain::value::FieldValue;
use crate::i18n::t;
use crate::repository::StoredRecord;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const TRUE_LABEL: &str = "是";
const FALSE_LABEL: &str = "否";

/// 一张待写出的工作表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    /// 数据行数（不含表头）
    pub fn record_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }
}

/// 汇总表内容
#[derive(Debug, Clone)]
pub struct SummaryInfo {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub mode: Option<BackupMode>,
    pub filter: RecordFilter,
    /// (工作表名, 记录数)，按工作表顺序
    pub counts: Vec<(String, usize)>,
}

pub struct RecordFormatter;

impl RecordFormatter {
    /// 记录类型的导出表头（编号列在首列）
    pub fn headers(&self, record_type: RecordType) -> Vec<String> {
        std::iter::once(ID_LABEL.to_string())
            .chain(schema::fields(record_type).iter().map(|spec| spec.label.to_string()))
            .collect()
    }

    /// 格式化单个字段值
    pub fn format_value(&self, spec: &FieldSpec, value: &FieldValue) -> String {
        match (&spec.kind, value) {
            (FieldKind::Enum(table), FieldValue::Text(code)) => {
                table.label(code).unwrap_or(code).to_string()
            }
            (_, value) => self.format_plain(value),
        }
    }

    fn format_plain(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Text(s) | FieldValue::Reference(s) => s.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Amount(v) => format_amount(*v),
            FieldValue::Boolean(true) => TRUE_LABEL.to_string(),
            FieldValue::Boolean(false) => FALSE_LABEL.to_string(),
            FieldValue::Integer(i) => i.to_string(),
        }
    }

    pub fn format_record(&self, record_type: RecordType, record: &StoredRecord) -> Vec<String> {
        std::iter::once(record.id.clone())
            .chain(schema::fields(record_type).iter().map(|spec| {
                record
                    .fields
                    .get(spec.key)
                    .map(|value| self.format_value(spec, value))
                    .unwrap_or_default()
            }))
            .collect()
    }

    /// 一种记录类型的完整工作表（工作表名为中文类型名）
    pub fn format_sheet(&self, record_type: RecordType, records: &[StoredRecord]) -> SheetData {
        let mut rows = Vec::with_capacity(records.len() + 1);
        rows.push(self.headers(record_type));
        rows.extend(records.iter().map(|r| self.format_record(record_type, r)));
        SheetData {
            name: record_type.label().to_string(),
            rows,
        }
    }

    /// 汇总/元数据工作表
    pub fn format_summary(&self, info: &SummaryInfo) -> SheetData {
        let mut rows = vec![
            vec![info.title.clone()],
            vec![
                t("summary.generated_at"),
                info.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ],
        ];
        match info.mode {
            Some(BackupMode::Full) => {
                rows.push(vec![t("summary.mode"), t("summary.mode_full")]);
            }
            Some(BackupMode::Incremental { since }) => {
                rows.push(vec![t("summary.mode"), t("summary.mode_incremental")]);
                rows.push(vec![t("summary.since"), since.to_rfc3339()]);
            }
            None => {}
        }
        rows.push(vec![t("summary.filters"), info.filter.describe()]);
        rows.push(Vec::new());
        rows.push(vec![t("summary.sheet"), t("summary.records")]);
        for (sheet, count) in &info.counts {
            rows.push(vec![sheet.clone(), count.to_string()]);
        }
        let total: usize = info.counts.iter().map(|(_, c)| c).sum();
        rows.push(vec![t("summary.total"), total.to_string()]);

        SheetData {
            name: SUMMARY_SHEET_NAME.to_string(),
            rows,
        }
    }

    /// 按记录类型汇总记录数（键为类型名）
    pub fn record_counts(&self, sheets: &[(RecordType, SheetData)]) -> BTreeMap<String, usize> {
        sheets
            .iter()
            .map(|(rt, sheet)| (rt.key().to_string(), sheet.record_count()))
            .collect()
    }
}

/// 金额: 千分位分组，两位小数
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}
