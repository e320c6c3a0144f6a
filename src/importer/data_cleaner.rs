// ==========================================
// 教会行政数据交换系统 - 单元格清洗与类型转换
// ==========================================
// 职责: TRIM / NULL 标准化 / 日期、布尔、金额解析
// 日期: - / . 分隔、紧凑 8 位、"年月日"、带时间、表格序列号
// 布尔: 中英文固定词表，无法识别的取值报错（不默认为"是"）
// ==========================================

use crate::domain::schema::FieldKind;
use crate::domain::value::FieldValue;
use crate::i18n::t_with_args;
use chrono::{DateTime, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static YMD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("ymd regex")
});
static CJK_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?$").expect("cjk date regex")
});
static COMPACT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("compact regex"));

const TRUE_TOKENS: &[&str] = &["是", "对", "有", "真", "y", "yes", "true", "1", "√", "✓"];
const FALSE_TOKENS: &[&str] = &["否", "不", "无", "假", "n", "no", "false", "0", "×", "✗"];

/// 表格序列号可表示的最大值（9999-12-31）
const MAX_SERIAL: f64 = 2_958_465.0;

/// 单元格转换失败（行级错误，由调用方附加行号与字段）
#[derive(Debug, Clone, PartialEq)]
pub enum CoercionError {
    Date(String),
    Boolean(String),
    Amount(String),
}

impl CoercionError {
    pub fn raw(&self) -> &str {
        match self {
            CoercionError::Date(v) | CoercionError::Boolean(v) | CoercionError::Amount(v) => v,
        }
    }

    pub fn message(&self) -> String {
        match self {
            CoercionError::Date(v) => t_with_args("coerce.invalid_date", &[("value", v)]),
            CoercionError::Boolean(v) => t_with_args("coerce.invalid_boolean", &[("value", v)]),
            CoercionError::Amount(v) => t_with_args("coerce.invalid_amount", &[("value", v)]),
        }
    }
}

pub struct DataCleaner;

impl DataCleaner {
    pub fn clean_text(&self, value: &str) -> String {
        value.trim().to_string()
    }

    pub fn normalize_null(&self, value: Option<String>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    /// 解析日期文本
    pub fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Some(caps) = CJK_DATE_RE.captures(value) {
            return ymd(&caps[1], &caps[2], &caps[3]);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.date_naive());
        }

        // 去掉时间部分
        let date_part = value
            .split(|c: char| c == ' ' || c == 'T')
            .next()
            .unwrap_or(value);

        if COMPACT_RE.is_match(date_part) {
            return NaiveDate::parse_from_str(date_part, "%Y%m%d").ok();
        }

        YMD_RE
            .captures(date_part)
            .and_then(|caps| ymd(&caps[1], &caps[2], &caps[3]))
    }

    /// 表格序列号 → 日期（1900 日期系统，基准 1899-12-30）
    ///
    /// 1900-03-01 之前的序列号不修正 1900 闰年错误。
    pub fn serial_to_date(&self, serial: f64) -> Option<NaiveDate> {
        if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL {
            return None;
        }
        let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        epoch.checked_add_signed(Duration::days(serial.floor() as i64))
    }

    pub fn parse_bool(&self, value: &str) -> Option<bool> {
        let normalized = value.trim().to_lowercase();
        if TRUE_TOKENS.contains(&normalized.as_str()) {
            Some(true)
        } else if FALSE_TOKENS.contains(&normalized.as_str()) {
            Some(false)
        } else {
            None
        }
    }

    /// 解析金额（去掉货币符号、千分位与"元"）
    pub fn parse_amount(&self, value: &str) -> Option<f64> {
        let cleaned: String = value
            .trim()
            .trim_end_matches('元')
            .chars()
            .filter(|c| !matches!(*c, '¥' | '￥' | '$' | ',' | '，' | ' '))
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// 按字段类型转换单元格值
    ///
    /// 文本/枚举/引用字段统一转为文本；数值单元格去掉多余的小数部分（如电话号码）。
    pub fn coerce(&self, kind: &FieldKind, value: FieldValue) -> Result<FieldValue, CoercionError> {
        match kind {
            FieldKind::Date => self.coerce_date(value),
            FieldKind::Boolean => self.coerce_bool(value),
            FieldKind::Amount => self.coerce_amount(value),
            FieldKind::Text | FieldKind::Enum(_) | FieldKind::Reference { .. } => {
                Ok(self.coerce_text(value))
            }
        }
    }

    fn coerce_date(&self, value: FieldValue) -> Result<FieldValue, CoercionError> {
        match value {
            FieldValue::Date(d) => Ok(FieldValue::Date(d)),
            FieldValue::Text(ref s) | FieldValue::Reference(ref s) => self
                .parse_date(s)
                .map(FieldValue::Date)
                .ok_or_else(|| CoercionError::Date(s.trim().to_string())),
            FieldValue::Amount(v) => self
                .serial_to_date(v)
                .map(FieldValue::Date)
                .ok_or_else(|| CoercionError::Date(format_number(v))),
            FieldValue::Integer(i) => self
                .serial_to_date(i as f64)
                .map(FieldValue::Date)
                .ok_or_else(|| CoercionError::Date(i.to_string())),
            FieldValue::Boolean(b) => Err(CoercionError::Date(b.to_string())),
        }
    }

    fn coerce_bool(&self, value: FieldValue) -> Result<FieldValue, CoercionError> {
        match value {
            FieldValue::Boolean(b) => Ok(FieldValue::Boolean(b)),
            FieldValue::Text(ref s) | FieldValue::Reference(ref s) => self
                .parse_bool(s)
                .map(FieldValue::Boolean)
                .ok_or_else(|| CoercionError::Boolean(s.trim().to_string())),
            FieldValue::Integer(1) => Ok(FieldValue::Boolean(true)),
            FieldValue::Integer(0) => Ok(FieldValue::Boolean(false)),
            FieldValue::Amount(v) if v == 1.0 => Ok(FieldValue::Boolean(true)),
            FieldValue::Amount(v) if v == 0.0 => Ok(FieldValue::Boolean(false)),
            other => Err(CoercionError::Boolean(other.to_string())),
        }
    }

    fn coerce_amount(&self, value: FieldValue) -> Result<FieldValue, CoercionError> {
        match value {
            FieldValue::Amount(v) => Ok(FieldValue::Amount(v)),
            FieldValue::Integer(i) => Ok(FieldValue::Amount(i as f64)),
            FieldValue::Text(ref s) | FieldValue::Reference(ref s) => self
                .parse_amount(s)
                .map(FieldValue::Amount)
                .ok_or_else(|| CoercionError::Amount(s.trim().to_string())),
            other => Err(CoercionError::Amount(other.to_string())),
        }
    }

    pub(crate) fn coerce_text(&self, value: FieldValue) -> FieldValue {
        match value {
            FieldValue::Text(s) => FieldValue::Text(self.clean_text(&s)),
            FieldValue::Reference(s) => FieldValue::Reference(s),
            FieldValue::Integer(i) => FieldValue::Text(i.to_string()),
            FieldValue::Amount(v) => FieldValue::Text(format_number(v)),
            FieldValue::Date(d) => FieldValue::Text(d.format("%Y-%m-%d").to_string()),
            FieldValue::Boolean(b) => FieldValue::Text(b.to_string()),
        }
    }
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// 整数值的浮点数不带小数输出
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_clean_text_and_null() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.clean_text("  hello  "), "hello");
        assert_eq!(cleaner.normalize_null(Some("  ".to_string())), None);
        assert_eq!(
            cleaner.normalize_null(Some("  value  ".to_string())),
            Some("value".to_string())
        );
    }

    #[test]
    fn test_parse_date_formats() {
        let cleaner = DataCleaner;
        let expected = Some(d(2024, 3, 5));
        assert_eq!(cleaner.parse_date("2024-03-05"), expected);
        assert_eq!(cleaner.parse_date("2024/3/5"), expected);
        assert_eq!(cleaner.parse_date("2024.03.05"), expected);
        assert_eq!(cleaner.parse_date("20240305"), expected);
        assert_eq!(cleaner.parse_date("2024年3月5日"), expected);
        assert_eq!(cleaner.parse_date("2024 年 03 月 05 日"), expected);
        assert_eq!(cleaner.parse_date("2024-03-05 10:30:00"), expected);
        assert_eq!(cleaner.parse_date("2024-03-05T10:30:00+08:00"), expected);
        assert_eq!(cleaner.parse_date("2024-02-30"), None);
        assert_eq!(cleaner.parse_date("next week"), None);
    }

    #[test]
    fn test_serial_dates() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.serial_to_date(45000.0), Some(d(2023, 3, 15)));
        assert_eq!(cleaner.serial_to_date(61.0), Some(d(1900, 3, 1)));
        assert_eq!(cleaner.serial_to_date(0.0), None);
        assert_eq!(cleaner.serial_to_date(-5.0), None);
    }

    #[test]
    fn test_parse_bool_vocabulary() {
        let cleaner = DataCleaner;
        for token in ["是", "Y", "yes", "TRUE", "1", "√"] {
            assert_eq!(cleaner.parse_bool(token), Some(true), "{}", token);
        }
        for token in ["否", "n", "No", "false", "0", "×"] {
            assert_eq!(cleaner.parse_bool(token), Some(false), "{}", token);
        }
        assert_eq!(cleaner.parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_amount() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_amount("1,234.50"), Some(1234.5));
        assert_eq!(cleaner.parse_amount("¥ 88"), Some(88.0));
        assert_eq!(cleaner.parse_amount("100元"), Some(100.0));
        assert_eq!(cleaner.parse_amount("abc"), None);
        assert_eq!(cleaner.parse_amount(""), None);
    }

    #[test]
    fn test_coerce_by_kind() {
        let cleaner = DataCleaner;
        assert_eq!(
            cleaner.coerce(&FieldKind::Text, FieldValue::Amount(13800001234.0)),
            Ok(FieldValue::text("13800001234"))
        );
        assert_eq!(
            cleaner.coerce(&FieldKind::Date, FieldValue::Integer(45000)),
            Ok(FieldValue::Date(d(2023, 3, 15)))
        );
        assert_eq!(
            cleaner.coerce(&FieldKind::Boolean, FieldValue::text("maybe")),
            Err(CoercionError::Boolean("maybe".to_string()))
        );
        assert_eq!(
            cleaner.coerce(&FieldKind::Amount, FieldValue::text("1,000")),
            Ok(FieldValue::Amount(1000.0))
        );
    }
}
