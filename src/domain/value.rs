// ==========================================
// 教会行政数据交换系统 - 字段值类型
// ==========================================
// 职责: 记录字段的强类型取值（文本/日期/金额/布尔/整数/待解析引用）
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 单个字段的取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Amount(f64),
    Boolean(bool),
    Integer(i64),
    /// 按名称引用的外部实体（尚未解析为内部 ID）
    Reference(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Reference(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        match self {
            FieldValue::Amount(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// 空白文本视为缺失
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) | FieldValue::Reference(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 用于比较/去重的规范化键（文本忽略大小写与首尾空白）
    pub fn match_key(&self) -> String {
        match self {
            FieldValue::Text(s) | FieldValue::Reference(s) => s.trim().to_lowercase(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Amount(v) => format!("{:.2}", v),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) | FieldValue::Reference(s) => write!(f, "{}", s),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Amount(v) => write!(f, "{:.2}", v),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// 规范字段名 → 字段值
pub type Record = BTreeMap<String, FieldValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_match_key() {
        assert!(FieldValue::text("   ").is_blank());
        assert!(!FieldValue::Boolean(false).is_blank());
        assert_eq!(FieldValue::text("  Kim ").match_key(), "kim");
        assert_eq!(FieldValue::Amount(12.5).match_key(), "12.50");
    }

    #[test]
    fn test_serde_keeps_variant() {
        let value = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"type":"date","value":"2024-03-01"}"#);
        let back: FieldValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
