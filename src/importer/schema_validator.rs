// ==========================================
// 教会行政数据交换系统 - 模式校验器（SchemaValidator）
// ==========================================
// 规则: 必填 / 长度 / 正则 / 枚举 / 不晚于今天 / 大于 0 / 缺省值
// 策略: 一行内收集全部字段错误（两个错误字段产生两条错误）
// 输出: 候选记录（枚举已转规范代码、引用保留名称占位）或错误列表
// ==========================================

use crate::domain::record_type::RecordType;
use crate::domain::result::{ImportError, ParsedRow};
use crate::domain::schema::{self, DefaultValue, FieldKind, FieldSpec, ID_FIELD};
use crate::domain::value::{FieldValue, Record};
use crate::i18n::{field_label, t_with_args};
use crate::importer::data_cleaner::DataCleaner;
use chrono::NaiveDate;

pub struct SchemaValidator {
    cleaner: DataCleaner,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            cleaner: DataCleaner,
        }
    }

    /// 校验单行（行键已映射为规范字段名）
    ///
    /// # 参数
    /// - record_type: 记录类型
    /// - row: 已做表头映射的数据行
    /// - today: "不晚于今天"的基准日期
    ///
    /// # 返回
    /// - Ok(Record): 候选记录
    /// - Err(Vec<ImportError>): 至少一条字段错误
    pub fn validate_row(
        &self,
        record_type: RecordType,
        row: &ParsedRow,
        today: NaiveDate,
    ) -> Result<Record, Vec<ImportError>> {
        let specs = schema::fields(record_type);
        let mut candidate = Record::new();
        let mut errors = Vec::new();

        for spec in specs {
            let raw = row.values.get(spec.key).filter(|v| !v.is_blank());
            let Some(raw) = raw else {
                if let Some(default) = spec.default {
                    candidate.insert(spec.key.to_string(), default_value(default));
                } else if spec.required {
                    errors.push(
                        ImportError::new(
                            row.row_number,
                            t_with_args("validate.required", &[("field", field_label(spec))]),
                        )
                        .with_field(spec.key),
                    );
                }
                continue;
            };

            match self.check_field(spec, raw.clone(), today) {
                Ok(value) => {
                    candidate.insert(spec.key.to_string(), value);
                }
                Err(message) => errors.push(
                    ImportError::new(row.row_number, message)
                        .with_field(spec.key)
                        .with_value(raw.clone()),
                ),
            }
        }

        // 非模式字段: 编号保留；引用 ID 字段只能由引用解析写入；其余原样透传
        let reserved: Vec<&str> = specs
            .iter()
            .filter_map(|spec| match spec.kind {
                FieldKind::Reference { id_field, .. } => Some(id_field),
                _ => None,
            })
            .collect();
        for (key, value) in &row.values {
            if schema::field(record_type, key).is_some() || reserved.contains(&key.as_str()) {
                continue;
            }
            if value.is_blank() {
                continue;
            }
            if key == ID_FIELD {
                candidate.insert(key.clone(), self.cleaner.coerce_text(value.clone()));
            } else {
                candidate.insert(key.clone(), value.clone());
            }
        }

        if errors.is_empty() {
            Ok(candidate)
        } else {
            Err(errors)
        }
    }

    /// 单字段转换 + 规则检查，返回规范化取值或错误消息
    fn check_field(
        &self,
        spec: &FieldSpec,
        raw: FieldValue,
        today: NaiveDate,
    ) -> Result<FieldValue, String> {
        let label = field_label(spec);
        let value = self
            .cleaner
            .coerce(&spec.kind, raw)
            .map_err(|e| e.message())?;

        match spec.kind {
            FieldKind::Text => {
                let text = value.as_text().unwrap_or_default().to_string();
                check_length(spec, label, &text)?;
                if let Some(rule) = spec.pattern {
                    if !rule.is_match(&text) {
                        return Err(t_with_args(
                            "validate.pattern",
                            &[("field", label), ("rule", rule.describe())],
                        ));
                    }
                }
                Ok(FieldValue::Text(text))
            }
            FieldKind::Enum(table) => {
                let text = value.as_text().unwrap_or_default();
                table
                    .resolve(text)
                    .map(FieldValue::text)
                    .ok_or_else(|| {
                        t_with_args(
                            "validate.invalid_enum",
                            &[
                                ("field", label),
                                ("value", text),
                                ("options", &table.describe()),
                            ],
                        )
                    })
            }
            FieldKind::Reference { .. } => {
                let name = value.as_text().unwrap_or_default().to_string();
                check_length(spec, label, &name)?;
                Ok(FieldValue::Reference(name))
            }
            FieldKind::Date => {
                if let Some(date) = value.as_date() {
                    if spec.not_future && date > today {
                        return Err(t_with_args("validate.future_date", &[("field", label)]));
                    }
                }
                Ok(value)
            }
            FieldKind::Amount => {
                let amount = value.as_amount().unwrap_or_default();
                if spec.positive && amount <= 0.0 {
                    return Err(t_with_args("validate.not_positive", &[("field", label)]));
                }
                Ok(FieldValue::Amount((amount * 100.0).round() / 100.0))
            }
            FieldKind::Boolean => Ok(value),
        }
    }
}

fn check_length(spec: &FieldSpec, label: &str, text: &str) -> Result<(), String> {
    let len = text.chars().count();
    if let Some(min) = spec.min_len {
        if len < min {
            return Err(t_with_args(
                "validate.too_short",
                &[("field", label), ("min", &min.to_string())],
            ));
        }
    }
    if let Some(max) = spec.max_len {
        if len > max {
            return Err(t_with_args(
                "validate.too_long",
                &[("field", label), ("max", &max.to_string())],
            ));
        }
    }
    Ok(())
}

fn default_value(default: DefaultValue) -> FieldValue {
    match default {
        DefaultValue::Code(code) => FieldValue::text(code),
        DefaultValue::Bool(b) => FieldValue::Boolean(b),
    }
}
