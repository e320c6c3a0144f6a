// ==========================================
// 教会行政数据交换系统 - 表头映射器（ColumnNormalizer）
// ==========================================
// 职责: 本地化表头/别名 → 规范字段名
// 规则: 调用方覆盖映射优先，其次为字段表中的中文/英文/别名
// 未识别的表头原样保留（不参与校验）
// ==========================================

use crate::domain::record_type::RecordType;
use crate::domain::result::ParsedRow;
use crate::domain::schema::{self, FieldKind, FieldSpec, ID_FIELD};
use crate::domain::value::Record;
use std::collections::HashMap;

/// 表头比较用的规范形式
fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_end_matches('*')
        .trim()
        .to_lowercase()
        .replace('_', " ")
}

/// 按表头名称精确查找字段（忽略大小写、下划线与必填标记 *）
pub fn lookup_header(record_type: RecordType, header: &str) -> Option<&'static FieldSpec> {
    let wanted = normalize_header(header);
    if wanted.is_empty() {
        return None;
    }
    schema::fields(record_type)
        .iter()
        .find(|spec| spec.header_names().any(|name| normalize_header(name) == wanted))
}

/// 是否为记录 ID 列
pub fn is_id_header(header: &str) -> bool {
    let wanted = normalize_header(header);
    schema::id_header_names().any(|name| normalize_header(name) == wanted)
}

/// 读取阶段的类型推断：精确匹配优先，其次按子串匹配日期/布尔/金额字段
///
/// 例如 "受洗日期(公历)" 会按子串命中"受洗日期"。
pub fn guess_field(record_type: RecordType, header: &str) -> Option<&'static FieldSpec> {
    if let Some(spec) = lookup_header(record_type, header) {
        return Some(spec);
    }
    let wanted = normalize_header(header);
    if wanted.is_empty() {
        return None;
    }
    schema::fields(record_type)
        .iter()
        .filter(|spec| {
            matches!(
                spec.kind,
                FieldKind::Date | FieldKind::Boolean | FieldKind::Amount
            )
        })
        .find(|spec| {
            [spec.label, spec.en_label]
                .into_iter()
                .map(normalize_header)
                .any(|name| name.chars().count() >= 2 && wanted.contains(&name))
        })
}

pub struct ColumnNormalizer;

impl ColumnNormalizer {
    /// 解析单个表头对应的规范字段名
    ///
    /// # 返回
    /// - Some(key): 命中覆盖映射、ID 列或字段表
    /// - None: 未识别（调用方原样保留）
    pub fn resolve_header(
        &self,
        record_type: RecordType,
        header: &str,
        overrides: &HashMap<String, String>,
    ) -> Option<String> {
        if let Some(target) = overrides.get(header).or_else(|| overrides.get(header.trim())) {
            return Some(target.trim().to_string());
        }
        if is_id_header(header) {
            return Some(ID_FIELD.to_string());
        }
        lookup_header(record_type, header).map(|spec| spec.key.to_string())
    }

    /// 重写全部行的表头（纯函数，不修改输入）
    ///
    /// 多列映射到同一规范字段时，首列生效，其余列按原表头保留。
    pub fn normalize(
        &self,
        record_type: RecordType,
        rows: &[ParsedRow],
        headers: &[String],
        overrides: &HashMap<String, String>,
    ) -> Vec<ParsedRow> {
        let headers = self.effective_headers(rows, headers);
        let mapping = self.header_mapping(record_type, &headers, overrides);
        rows.iter()
            .map(|row| {
                let mut normalized = Record::new();
                for (header, value) in &row.values {
                    let key = mapping
                        .get(header)
                        .cloned()
                        .unwrap_or_else(|| header.clone());
                    normalized.entry(key).or_insert_with(|| value.clone());
                }
                ParsedRow::new(row.row_number, normalized)
            })
            .collect()
    }

    /// 表头 → 规范字段映射（按列顺序，首列占用规范字段）
    fn header_mapping(
        &self,
        record_type: RecordType,
        headers: &[String],
        overrides: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut mapping = HashMap::new();
        let mut taken: Vec<String> = Vec::new();
        for header in headers {
            if let Some(key) = self.resolve_header(record_type, header, overrides) {
                if taken.contains(&key) {
                    tracing::warn!(
                        record_type = %record_type,
                        header = %header,
                        field = %key,
                        "多列映射到同一字段，保留首列"
                    );
                    continue;
                }
                taken.push(key.clone());
                mapping.insert(header.clone(), key);
            }
        }
        mapping
    }

    /// 未提供表头顺序时，按行内出现的表头（字典序）推断
    fn effective_headers(&self, rows: &[ParsedRow], headers: &[String]) -> Vec<String> {
        if !headers.is_empty() {
            return headers.to_vec();
        }
        let mut seen: Vec<String> = Vec::new();
        for row in rows {
            for header in row.values.keys() {
                if !seen.contains(header) {
                    seen.push(header.clone());
                }
            }
        }
        seen
    }
}
