// ==========================================
// 教会行政数据交换系统 - 引用校验器（ReferentialValidator）
// ==========================================
// 职责: 名称引用解析 / 跨字段日期先后 / 唯一键冲突（已有记录与文件内）
// 上下文: 每次管道调用只加载一次 ValidationContext，全部行共享
// 组织上级: 引用本文件其他行定义的组织时，以 Reference 占位延后到落库阶段解析；
//           校验前先按上级关系重排，保证上级行先于下级行处理
// ==========================================

use crate::domain::context::{MemberSnapshot, OrganizationSnapshot, Resolution, ValidationContext};
use crate::domain::options::{DuplicateMode, RecordFilter};
use crate::domain::record_type::RecordType;
use crate::domain::result::{ImportError, ParsedRow};
use crate::domain::schema::{self, FieldKind, ReferenceTarget};
use crate::domain::value::{FieldValue, Record};
use crate::i18n::{field_label, reference_label, t_with_args};
use crate::repository::{RecordStore, ReferenceKind, RepositoryResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// 从存储加载校验上下文（成员/职分/部门/组织）
#[instrument(skip(store))]
pub async fn load_validation_context(store: &dyn RecordStore) -> RepositoryResult<ValidationContext> {
    let all = RecordFilter::default();

    let members = store
        .find_all(RecordType::Member, &all)
        .await?
        .into_iter()
        .map(|record| MemberSnapshot {
            name: text_field(&record.fields, "name"),
            email: record
                .fields
                .get("email")
                .and_then(|v| v.as_text())
                .map(str::to_string),
            id: record.id,
        })
        .collect::<Vec<_>>();

    let organizations = store
        .find_all(RecordType::OrganizationNode, &all)
        .await?
        .into_iter()
        .map(|record| OrganizationSnapshot {
            code: text_field(&record.fields, "code"),
            name: text_field(&record.fields, "name"),
            id: record.id,
        })
        .collect::<Vec<_>>();

    let positions = store.list_reference_entries(ReferenceKind::Position).await?;
    let departments = store.list_reference_entries(ReferenceKind::Department).await?;

    debug!(
        members = members.len(),
        organizations = organizations.len(),
        positions = positions.len(),
        departments = departments.len(),
        "校验上下文加载完成"
    );
    Ok(ValidationContext::new(members, positions, departments, organizations))
}

fn text_field(fields: &Record, key: &str) -> String {
    fields
        .get(key)
        .and_then(|v| v.as_text())
        .unwrap_or_default()
        .to_string()
}

// ==========================================
// ReferenceValidator - 单次运行内有状态（记录文件内已出现的唯一键）
// ==========================================
pub struct ReferenceValidator<'a> {
    context: &'a ValidationContext,
    record_type: RecordType,
    duplicate_mode: DuplicateMode,
    /// 字段 → (规范化取值 → 首次出现的行号)
    seen_unique: HashMap<&'static str, HashMap<String, usize>>,
    /// 本次运行中已通过校验的组织名称
    pending_organizations: HashSet<String>,
}

impl<'a> ReferenceValidator<'a> {
    pub fn new(
        context: &'a ValidationContext,
        record_type: RecordType,
        duplicate_mode: DuplicateMode,
    ) -> Self {
        Self {
            context,
            record_type,
            duplicate_mode,
            seen_unique: HashMap::new(),
            pending_organizations: HashSet::new(),
        }
    }

    /// 校验单行候选记录
    ///
    /// 解析成功的引用写入对应 ID 字段，名称字段转为普通文本。
    /// 返回该行的全部错误；为空表示候选记录通过校验。
    pub fn check_row(&mut self, row: usize, candidate: &mut Record) -> Vec<ImportError> {
        let mut errors = Vec::new();

        self.resolve_references(row, candidate, &mut errors);
        self.check_date_order(row, candidate, &mut errors);
        self.check_duplicates(row, candidate, &mut errors);

        if errors.is_empty() && self.record_type == RecordType::OrganizationNode {
            if let Some(name) = candidate.get("name").and_then(|v| v.as_text()) {
                self.pending_organizations.insert(normalize(name));
            }
        }
        errors
    }

    // === 引用解析 ===
    fn resolve_references(&self, row: usize, candidate: &mut Record, errors: &mut Vec<ImportError>) {
        for spec in schema::fields(self.record_type) {
            let FieldKind::Reference { target, id_field } = spec.kind else {
                continue;
            };
            let Some(FieldValue::Reference(name)) = candidate.get(spec.key).cloned() else {
                continue;
            };

            match self.context.resolve(target, &name) {
                Resolution::Found(id) => {
                    candidate.insert(id_field.to_string(), FieldValue::Text(id));
                }
                Resolution::NotFound
                    if target == ReferenceTarget::Organization
                        && self.pending_organizations.contains(&normalize(&name)) =>
                {
                    // 延后到落库阶段解析
                    candidate.insert(id_field.to_string(), FieldValue::Reference(name.clone()));
                }
                Resolution::NotFound => {
                    errors.push(
                        ImportError::new(
                            row,
                            t_with_args(
                                "reference.not_found",
                                &[("target", reference_label(target)), ("name", &name)],
                            ),
                        )
                        .with_field(spec.key)
                        .with_value(FieldValue::text(name.clone())),
                    );
                }
                Resolution::Ambiguous(count) => {
                    errors.push(
                        ImportError::new(
                            row,
                            t_with_args(
                                "reference.ambiguous",
                                &[
                                    ("target", reference_label(target)),
                                    ("name", &name),
                                    ("count", &count.to_string()),
                                ],
                            ),
                        )
                        .with_field(spec.key)
                        .with_value(FieldValue::text(name.clone())),
                    );
                }
            }
            candidate.insert(spec.key.to_string(), FieldValue::Text(name));
        }
    }

    // === 跨字段日期先后 ===
    fn check_date_order(&self, row: usize, candidate: &Record, errors: &mut Vec<ImportError>) {
        for (earlier, later) in schema::date_order_rules(self.record_type) {
            let first = candidate.get(*earlier).and_then(|v| v.as_date());
            let second = candidate.get(*later).and_then(|v| v.as_date());
            let (Some(first), Some(second)) = (first, second) else {
                continue;
            };
            if second < first {
                let label_of = |key: &str| {
                    schema::field(self.record_type, key)
                        .map(field_label)
                        .unwrap_or("")
                };
                errors.push(
                    ImportError::new(
                        row,
                        t_with_args(
                            "reference.date_order",
                            &[("later", label_of(*later)), ("earlier", label_of(*earlier))],
                        ),
                    )
                    .with_field(*later)
                    .with_value(FieldValue::Date(second)),
                );
            }
        }
    }

    // === 唯一键冲突 ===
    fn check_duplicates(&mut self, row: usize, candidate: &Record, errors: &mut Vec<ImportError>) {
        let record_type = self.record_type;
        for field in schema::unique_fields(record_type).iter().copied() {
            let Some(value) = candidate.get(field).and_then(|v| v.as_text()) else {
                continue;
            };
            let label = schema::field(record_type, field)
                .map(field_label)
                .unwrap_or(field);

            // 文件内重复: 第二次出现的行报错
            let seen = self.seen_unique.entry(field).or_default();
            match seen.get(&normalize(value)) {
                Some(first_row) => errors.push(
                    ImportError::new(
                        row,
                        t_with_args(
                            "reference.duplicate_in_file",
                            &[
                                ("field", label),
                                ("row", &first_row.to_string()),
                                ("value", value),
                            ],
                        ),
                    )
                    .with_field(field)
                    .with_value(FieldValue::text(value)),
                ),
                None => {
                    seen.insert(normalize(value), row);
                }
            }

            if self.duplicate_mode == DuplicateMode::CreateOnly
                && self.context.existing_unique(record_type, field, value).is_some()
            {
                errors.push(
                    ImportError::new(
                        row,
                        t_with_args(
                            "reference.duplicate_existing",
                            &[("field", label), ("value", value)],
                        ),
                    )
                    .with_field(field)
                    .with_value(FieldValue::text(value)),
                );
            }
        }

        if self.duplicate_mode == DuplicateMode::CreateOnly {
            if let Some(field) = schema::name_collision_field(record_type) {
                if let Some(name) = candidate.get(field).and_then(|v| v.as_text()) {
                    if self.context.name_exists(record_type, name) {
                        errors.push(
                            ImportError::new(
                                row,
                                t_with_args("reference.name_exists", &[("value", name)]),
                            )
                            .with_field(field)
                            .with_value(FieldValue::text(name)),
                        );
                    }
                }
            }
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// 组织行按上级关系重排: 上级在本文件中定义时，上级行排在下级行之前
///
/// 其余行保持原有相对顺序；行号随行保留。循环引用的行按原顺序追加到末尾。
pub fn parents_first(rows: Vec<ParsedRow>) -> Vec<ParsedRow> {
    fn key_of(row: &ParsedRow, field: &str) -> Option<String> {
        row.values
            .get(field)
            .and_then(|v| v.as_text())
            .map(normalize)
            .filter(|s| !s.is_empty())
    }

    let defined: HashSet<String> = rows.iter().filter_map(|row| key_of(row, "name")).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut waiting: HashMap<String, Vec<ParsedRow>> = HashMap::new();
    let mut ordered = Vec::with_capacity(rows.len());

    for row in rows {
        let parent = key_of(&row, "parent_name");
        let own = key_of(&row, "name");
        if let Some(parent) = parent {
            if defined.contains(&parent) && !placed.contains(&parent) && own.as_ref() != Some(&parent) {
                waiting.entry(parent).or_default().push(row);
                continue;
            }
        }

        // 放入本行，并依次释放等待它的下级行
        let mut stack = vec![row];
        while let Some(next) = stack.pop() {
            if let Some(name) = key_of(&next, "name") {
                if placed.insert(name.clone()) {
                    if let Some(children) = waiting.remove(&name) {
                        stack.extend(children.into_iter().rev());
                    }
                }
            }
            ordered.push(next);
        }
    }

    if !waiting.is_empty() {
        let mut rest: Vec<ParsedRow> = waiting.into_values().flatten().collect();
        rest.sort_by_key(|row| row.row_number);
        debug!(rows = rest.len(), "组织上级存在循环引用");
        ordered.extend(rest);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::ReferenceEntry;
    use chrono::NaiveDate;

    fn context() -> ValidationContext {
        ValidationContext::new(
            vec![
                MemberSnapshot {
                    id: "m1".into(),
                    name: "张三".into(),
                    email: Some("zhang@example.com".into()),
                },
                MemberSnapshot {
                    id: "m2".into(),
                    name: "李四".into(),
                    email: None,
                },
                MemberSnapshot {
                    id: "m3".into(),
                    name: "李四".into(),
                    email: None,
                },
            ],
            vec![],
            vec![ReferenceEntry {
                id: "d1".into(),
                name: "诗班".into(),
            }],
            vec![OrganizationSnapshot {
                id: "o1".into(),
                code: "HQ".into(),
                name: "总堂".into(),
            }],
        )
    }

    fn record(pairs: &[(&str, FieldValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> FieldValue {
        FieldValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_resolves_names_to_ids() {
        let ctx = context();
        let mut validator =
            ReferenceValidator::new(&ctx, RecordType::Contribution, DuplicateMode::CreateOnly);
        let mut candidate = record(&[("member_name", FieldValue::Reference("张三".into()))]);

        assert!(validator.check_row(1, &mut candidate).is_empty());
        assert_eq!(candidate["member_id"], FieldValue::text("m1"));
        assert_eq!(candidate["member_name"], FieldValue::text("张三"));
    }

    #[test]
    fn test_missing_and_ambiguous_references() {
        let ctx = context();
        let mut validator =
            ReferenceValidator::new(&ctx, RecordType::Contribution, DuplicateMode::CreateOnly);

        let mut missing = record(&[("member_name", FieldValue::Reference("王五".into()))]);
        let errors = validator.check_row(1, &mut missing);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("member_name"));
        assert_eq!(errors[0].value, Some(FieldValue::text("王五")));
        assert!(!missing.contains_key("member_id"));

        let mut ambiguous = record(&[("member_name", FieldValue::Reference("李四".into()))]);
        assert_eq!(validator.check_row(2, &mut ambiguous).len(), 1);
    }

    #[test]
    fn test_date_order_violation() {
        let ctx = context();
        let mut validator =
            ReferenceValidator::new(&ctx, RecordType::Member, DuplicateMode::UpdateExisting);
        let mut candidate = record(&[
            ("name", FieldValue::text("王五")),
            ("baptism_date", date(2020, 5, 1)),
            ("confirmation_date", date(2019, 1, 1)),
        ]);
        let errors = validator.check_row(3, &mut candidate);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("confirmation_date"));
    }

    #[test]
    fn test_duplicates_in_file_and_existing() {
        let ctx = context();
        let mut validator =
            ReferenceValidator::new(&ctx, RecordType::Member, DuplicateMode::CreateOnly);

        let mut first = record(&[
            ("name", FieldValue::text("王五")),
            ("email", FieldValue::text("wang@example.com")),
        ]);
        let mut second = record(&[
            ("name", FieldValue::text("赵六")),
            ("email", FieldValue::text("WANG@example.com")),
        ]);
        let mut existing = record(&[
            ("name", FieldValue::text("张三")),
            ("email", FieldValue::text("zhang@example.com")),
        ]);

        assert!(validator.check_row(1, &mut first).is_empty());
        let errors = validator.check_row(2, &mut second);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 2);
        // 邮箱与姓名均与已有成员冲突
        assert_eq!(validator.check_row(3, &mut existing).len(), 2);
    }

    #[test]
    fn test_update_mode_allows_existing_keys() {
        let ctx = context();
        let mut validator =
            ReferenceValidator::new(&ctx, RecordType::Member, DuplicateMode::UpdateExisting);
        let mut existing = record(&[
            ("name", FieldValue::text("张三")),
            ("email", FieldValue::text("zhang@example.com")),
        ]);
        assert!(validator.check_row(1, &mut existing).is_empty());
    }

    #[test]
    fn test_parent_defined_earlier_in_file_is_deferred() {
        let ctx = context();
        let mut validator =
            ReferenceValidator::new(&ctx, RecordType::OrganizationNode, DuplicateMode::CreateOnly);

        let mut parent = record(&[
            ("code", FieldValue::text("NORTH")),
            ("name", FieldValue::text("北区")),
            ("parent_name", FieldValue::Reference("总堂".into())),
        ]);
        let mut child = record(&[
            ("code", FieldValue::text("NORTH-1")),
            ("name", FieldValue::text("北区一组")),
            ("parent_name", FieldValue::Reference("北区".into())),
        ]);
        let mut orphan = record(&[
            ("code", FieldValue::text("X1")),
            ("name", FieldValue::text("孤立小组")),
            ("parent_name", FieldValue::Reference("不存在".into())),
        ]);

        assert!(validator.check_row(1, &mut parent).is_empty());
        assert_eq!(parent["parent_id"], FieldValue::text("o1"));
        assert!(validator.check_row(2, &mut child).is_empty());
        assert_eq!(child["parent_id"], FieldValue::Reference("北区".into()));
        assert_eq!(validator.check_row(3, &mut orphan).len(), 1);
    }

    fn org_row(n: usize, name: &str, parent: &str) -> ParsedRow {
        let mut values = record(&[("name", FieldValue::text(name))]);
        if !parent.is_empty() {
            values.insert("parent_name".into(), FieldValue::text(parent));
        }
        ParsedRow::new(n, values)
    }

    #[test]
    fn test_parents_first_moves_parent_ahead_of_children() {
        let rows = vec![
            org_row(1, "北区小组", "北区"),
            org_row(2, "北区", "总会"),
            org_row(3, "南区", ""),
            org_row(4, "总会", ""),
            org_row(5, "外部", "总堂"),
        ];
        let order: Vec<usize> = parents_first(rows).iter().map(|r| r.row_number).collect();
        assert_eq!(order, vec![3, 4, 2, 1, 5]);
    }

    #[test]
    fn test_parents_first_keeps_cycles_at_the_end() {
        let rows = vec![
            org_row(1, "甲", "乙"),
            org_row(2, "乙", "甲"),
            org_row(3, "丙", ""),
        ];
        let order: Vec<usize> = parents_first(rows).iter().map(|r| r.row_number).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
