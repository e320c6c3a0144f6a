// ==========================================
// 教会行政数据交换系统 - 字段模式表
// ==========================================
// 职责: 每种记录类型的字段定义（表头标签/别名/类型/校验规则/默认值）
// 共享方: FileIngestor（类型推断）/ ColumnNormalizer / SchemaValidator / RecordFormatter
// ==========================================

use crate::domain::enum_alias::{
    EnumTable, ATTENDANCE_STATUS, CONTRIBUTION_CATEGORY, EXPENSE_STATUS, GENDER, MEMBER_STATUS,
    NODE_TYPE, PAYMENT_METHOD, SERVICE_TYPE, VISIT_TYPE,
};
use crate::domain::record_type::RecordType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 记录 ID 字段（导出时首列）
pub const ID_FIELD: &str = "id";
pub const ID_LABEL: &str = "编号";
const ID_ALIASES: &[&str] = &["ID", "记录编号", "record id"];

/// 按名称引用的目标实体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTarget {
    Member,
    Position,
    Department,
    Organization,
}

impl ReferenceTarget {
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceTarget::Member => "成员",
            ReferenceTarget::Position => "职分",
            ReferenceTarget::Department => "部门",
            ReferenceTarget::Organization => "组织",
        }
    }

    pub fn en_label(&self) -> &'static str {
        match self {
            ReferenceTarget::Member => "Member",
            ReferenceTarget::Position => "Position",
            ReferenceTarget::Department => "Department",
            ReferenceTarget::Organization => "Organization",
        }
    }
}

/// 正则规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRule {
    Phone,
    Email,
    /// 组织编码：大写字母/数字开头，2-20 位
    Code,
    /// 收据编号
    Receipt,
}

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9\- ()]{5,18}[0-9]$").expect("phone regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("email regex")
});
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_\-]{1,19}$").expect("code regex"));
static RECEIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-]{1,30}$").expect("receipt regex"));

impl PatternRule {
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            PatternRule::Phone => PHONE_RE.is_match(value),
            PatternRule::Email => EMAIL_RE.is_match(value),
            PatternRule::Code => CODE_RE.is_match(value),
            PatternRule::Receipt => RECEIPT_RE.is_match(value),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            PatternRule::Phone => "电话号码格式",
            PatternRule::Email => "邮箱格式",
            PatternRule::Code => "编码格式（大写字母/数字，2-20 位）",
            PatternRule::Receipt => "收据编号格式（字母/数字/连字符，最多 30 位）",
        }
    }
}

/// 字段类型
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Date,
    Amount,
    Boolean,
    Enum(&'static EnumTable),
    /// 按名称引用；解析成功后写入 `id_field`
    Reference {
        target: ReferenceTarget,
        id_field: &'static str,
    },
}

/// 缺省值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Code(&'static str),
    Bool(bool),
}

/// 单个字段定义
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub en_label: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub required: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub pattern: Option<PatternRule>,
    pub not_future: bool,
    pub positive: bool,
    pub default: Option<DefaultValue>,
}

impl FieldSpec {
    const fn new(
        key: &'static str,
        label: &'static str,
        en_label: &'static str,
        aliases: &'static [&'static str],
        kind: FieldKind,
    ) -> Self {
        FieldSpec {
            key,
            label,
            en_label,
            aliases,
            kind,
            required: false,
            min_len: None,
            max_len: None,
            pattern: None,
            not_future: false,
            positive: false,
            default: None,
        }
    }

    const fn required(self) -> Self {
        FieldSpec {
            required: true,
            ..self
        }
    }

    const fn max_len(self, max: usize) -> Self {
        FieldSpec {
            max_len: Some(max),
            ..self
        }
    }

    const fn min_len(self, min: usize) -> Self {
        FieldSpec {
            min_len: Some(min),
            ..self
        }
    }

    const fn pattern(self, rule: PatternRule) -> Self {
        FieldSpec {
            pattern: Some(rule),
            ..self
        }
    }

    const fn not_future(self) -> Self {
        FieldSpec {
            not_future: true,
            ..self
        }
    }

    const fn positive(self) -> Self {
        FieldSpec {
            positive: true,
            ..self
        }
    }

    const fn default_value(self, value: DefaultValue) -> Self {
        FieldSpec {
            default: Some(value),
            ..self
        }
    }

    /// 表头可匹配的全部名称（规范键/中文/英文/别名）
    pub fn header_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        [self.key, self.label, self.en_label]
            .into_iter()
            .chain(self.aliases.iter().copied())
    }
}

const fn text(
    key: &'static str,
    label: &'static str,
    en: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec::new(key, label, en, aliases, FieldKind::Text)
}

const fn date(
    key: &'static str,
    label: &'static str,
    en: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec::new(key, label, en, aliases, FieldKind::Date)
}

const fn amount(
    key: &'static str,
    label: &'static str,
    en: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec::new(key, label, en, aliases, FieldKind::Amount)
}

const fn boolean(
    key: &'static str,
    label: &'static str,
    en: &'static str,
    aliases: &'static [&'static str],
) -> FieldSpec {
    FieldSpec::new(key, label, en, aliases, FieldKind::Boolean)
}

const fn enumeration(
    key: &'static str,
    label: &'static str,
    en: &'static str,
    aliases: &'static [&'static str],
    table: &'static EnumTable,
) -> FieldSpec {
    FieldSpec::new(key, label, en, aliases, FieldKind::Enum(table))
}

const fn reference(
    key: &'static str,
    label: &'static str,
    en: &'static str,
    aliases: &'static [&'static str],
    target: ReferenceTarget,
    id_field: &'static str,
) -> FieldSpec {
    FieldSpec::new(key, label, en, aliases, FieldKind::Reference { target, id_field })
}

// ==========================================
// 各记录类型字段表
// ==========================================

static MEMBER_FIELDS: &[FieldSpec] = &[
    text("name", "姓名", "Name", &["名字", "成员姓名", "full name"])
        .required()
        .min_len(1)
        .max_len(50),
    enumeration("gender", "性别", "Gender", &["sex"], &GENDER),
    date("birth_date", "出生日期", "Birth Date", &["生日", "birthday", "date of birth"]).not_future(),
    text("phone", "电话", "Phone", &["手机", "联系电话", "手机号", "mobile"]).pattern(PatternRule::Phone),
    text("email", "邮箱", "Email", &["电子邮件", "电子邮箱", "e-mail"])
        .max_len(100)
        .pattern(PatternRule::Email),
    text("address", "地址", "Address", &["住址", "家庭住址"]).max_len(200),
    enumeration("status", "状态", "Status", &["成员状态"], &MEMBER_STATUS)
        .default_value(DefaultValue::Code("active")),
    date("registered_date", "登记日期", "Registered Date", &["入会日期", "登记时间"]).not_future(),
    date("baptism_date", "受洗日期", "Baptism Date", &["洗礼日期"]).not_future(),
    date("confirmation_date", "坚信礼日期", "Confirmation Date", &["坚振日期", "坚信日期"]).not_future(),
    boolean("is_baptized", "是否受洗", "Baptized", &["已受洗", "受洗"]),
    reference(
        "department_name",
        "所属部门",
        "Department",
        &["部门"],
        ReferenceTarget::Department,
        "department_id",
    ),
    reference(
        "position_name",
        "职分",
        "Position",
        &["职务", "职位"],
        ReferenceTarget::Position,
        "position_id",
    ),
    text("notes", "备注", "Notes", &["说明", "remark", "remarks"]).max_len(500),
];

static CONTRIBUTION_FIELDS: &[FieldSpec] = &[
    reference(
        "member_name",
        "成员姓名",
        "Member",
        &["奉献人", "姓名", "member name"],
        ReferenceTarget::Member,
        "member_id",
    )
    .required(),
    date("contribution_date", "奉献日期", "Date", &["日期", "contribution date"])
        .required()
        .not_future(),
    amount("amount", "金额", "Amount", &["奉献金额", "数额"]).required().positive(),
    enumeration("category", "奉献类别", "Category", &["类别", "奉献种类"], &CONTRIBUTION_CATEGORY),
    enumeration("method", "支付方式", "Payment Method", &["方式", "method"], &PAYMENT_METHOD)
        .default_value(DefaultValue::Code("cash")),
    text("receipt_no", "收据编号", "Receipt No", &["收据号", "receipt number"]).pattern(PatternRule::Receipt),
    text("notes", "备注", "Notes", &["说明", "remark"]).max_len(500),
];

static ATTENDANCE_FIELDS: &[FieldSpec] = &[
    reference(
        "member_name",
        "成员姓名",
        "Member",
        &["姓名", "member name"],
        ReferenceTarget::Member,
        "member_id",
    )
    .required(),
    date("attendance_date", "出勤日期", "Date", &["日期", "聚会日期"])
        .required()
        .not_future(),
    enumeration("service_type", "聚会类型", "Service", &["聚会", "service type"], &SERVICE_TYPE)
        .default_value(DefaultValue::Code("sunday")),
    enumeration("status", "出勤状态", "Status", &["状态", "出勤"], &ATTENDANCE_STATUS).required(),
    text("notes", "备注", "Notes", &["说明"]).max_len(500),
];

static VISITATION_FIELDS: &[FieldSpec] = &[
    reference(
        "member_name",
        "被探访人",
        "Member",
        &["成员姓名", "姓名", "member name"],
        ReferenceTarget::Member,
        "member_id",
    )
    .required(),
    date("visit_date", "探访日期", "Visit Date", &["日期"]).required().not_future(),
    text("visitor_name", "探访人", "Visitor", &["探访同工", "visitor name"])
        .required()
        .max_len(50),
    enumeration("visit_type", "探访类型", "Visit Type", &["类型"], &VISIT_TYPE),
    text("summary", "探访内容", "Summary", &["内容", "记录"]).required().max_len(2000),
    boolean("follow_up_needed", "需要跟进", "Follow-up Needed", &["是否跟进"])
        .default_value(DefaultValue::Bool(false)),
    date("follow_up_date", "跟进日期", "Follow-up Date", &["回访日期"]),
    text("notes", "备注", "Notes", &["说明"]).max_len(500),
];

static EXPENSE_FIELDS: &[FieldSpec] = &[
    text("title", "标题", "Title", &["事由", "报销事由"]).required().max_len(100),
    reference(
        "department_name",
        "申请部门",
        "Department",
        &["部门"],
        ReferenceTarget::Department,
        "department_id",
    )
    .required(),
    reference(
        "requester_name",
        "申请人",
        "Requester",
        &["报销人"],
        ReferenceTarget::Member,
        "requester_id",
    )
    .required(),
    amount("amount", "金额", "Amount", &["报销金额"]).required().positive(),
    date("expense_date", "支出日期", "Expense Date", &["发生日期"]).required().not_future(),
    date("submitted_date", "提交日期", "Submitted Date", &["申请日期"]).required(),
    date("approved_date", "审批日期", "Approved Date", &["批准日期"]),
    enumeration("status", "审批状态", "Status", &["状态"], &EXPENSE_STATUS)
        .default_value(DefaultValue::Code("pending")),
    boolean("receipt_attached", "附收据", "Receipt Attached", &["有收据", "是否附收据"]),
    text("notes", "备注", "Notes", &["说明"]).max_len(500),
];

static ORGANIZATION_FIELDS: &[FieldSpec] = &[
    text("code", "组织编码", "Code", &["编码", "代码"]).required().pattern(PatternRule::Code),
    text("name", "组织名称", "Name", &["名称"]).required().max_len(100),
    enumeration("node_type", "组织类型", "Type", &["类型"], &NODE_TYPE),
    reference(
        "parent_name",
        "上级组织",
        "Parent",
        &["上级", "parent name"],
        ReferenceTarget::Organization,
        "parent_id",
    ),
    reference(
        "leader_name",
        "负责人",
        "Leader",
        &["带领人"],
        ReferenceTarget::Member,
        "leader_id",
    ),
    date("established_date", "成立日期", "Established", &["设立日期"]).not_future(),
    boolean("is_active", "是否启用", "Active", &["启用"]).default_value(DefaultValue::Bool(true)),
    text("notes", "备注", "Notes", &["说明"]).max_len(500),
];

/// 获取记录类型的字段表
pub fn fields(record_type: RecordType) -> &'static [FieldSpec] {
    match record_type {
        RecordType::Member => MEMBER_FIELDS,
        RecordType::Contribution => CONTRIBUTION_FIELDS,
        RecordType::AttendanceMark => ATTENDANCE_FIELDS,
        RecordType::VisitationNote => VISITATION_FIELDS,
        RecordType::ExpenseReport => EXPENSE_FIELDS,
        RecordType::OrganizationNode => ORGANIZATION_FIELDS,
    }
}

/// 按规范键查找字段定义
pub fn field(record_type: RecordType, key: &str) -> Option<&'static FieldSpec> {
    fields(record_type).iter().find(|f| f.key == key)
}

/// ID 列可匹配的全部名称
pub fn id_header_names() -> impl Iterator<Item = &'static str> {
    [ID_FIELD, ID_LABEL].into_iter().chain(ID_ALIASES.iter().copied())
}

/// 跨字段日期先后规则: (较早字段, 较晚字段)
pub fn date_order_rules(record_type: RecordType) -> &'static [(&'static str, &'static str)] {
    match record_type {
        RecordType::Member => &[
            ("birth_date", "baptism_date"),
            ("baptism_date", "confirmation_date"),
        ],
        RecordType::VisitationNote => &[("visit_date", "follow_up_date")],
        RecordType::ExpenseReport => &[
            ("expense_date", "submitted_date"),
            ("submitted_date", "approved_date"),
        ],
        RecordType::Contribution
        | RecordType::AttendanceMark
        | RecordType::OrganizationNode => &[],
    }
}

/// 需要查重的唯一字段
pub fn unique_fields(record_type: RecordType) -> &'static [&'static str] {
    match record_type {
        RecordType::Member => &["email"],
        RecordType::OrganizationNode => &["code"],
        _ => &[],
    }
}

/// 仅在"仅新增"模式下按名称查重的字段
pub fn name_collision_field(record_type: RecordType) -> Option<&'static str> {
    match record_type {
        RecordType::Member | RecordType::OrganizationNode => Some("name"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_header_names_unique_within_record_type() {
        for rt in RecordType::ALL {
            let mut seen: HashSet<String> = id_header_names().map(|n| n.to_lowercase()).collect();
            for spec in fields(rt) {
                // 同一字段内的大小写重复（如 name/Name）不算冲突
                let own: HashSet<String> = spec.header_names().map(|n| n.to_lowercase()).collect();
                for name in own {
                    assert!(seen.insert(name.clone()), "{} 的表头名称重复: {}", rt, name);
                }
            }
        }
    }

    #[test]
    fn test_patterns() {
        assert!(PatternRule::Email.is_match("ok@x.com"));
        assert!(!PatternRule::Email.is_match("bad-email"));
        assert!(PatternRule::Phone.is_match("138-0000-1234"));
        assert!(PatternRule::Phone.is_match("+86 10 1234 5678"));
        assert!(!PatternRule::Phone.is_match("call me"));
        assert!(PatternRule::Code.is_match("ORG-01"));
        assert!(!PatternRule::Code.is_match("org 01"));
    }

    #[test]
    fn test_date_order_rules_reference_existing_fields() {
        for rt in RecordType::ALL {
            for (earlier, later) in date_order_rules(rt) {
                assert!(field(rt, earlier).is_some());
                assert!(field(rt, later).is_some());
            }
        }
    }
}
