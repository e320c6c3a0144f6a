// ==========================================
// 教会行政数据交换系统 - 记录类型
// ==========================================
// 职责: 记录类型枚举 + 双语标签表 + 工作表分类
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 流经数据交换管道的记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Member,
    Contribution,
    AttendanceMark,
    VisitationNote,
    ExpenseReport,
    OrganizationNode,
}

/// 汇总工作表可接受的名称
const SUMMARY_SHEET_NAMES: &[&str] = &["汇总信息", "汇总", "备份信息", "summary", "metadata"];

/// 汇总工作表的规范名称
pub const SUMMARY_SHEET_NAME: &str = "汇总信息";

impl RecordType {
    /// 全部记录类型（导出顺序）
    pub const ALL: [RecordType; 6] = [
        RecordType::Member,
        RecordType::OrganizationNode,
        RecordType::Contribution,
        RecordType::AttendanceMark,
        RecordType::VisitationNote,
        RecordType::ExpenseReport,
    ];

    /// 恢复顺序：被引用方在前
    ///
    /// 组织架构的负责人引用成员，其余类型引用成员或部门。
    pub const RESTORE_ORDER: [RecordType; 6] = RecordType::ALL;

    /// 规范键（表名）
    pub fn key(&self) -> &'static str {
        match self {
            RecordType::Member => "member",
            RecordType::Contribution => "contribution",
            RecordType::AttendanceMark => "attendance_mark",
            RecordType::VisitationNote => "visitation_note",
            RecordType::ExpenseReport => "expense_report",
            RecordType::OrganizationNode => "organization_node",
        }
    }

    /// 中文显示名（工作表名）
    pub fn label(&self) -> &'static str {
        match self {
            RecordType::Member => "成员",
            RecordType::Contribution => "奉献",
            RecordType::AttendanceMark => "出勤",
            RecordType::VisitationNote => "探访记录",
            RecordType::ExpenseReport => "支出报销",
            RecordType::OrganizationNode => "组织架构",
        }
    }

    /// 英文显示名
    pub fn en_label(&self) -> &'static str {
        match self {
            RecordType::Member => "Members",
            RecordType::Contribution => "Contributions",
            RecordType::AttendanceMark => "Attendance",
            RecordType::VisitationNote => "Visitations",
            RecordType::ExpenseReport => "Expense Reports",
            RecordType::OrganizationNode => "Organization",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            RecordType::Member => &["会员", "教友", "成员名册", "member", "members"],
            RecordType::Contribution => &["奉献记录", "捐献", "contribution", "offerings"],
            RecordType::AttendanceMark => &["出勤记录", "考勤", "attendance mark"],
            RecordType::VisitationNote => &["探访", "visitation", "visits"],
            RecordType::ExpenseReport => &["报销", "支出", "expense", "expenses"],
            RecordType::OrganizationNode => &["组织", "organization node", "organizations"],
        }
    }

    /// 按名称查找记录类型（不区分大小写）
    pub fn from_name(name: &str) -> Option<RecordType> {
        let needle = normalize_name(name);
        if needle.is_empty() {
            return None;
        }
        RecordType::ALL.into_iter().find(|rt| {
            normalize_name(rt.key()) == needle
                || normalize_name(rt.label()) == needle
                || normalize_name(rt.en_label()) == needle
                || rt.aliases().iter().any(|a| normalize_name(a) == needle)
        })
    }

    /// 各类型用于日期区间筛选的主日期字段
    pub fn primary_date_field(&self) -> &'static str {
        match self {
            RecordType::Member => "registered_date",
            RecordType::Contribution => "contribution_date",
            RecordType::AttendanceMark => "attendance_date",
            RecordType::VisitationNote => "visit_date",
            RecordType::ExpenseReport => "expense_date",
            RecordType::OrganizationNode => "established_date",
        }
    }

    /// 更新模式下按顺序尝试的自然键（ID 之后）
    pub fn natural_keys(&self) -> &'static [&'static [&'static str]] {
        match self {
            RecordType::Member => &[&["email"], &["name"]],
            RecordType::Contribution => &[
                &["receipt_no"],
                &["member_id", "contribution_date", "amount", "category"],
            ],
            RecordType::AttendanceMark => &[&["member_id", "attendance_date", "service_type"]],
            RecordType::VisitationNote => &[&["member_id", "visit_date", "visitor_name"]],
            RecordType::ExpenseReport => &[&["title", "submitted_date", "requester_id"]],
            RecordType::OrganizationNode => &[&["code"], &["name"]],
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::from_name(s).ok_or_else(|| format!("未知记录类型: {}", s))
    }
}

/// 工作表分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetKind {
    Record(RecordType),
    Summary,
    Unknown(String),
}

impl SheetKind {
    /// 按工作表名分类（单次查表，不做子串匹配）
    pub fn classify(sheet_name: &str) -> SheetKind {
        if let Some(record_type) = RecordType::from_name(sheet_name) {
            return SheetKind::Record(record_type);
        }
        let needle = normalize_name(sheet_name);
        if SUMMARY_SHEET_NAMES
            .iter()
            .any(|name| normalize_name(name) == needle)
        {
            return SheetKind::Summary;
        }
        SheetKind::Unknown(sheet_name.to_string())
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(['_', '-'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bilingual_sheet_names() {
        assert_eq!(SheetKind::classify("成员"), SheetKind::Record(RecordType::Member));
        assert_eq!(SheetKind::classify("Members"), SheetKind::Record(RecordType::Member));
        assert_eq!(
            SheetKind::classify(" expense reports "),
            SheetKind::Record(RecordType::ExpenseReport)
        );
        assert_eq!(
            SheetKind::classify("attendance_mark"),
            SheetKind::Record(RecordType::AttendanceMark)
        );
        assert_eq!(SheetKind::classify("汇总信息"), SheetKind::Summary);
        assert_eq!(
            SheetKind::classify("Sheet1"),
            SheetKind::Unknown("Sheet1".to_string())
        );
    }

    #[test]
    fn test_labels_round_trip() {
        for rt in RecordType::ALL {
            assert_eq!(RecordType::from_name(rt.label()), Some(rt));
            assert_eq!(RecordType::from_name(rt.en_label()), Some(rt));
            assert_eq!(rt.key().parse::<RecordType>(), Ok(rt));
        }
    }

    #[test]
    fn test_restore_order_puts_members_first() {
        assert_eq!(RecordType::RESTORE_ORDER[0], RecordType::Member);
        assert_eq!(RecordType::RESTORE_ORDER.len(), RecordType::ALL.len());
    }
}
