// ==========================================
// 教会行政数据交换系统 - 枚举别名表
// ==========================================
// 职责: 规范代码 ↔ 可接受别名 ↔ 显示标签 的双向映射
// 共享方: SchemaValidator（导入解析）/ RecordFormatter（导出显示）
// ==========================================

/// 单个枚举项
#[derive(Debug, Clone, Copy)]
pub struct EnumEntry {
    /// 规范代码（落库值）
    pub code: &'static str,
    /// 中文显示标签（导出使用）
    pub label: &'static str,
    /// 英文显示标签
    pub en_label: &'static str,
    /// 其他可接受写法
    pub aliases: &'static [&'static str],
}

/// 一组枚举项
#[derive(Debug)]
pub struct EnumTable {
    pub name: &'static str,
    pub entries: &'static [EnumEntry],
}

impl EnumTable {
    /// 将输入解析为规范代码（忽略大小写与首尾空白）
    pub fn resolve(&self, input: &str) -> Option<&'static str> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| {
                entry.code.to_lowercase() == needle
                    || entry.label.to_lowercase() == needle
                    || entry.en_label.to_lowercase() == needle
                    || entry.aliases.iter().any(|a| a.to_lowercase() == needle)
            })
            .map(|entry| entry.code)
    }

    /// 规范代码 → 中文显示标签
    pub fn label(&self, code: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|entry| entry.code == code)
            .map(|entry| entry.label)
    }

    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.code)
    }

    /// 用于错误提示的可选值列表
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}({})", entry.label, entry.code))
            .collect::<Vec<_>>()
            .join("/")
    }
}

const fn entry(
    code: &'static str,
    label: &'static str,
    en_label: &'static str,
    aliases: &'static [&'static str],
) -> EnumEntry {
    EnumEntry {
        code,
        label,
        en_label,
        aliases,
    }
}

pub static GENDER: EnumTable = EnumTable {
    name: "gender",
    entries: &[
        entry("male", "男", "Male", &["m", "男性", "弟兄"]),
        entry("female", "女", "Female", &["f", "女性", "姊妹"]),
    ],
};

pub static MEMBER_STATUS: EnumTable = EnumTable {
    name: "member_status",
    entries: &[
        entry("active", "在籍", "Active", &["正常", "活跃"]),
        entry("inactive", "不活跃", "Inactive", &["停止聚会", "休眠"]),
        entry("transferred", "已转出", "Transferred", &["转出", "转会"]),
        entry("deceased", "已故", "Deceased", &["安息", "离世"]),
    ],
};

pub static CONTRIBUTION_CATEGORY: EnumTable = EnumTable {
    name: "contribution_category",
    entries: &[
        entry("tithe", "十一奉献", "Tithe", &["十一"]),
        entry("thanksgiving", "感恩奉献", "Thanksgiving", &["感恩"]),
        entry("mission", "宣教奉献", "Mission", &["宣教"]),
        entry("building", "建堂奉献", "Building", &["建堂"]),
        entry("offering", "主日奉献", "Sunday Offering", &["主日", "献金"]),
        entry("other", "其他奉献", "Other", &["其他"]),
    ],
};

pub static PAYMENT_METHOD: EnumTable = EnumTable {
    name: "payment_method",
    entries: &[
        entry("cash", "现金", "Cash", &[]),
        entry("transfer", "转账", "Bank Transfer", &["银行转账", "汇款"]),
        entry("card", "刷卡", "Card", &["银行卡", "信用卡"]),
        entry("check", "支票", "Check", &["cheque"]),
    ],
};

pub static SERVICE_TYPE: EnumTable = EnumTable {
    name: "service_type",
    entries: &[
        entry("sunday", "主日崇拜", "Sunday Service", &["主日", "sunday worship"]),
        entry("wednesday", "周三祷告会", "Wednesday Prayer", &["周三", "祷告会"]),
        entry("dawn", "晨祷会", "Dawn Prayer", &["晨祷"]),
        entry("small_group", "小组聚会", "Small Group", &["小组", "cell group"]),
        entry("other", "其他聚会", "Other", &["其他"]),
    ],
};

pub static ATTENDANCE_STATUS: EnumTable = EnumTable {
    name: "attendance_status",
    entries: &[
        entry("P", "出席", "Present", &["到", "√", "o"]),
        entry("A", "缺席", "Absent", &["未到", "×", "x"]),
        entry("L", "迟到", "Late", &[]),
        entry("E", "请假", "Excused", &["事假", "病假"]),
    ],
};

pub static VISIT_TYPE: EnumTable = EnumTable {
    name: "visit_type",
    entries: &[
        entry("home", "家庭探访", "Home Visit", &["家访", "家庭"]),
        entry("hospital", "医院探访", "Hospital Visit", &["医院", "探病"]),
        entry("phone", "电话探访", "Phone Call", &["电话", "phone"]),
        entry("other", "其他探访", "Other", &["其他"]),
    ],
};

pub static EXPENSE_STATUS: EnumTable = EnumTable {
    name: "expense_status",
    entries: &[
        entry("pending", "待审批", "Pending", &["审批中", "已提交"]),
        entry("approved", "已批准", "Approved", &["批准", "通过"]),
        entry("rejected", "已驳回", "Rejected", &["驳回", "拒绝"]),
        entry("paid", "已支付", "Paid", &["已付款", "支付"]),
    ],
};

pub static NODE_TYPE: EnumTable = EnumTable {
    name: "node_type",
    entries: &[
        entry("congregation", "教会", "Congregation", &["堂会"]),
        entry("district", "教区", "District", &["牧区"]),
        entry("department", "部门", "Department", &["事工部"]),
        entry("group", "小组", "Group", &["团契"]),
        entry("committee", "委员会", "Committee", &["同工会"]),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_code_label_and_alias() {
        assert_eq!(ATTENDANCE_STATUS.resolve("P"), Some("P"));
        assert_eq!(ATTENDANCE_STATUS.resolve("p"), Some("P"));
        assert_eq!(ATTENDANCE_STATUS.resolve("出席"), Some("P"));
        assert_eq!(ATTENDANCE_STATUS.resolve("present"), Some("P"));
        assert_eq!(ATTENDANCE_STATUS.resolve("请假"), Some("E"));
        assert_eq!(ATTENDANCE_STATUS.resolve("maybe"), None);
        assert_eq!(ATTENDANCE_STATUS.resolve("  "), None);
    }

    #[test]
    fn test_label_is_resolvable_for_every_table() {
        // 导出标签必须能被导入重新识别
        for table in [
            &GENDER,
            &MEMBER_STATUS,
            &CONTRIBUTION_CATEGORY,
            &PAYMENT_METHOD,
            &SERVICE_TYPE,
            &ATTENDANCE_STATUS,
            &VISIT_TYPE,
            &EXPENSE_STATUS,
            &NODE_TYPE,
        ] {
            for code in table.codes() {
                let label = table.label(code).unwrap();
                assert_eq!(table.resolve(label), Some(code), "table {}", table.name);
            }
        }
    }
}
