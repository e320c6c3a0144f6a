// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持中文（默认）和英文
// 导出表头与工作表名固定使用中文标签，不随语言切换
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

use crate::domain::schema::{FieldSpec, ReferenceTarget};

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-CN" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 当前是否为英文
pub fn is_english() -> bool {
    current_locale().starts_with("en")
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use congregation_interchange::i18n::t;
/// let msg = t("common.success");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use congregation_interchange::i18n::t_with_args;
/// let msg = t_with_args("validate.required", &[("field", "姓名")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

/// 字段在行错误消息中的显示名
pub fn field_label(spec: &FieldSpec) -> &'static str {
    if is_english() {
        spec.en_label
    } else {
        spec.label
    }
}

/// 引用目标在行错误消息中的显示名
pub fn reference_label(target: ReferenceTarget) -> &'static str {
    if is_english() {
        target.en_label()
    } else {
        target.label()
    }
}
