// ==========================================
// 消息语言集成测试
// ==========================================
// 语言为进程级全局状态，单独一个测试二进制，且只含一个测试函数
// ==========================================

mod test_helpers;

use congregation_interchange::config::InterchangeConfig;
use congregation_interchange::{
    CancellationToken, ImportResult, InMemoryRecordStore, InterchangeApi, RecordType,
};
use std::sync::Arc;
use test_helpers::{import_options, row};

async fn import_unknown_member(api: &InterchangeApi) -> ImportResult {
    let rows = vec![row(
        1,
        &[("成员姓名", "Ghost"), ("奉献日期", "2024-03-03"), ("金额", "10")],
    )];
    api.import_data(rows, RecordType::Contribution, &import_options(), None, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_row_messages_follow_configured_locale() {
    // 默认配置: 中文
    let api = InterchangeApi::with_defaults(Arc::new(InMemoryRecordStore::new()));
    let result = import_unknown_member(&api).await;
    assert_eq!(result.summary.failed, 1);
    assert_eq!(result.errors[0].message, "未找到成员: Ghost");

    // 配置中的 default_locale
    let english = InterchangeConfig {
        default_locale: "en".to_string(),
        ..InterchangeConfig::default()
    };
    let api = InterchangeApi::new(Arc::new(InMemoryRecordStore::new()), Arc::new(english.clone()));
    let result = import_unknown_member(&api).await;
    assert_eq!(result.errors[0].message, "Member not found: Ghost");

    // with_locale 覆盖配置
    let api = InterchangeApi::new(Arc::new(InMemoryRecordStore::new()), Arc::new(english))
        .with_locale("zh-CN");
    let result = import_unknown_member(&api).await;
    assert_eq!(result.errors[0].message, "未找到成员: Ghost");
}
