// ==========================================
// 导入管道集成测试
// ==========================================
// 覆盖: 汇总不变量、行号与批大小无关、快速失败、仅校验、上传限制
// ==========================================

mod test_helpers;

use congregation_interchange::config::InterchangeConfig;
use congregation_interchange::repository::RecordStore;
use congregation_interchange::{
    ApiError, CancellationToken, DuplicateMode, ImportOptions, ImportResult, InMemoryRecordStore,
    InterchangeApi, RecordType,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use test_helpers::{import_options, member_rows, row, FaultyStore};

fn assert_summary_invariant(result: &ImportResult) {
    let summary = &result.summary;
    assert_eq!(summary.total, summary.successful + summary.failed);
    assert_eq!(result.data.len(), summary.successful);
    assert!(result.errors.len() >= summary.failed);
}

fn failed_rows(result: &ImportResult) -> BTreeSet<usize> {
    result.errors.iter().map(|e| e.row).collect()
}

#[tokio::test]
async fn test_invalid_email_and_blank_name_each_fail_their_row() {
    let api = InterchangeApi::with_defaults(Arc::new(InMemoryRecordStore::new()));
    let rows = vec![
        row(1, &[("name", "Kim"), ("email", "bad-email")]),
        row(2, &[("name", ""), ("email", "ok@x.com")]),
    ];

    let result = api
        .import_data(
            rows,
            RecordType::Member,
            &import_options(),
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.summary.total, 2);
    assert_eq!(result.summary.successful, 0);
    assert_eq!(result.summary.failed, 2);
    assert!(result
        .errors
        .iter()
        .any(|e| e.row == 1 && e.field.as_deref() == Some("email")));
    assert!(result
        .errors
        .iter()
        .any(|e| e.row == 2 && e.field.as_deref() == Some("name")));
    assert_summary_invariant(&result);
}

#[tokio::test]
async fn test_row_numbers_do_not_depend_on_batch_size() {
    let bad = [3, 17, 250, 499];
    let mut reported = Vec::new();

    for batch_size in [1, 10, 500] {
        let api = InterchangeApi::with_defaults(Arc::new(InMemoryRecordStore::new()));
        let options = ImportOptions {
            batch_size: Some(batch_size),
            ..import_options()
        };
        let result = api
            .import_data(
                member_rows(500, &bad),
                RecordType::Member,
                &options,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_summary_invariant(&result);
        assert_eq!(result.summary.successful, 496);
        reported.push(failed_rows(&result));
    }

    let expected: BTreeSet<usize> = bad.into_iter().collect();
    assert!(reported.iter().all(|rows| *rows == expected));
}

#[tokio::test]
async fn test_persistence_failures_keep_original_row_numbers() {
    for batch_size in [1, 10, 500] {
        let inner = Arc::new(InMemoryRecordStore::new());
        let store = Arc::new(FaultyStore::new(inner.clone()));
        store.fail_writes_named("成员42");
        let api = InterchangeApi::with_defaults(store);
        let options = ImportOptions {
            batch_size: Some(batch_size),
            ..import_options()
        };

        let result = api
            .import_data(
                member_rows(60, &[]),
                RecordType::Member,
                &options,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_summary_invariant(&result);
        assert_eq!(failed_rows(&result), BTreeSet::from([42]));
        assert_eq!(inner.count(RecordType::Member).await.unwrap(), 59);
    }
}

#[tokio::test]
async fn test_fail_fast_persists_nothing_and_reports_every_row() {
    let store = Arc::new(InMemoryRecordStore::new());
    let api = InterchangeApi::with_defaults(store.clone());
    let options = ImportOptions {
        skip_errors: false,
        ..import_options()
    };

    let result = api
        .import_data(
            member_rows(20, &[5]),
            RecordType::Member,
            &options,
            None,
            &CancellationToken::new(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.summary.successful, 0);
    assert_eq!(result.summary.failed, 20);
    assert_summary_invariant(&result);
    assert_eq!(store.count(RecordType::Member).await.unwrap(), 0);
}

#[tokio::test]
async fn test_validate_only_never_reaches_the_store() {
    let inner = Arc::new(InMemoryRecordStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()));
    store.fail_writes_named("成员1");
    let api = InterchangeApi::with_defaults(store);

    for skip_errors in [true, false] {
        let options = ImportOptions {
            validate_only: true,
            skip_errors,
            ..import_options()
        };
        let result = api
            .import_data(
                member_rows(5, &[]),
                RecordType::Member,
                &options,
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.summary.successful, 5);
        assert!(result.data.iter().all(|r| r.id.is_none()));
    }
    assert_eq!(inner.count(RecordType::Member).await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_existing_counts_updates_not_creates() {
    let store = Arc::new(InMemoryRecordStore::new());
    let api = InterchangeApi::with_defaults(store.clone());
    let options = ImportOptions {
        duplicate_mode: DuplicateMode::UpdateExisting,
        ..import_options()
    };

    let first = api
        .import_data(member_rows(3, &[]), RecordType::Member, &options, None, &CancellationToken::new())
        .await;
    let second = api
        .import_data(member_rows(3, &[]), RecordType::Member, &options, None, &CancellationToken::new())
        .await;

    assert_eq!(first.summary.created, 3);
    assert_eq!(second.summary.created, 0);
    assert_eq!(second.summary.updated, 3);
    assert_eq!(store.count(RecordType::Member).await.unwrap(), 3);
}

#[tokio::test]
async fn test_create_only_rejects_existing_email() {
    let store = Arc::new(InMemoryRecordStore::new());
    let api = InterchangeApi::with_defaults(store.clone());

    api.import_data(member_rows(2, &[]), RecordType::Member, &import_options(), None, &CancellationToken::new())
        .await;
    let again = api
        .import_data(member_rows(2, &[]), RecordType::Member, &import_options(), None, &CancellationToken::new())
        .await;

    assert_eq!(again.summary.failed, 2);
    assert_eq!(store.count(RecordType::Member).await.unwrap(), 2);
}

#[tokio::test]
async fn test_store_outage_is_an_operational_failure() {
    let store = Arc::new(FaultyStore::new(Arc::new(InMemoryRecordStore::new())));
    store.go_offline();
    let api = InterchangeApi::with_defaults(store);

    let result = api
        .validate_data(member_rows(3, &[]), RecordType::Member, &import_options(), None, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.is_some());
    assert_eq!(result.summary.total, 3);
}

#[tokio::test]
async fn test_cancelled_import_accounts_for_every_row() {
    let api = InterchangeApi::with_defaults(Arc::new(InMemoryRecordStore::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = api
        .import_data(member_rows(30, &[]), RecordType::Member, &import_options(), None, &cancel)
        .await;

    assert!(!result.success);
    assert_summary_invariant(&result);
    assert_eq!(result.summary.successful, 0);
}

#[tokio::test]
async fn test_progress_reaches_one_hundred_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let api = InterchangeApi::with_defaults(Arc::new(InMemoryRecordStore::new()));
    let options = ImportOptions {
        batch_size: Some(7),
        ..import_options()
    };

    api.import_data(
        member_rows(50, &[]),
        RecordType::Member,
        &options,
        Some(Arc::new(move |p: u8, _m: &str| sink.lock().unwrap().push(p))),
        &CancellationToken::new(),
    )
    .await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_upload_rejects_oversized_and_empty_files() {
    let config = InterchangeConfig {
        max_file_bytes: 16,
        ..InterchangeConfig::default()
    };
    let api = InterchangeApi::new(Arc::new(InMemoryRecordStore::new()), Arc::new(config));

    let big = "姓名,邮箱\nKim,kim@example.com\n".as_bytes();
    let err = api
        .upload_file(big, "members.csv", RecordType::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Ingest(_)));

    let err = api
        .upload_file(b"", "members.csv", RecordType::Member)
        .await
        .unwrap_err();
    assert!(err.is_file_error());
}

#[tokio::test]
async fn test_upload_then_import_csv_with_chinese_headers() {
    let store = Arc::new(InMemoryRecordStore::new());
    let api = InterchangeApi::with_defaults(store.clone());
    let csv = "姓名,邮箱,性别,出生日期\n\"Kim, Jr.\",kim@example.com,男,1990-05-01\n,,,\nLee,lee@example.com,女,1985/12/24\n";

    let upload = api
        .upload_file(csv.as_bytes(), "members.csv", RecordType::Member)
        .await
        .unwrap();
    assert_eq!(upload.rows.len(), 2);
    assert_eq!(upload.rows[1].row_number, 3);

    let result = api
        .import_data(upload.rows, RecordType::Member, &import_options(), None, &CancellationToken::new())
        .await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(store.count(RecordType::Member).await.unwrap(), 2);
}
