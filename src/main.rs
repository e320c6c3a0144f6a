// ==========================================
// 教会行政数据交换系统 - 命令行入口
// ==========================================
// 子命令: import / export / backup / restore / preview
// 存储: SQLite（默认位于用户数据目录，可用 --db 或环境变量覆盖）
// ==========================================

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use congregation_interchange::config::ConfigManager;
use congregation_interchange::domain::ProgressCallback;
use congregation_interchange::{
    i18n, logging, BackupMode, BackupOptions, CancellationToken, DuplicateMode, ExportFormat,
    ExportOptions, ImportOptions, InterchangeApi, RecordFilter, RecordType, RestoreOptions,
    RestoreScope, SqliteRecordStore,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "congregation-interchange", version, about = "教会行政数据批量导入/导出/备份/恢复")]
struct Cli {
    /// 数据库文件路径
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// 消息语言（zh-CN / en）
    #[arg(long, global = true)]
    locale: Option<String>,

    /// 以 JSON 行输出日志
    #[arg(long, global = true)]
    log_json: bool,

    /// 超时秒数（超时后在下一个批次/工作表边界停止）
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// 导入单个 CSV/Excel 文件
    Import {
        #[arg(long = "type", value_name = "TYPE")]
        record_type: RecordType,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// 命中已有记录时更新（默认仅新增）
        #[arg(long)]
        update: bool,
        /// 首个行错误即停止
        #[arg(long)]
        fail_fast: bool,
        /// 仅校验，不落库
        #[arg(long)]
        validate_only: bool,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// 导出记录
    Export {
        /// 记录类型（可重复；省略时全部）
        #[arg(long = "type", value_name = "TYPE")]
        record_types: Vec<RecordType>,
        /// csv 或 xlsx
        #[arg(long, default_value = "xlsx")]
        format: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,
        /// 输出目录
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// 创建备份
    Backup {
        /// 增量起点（RFC 3339）；省略时完整备份
        #[arg(long, value_name = "TIMESTAMP")]
        since: Option<DateTime<Utc>>,
        #[arg(long = "type", value_name = "TYPE")]
        record_types: Vec<RecordType>,
        /// 某类型读取失败时跳过该类型继续
        #[arg(long)]
        continue_on_error: bool,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// 从备份文件恢复
    Restore {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// 只恢复指定类型（可重复）
        #[arg(long = "only", value_name = "TYPE")]
        only: Vec<RecordType>,
        /// 仅新增（默认命中已有记录时更新）
        #[arg(long)]
        create_only: bool,
        #[arg(long)]
        fail_fast: bool,
    },
    /// 恢复预览（不落库）
    Preview {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long = "only", value_name = "TYPE")]
        only: Vec<RecordType>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }
    if let Some(locale) = cli.locale.as_deref() {
        i18n::set_locale(locale);
    }

    tracing::info!("{} v{}", congregation_interchange::APP_NAME, congregation_interchange::VERSION);

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建数据目录: {}", parent.display()))?;
        }
    }
    let db_path_str = db_path.to_string_lossy().to_string();
    tracing::info!("使用数据库: {}", db_path_str);

    let store = SqliteRecordStore::new(&db_path_str).context("无法打开数据库")?;
    let config = ConfigManager::from_connection(store.connection())
        .map_err(|e| anyhow::anyhow!("无法加载配置: {}", e))?;
    let mut api = InterchangeApi::new(Arc::new(store), Arc::new(config));
    if let Some(locale) = cli.locale.clone() {
        api = api.with_locale(locale);
    }

    let cancel = match cli.timeout {
        Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    };
    let progress = Some(console_progress());

    match cli.cmd {
        Cmd::Import {
            record_type,
            file,
            update,
            fail_fast,
            validate_only,
            batch_size,
        } => {
            let bytes = read_file(&file)?;
            let upload = api
                .upload_file(&bytes, &file_name(&file), record_type)
                .await?;
            if !upload.errors.is_empty() {
                tracing::warn!(count = upload.errors.len(), "部分单元格类型转换失败");
            }
            let options = ImportOptions {
                batch_size,
                duplicate_mode: duplicate_mode(update),
                skip_errors: !fail_fast,
                validate_only,
                ..ImportOptions::default()
            };
            let result = api
                .import_data(upload.rows, record_type, &options, progress, &cancel)
                .await;
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Cmd::Export {
            record_types,
            format,
            from,
            to,
            out,
        } => {
            let options = ExportOptions {
                record_types,
                format: parse_format(&format)?,
                filter: RecordFilter {
                    date_from: from,
                    date_to: to,
                    modified_after: None,
                },
                filename: None,
            };
            let result = api.export_data(&options, progress, &cancel).await;
            if let (Some(name), Some(bytes)) = (result.filename.as_deref(), result.payload.as_deref()) {
                write_output(&out, name, bytes)?;
            }
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Cmd::Backup {
            since,
            record_types,
            continue_on_error,
            out,
        } => {
            let options = BackupOptions {
                mode: match since {
                    Some(since) => BackupMode::Incremental { since },
                    None => BackupMode::Full,
                },
                record_types,
                continue_on_error,
                filename: None,
            };
            let result = api.create_backup(&options, progress, &cancel).await;
            if let (Some(name), Some(bytes)) = (result.filename.as_deref(), result.payload.as_deref()) {
                write_output(&out, name, bytes)?;
            }
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Cmd::Restore {
            file,
            only,
            create_only,
            fail_fast,
        } => {
            let bytes = read_file(&file)?;
            let options = RestoreOptions {
                scope: restore_scope(only),
                duplicate_mode: duplicate_mode(!create_only),
                skip_errors: !fail_fast,
                ..RestoreOptions::default()
            };
            let result = api
                .restore_backup(&bytes, &file_name(&file), &options, progress, &cancel)
                .await?;
            print_json(&result)?;
            if !result.result.success {
                std::process::exit(1);
            }
        }
        Cmd::Preview { file, only } => {
            let bytes = read_file(&file)?;
            let options = RestoreOptions {
                scope: restore_scope(only),
                ..RestoreOptions::default()
            };
            let preview = api
                .preview_restore(&bytes, &file_name(&file), &options, progress, &cancel)
                .await?;
            print_json(&preview)?;
        }
    }

    Ok(())
}

/// 默认数据库路径: 环境变量 > 用户数据目录 > 当前目录
fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("CONGREGATION_INTERCHANGE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    match dirs::data_dir() {
        Some(data_dir) => data_dir
            .join("congregation-interchange")
            .join("congregation_interchange.db"),
        None => PathBuf::from("./congregation_interchange.db"),
    }
}

fn console_progress() -> ProgressCallback {
    Arc::new(|percent: u8, message: &str| {
        eprintln!("[{:>3}%] {}", percent, message);
    })
}

fn duplicate_mode(update: bool) -> DuplicateMode {
    if update {
        DuplicateMode::UpdateExisting
    } else {
        DuplicateMode::CreateOnly
    }
}

fn restore_scope(only: Vec<RecordType>) -> RestoreScope {
    if only.is_empty() {
        RestoreScope::Full
    } else {
        RestoreScope::Selective(only)
    }
}

fn parse_format(value: &str) -> Result<ExportFormat> {
    match value.trim().to_lowercase().as_str() {
        "csv" => Ok(ExportFormat::Csv),
        "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
        other => bail!("不支持的导出格式: {}（可选 csv / xlsx）", other),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("无法读取文件: {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn write_output(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("无法创建目录: {}", dir.display()))?;
    let target = dir.join(name);
    std::fs::write(&target, bytes).with_context(|| format!("无法写出文件: {}", target.display()))?;
    tracing::info!("已写出: {}", target.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
