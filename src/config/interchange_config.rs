// ==========================================
// 教会行政数据交换系统 - 交换管道配置
// ==========================================
// 职责: 管道运行参数（文件/行数上限、批大小、并发度、默认语言）
// ==========================================

use serde::{Deserialize, Serialize};

/// 默认文件大小上限: 10 MiB
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// 默认单文件数据行上限
pub const DEFAULT_MAX_ROWS: usize = 10_000;
/// 默认批大小
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// 默认批内并发写入数
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// 默认消息语言
pub const DEFAULT_LOCALE: &str = "zh-CN";

/// 管道配置快照（单次调用内不变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterchangeConfig {
    pub max_file_bytes: u64,
    pub max_rows: usize,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub default_locale: String,
}

impl Default for InterchangeConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

impl InterchangeConfig {
    /// 调用方指定的批大小优先，且至少为 1
    pub fn effective_batch_size(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.batch_size).max(1)
    }

    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// 修正越界参数: 批大小与行数上限至少为 1，并发度不超过批大小
    pub fn validated(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.max_rows = self.max_rows.max(1);
        self.max_concurrency = self.max_concurrency.clamp(1, self.batch_size);
        if self.default_locale.trim().is_empty() {
            self.default_locale = DEFAULT_LOCALE.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_batch_size() {
        let config = InterchangeConfig::default();
        assert_eq!(config.effective_batch_size(None), 100);
        assert_eq!(config.effective_batch_size(Some(0)), 1);
        assert_eq!(config.effective_batch_size(Some(7)), 7);
    }

    #[test]
    fn test_validated_clamps_concurrency_to_batch_size() {
        let config = InterchangeConfig {
            batch_size: 0,
            max_concurrency: 50,
            default_locale: " ".into(),
            ..InterchangeConfig::default()
        }
        .validated();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.default_locale, "zh-CN");
    }
}
