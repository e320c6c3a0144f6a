// ==========================================
// 教会行政数据交换系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::interchange_config::{
    DEFAULT_BATCH_SIZE, DEFAULT_LOCALE, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_FILE_BYTES,
    DEFAULT_MAX_ROWS,
};
use crate::config::interchange_config_trait::{ConfigResult, InterchangeConfigReader};
use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            configure_sqlite_connection(&conn_guard)?;
            ensure_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 读取正整数配置；缺失取默认值，格式错误或非正数时告警并取默认值
    fn get_positive<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + PartialOrd + Default + Copy,
    {
        let raw = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置值无效，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// InterchangeConfigReader Trait 实现
// ==========================================
#[async_trait]
impl InterchangeConfigReader for ConfigManager {
    async fn get_max_file_bytes(&self) -> ConfigResult<u64> {
        self.get_positive(config_keys::MAX_FILE_BYTES, DEFAULT_MAX_FILE_BYTES)
    }

    async fn get_max_rows(&self) -> ConfigResult<usize> {
        self.get_positive(config_keys::MAX_ROWS, DEFAULT_MAX_ROWS)
    }

    async fn get_batch_size(&self) -> ConfigResult<usize> {
        self.get_positive(config_keys::BATCH_SIZE, DEFAULT_BATCH_SIZE)
    }

    async fn get_max_concurrency(&self) -> ConfigResult<usize> {
        self.get_positive(config_keys::MAX_CONCURRENCY, DEFAULT_MAX_CONCURRENCY)
    }

    async fn get_default_locale(&self) -> ConfigResult<String> {
        let value = self
            .get_global_config_value(config_keys::DEFAULT_LOCALE)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(value.unwrap_or_else(|| DEFAULT_LOCALE.to_string()))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const MAX_FILE_BYTES: &str = "interchange/max_file_bytes";
    pub const MAX_ROWS: &str = "interchange/max_rows";
    pub const BATCH_SIZE: &str = "interchange/batch_size";
    pub const MAX_CONCURRENCY: &str = "interchange/max_concurrency";
    pub const DEFAULT_LOCALE: &str = "interchange/default_locale";

    pub const ALL: [&str; 5] = [
        MAX_FILE_BYTES,
        MAX_ROWS,
        BATCH_SIZE,
        MAX_CONCURRENCY,
        DEFAULT_LOCALE,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::interchange_config::InterchangeConfig;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let config = manager().load_snapshot().await.unwrap();
        assert_eq!(config, InterchangeConfig::default());
    }

    #[tokio::test]
    async fn test_override_and_invalid_fallback() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::BATCH_SIZE, "25").unwrap();
        mgr.set_global_config_value(config_keys::MAX_ROWS, "-3").unwrap();
        mgr.set_global_config_value(config_keys::DEFAULT_LOCALE, "en").unwrap();

        let config = mgr.load_snapshot().await.unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_rows, DEFAULT_MAX_ROWS);
        assert_eq!(config.default_locale, "en");

        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("interchange/batch_size"));
    }
}
