// ==========================================
// 教会行政数据交换系统 - 交换配置读取 Trait
// ==========================================
// 职责: 定义管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::interchange_config::InterchangeConfig;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// InterchangeConfigReader Trait
// ==========================================
// 用途: 管道读取运行参数
// 实现者: ConfigManager（config_kv 表）/ InterchangeConfig（固定值）
#[async_trait]
pub trait InterchangeConfigReader: Send + Sync {
    /// 获取上传文件大小上限（字节）
    ///
    /// # 默认值
    /// - 10 MiB
    async fn get_max_file_bytes(&self) -> ConfigResult<u64>;

    /// 获取单文件数据行上限
    ///
    /// # 默认值
    /// - 10000
    async fn get_max_rows(&self) -> ConfigResult<usize>;

    /// 获取批大小
    ///
    /// # 默认值
    /// - 100
    async fn get_batch_size(&self) -> ConfigResult<usize>;

    /// 获取批内并发写入上限
    ///
    /// # 默认值
    /// - 10
    async fn get_max_concurrency(&self) -> ConfigResult<usize>;

    /// 获取默认消息语言
    ///
    /// # 默认值
    /// - zh-CN
    async fn get_default_locale(&self) -> ConfigResult<String>;

    /// 一次读取全部参数
    async fn load_snapshot(&self) -> ConfigResult<InterchangeConfig> {
        Ok(InterchangeConfig {
            max_file_bytes: self.get_max_file_bytes().await?,
            max_rows: self.get_max_rows().await?,
            batch_size: self.get_batch_size().await?,
            max_concurrency: self.get_max_concurrency().await?,
            default_locale: self.get_default_locale().await?,
        })
    }
}

// 固定配置（测试与无数据库场景）
#[async_trait]
impl InterchangeConfigReader for InterchangeConfig {
    async fn get_max_file_bytes(&self) -> ConfigResult<u64> {
        Ok(self.max_file_bytes)
    }

    async fn get_max_rows(&self) -> ConfigResult<usize> {
        Ok(self.max_rows)
    }

    async fn get_batch_size(&self) -> ConfigResult<usize> {
        Ok(self.batch_size)
    }

    async fn get_max_concurrency(&self) -> ConfigResult<usize> {
        Ok(self.max_concurrency)
    }

    async fn get_default_locale(&self) -> ConfigResult<String> {
        Ok(self.default_locale.clone())
    }
}
