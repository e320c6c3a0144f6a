// ==========================================
// 教会行政数据交换系统 - 配置层
// ==========================================
// 职责: 管道运行参数，支持 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod interchange_config;
pub mod interchange_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use interchange_config::InterchangeConfig;
pub use interchange_config_trait::{ConfigResult, InterchangeConfigReader};
