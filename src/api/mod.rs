// ==========================================
// 教会行政数据交换系统 - API 层
// ==========================================
// 职责: 供界面或命令行调用的编程接口
// ==========================================

pub mod error;
pub mod interchange_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use interchange_api::InterchangeApi;
