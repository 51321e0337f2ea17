//! 共享库
//!
//! 包含各服务共用的配置加载、错误处理、数据库连接以及可观测性基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
