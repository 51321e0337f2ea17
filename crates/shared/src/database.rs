//! 数据库连接管理模块
//!
//! 按配置建立 PostgreSQL 连接池，执行服务内嵌的迁移集并做连通性探测。
//! 迁移集由各服务通过 `sqlx::migrate!` 内嵌后传入，本模块不感知具体表结构。

use std::time::{Duration, Instant};

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 校验配置并创建连接池
    ///
    /// 配置无效时返回 `GuardError::InvalidConfig`，不会发起网络连接。
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("Database connection pool created");
        Ok(Self { pool })
    }

    /// 启动流程：连接、探活，给定迁移集时执行迁移
    pub async fn bootstrap(config: &DatabaseConfig, migrator: Option<&Migrator>) -> Result<Self> {
        let db = Self::connect(config).await?;
        let latency = db.health_check().await?;
        info!(latency_ms = latency.as_millis() as u64, "Database reachable");

        match migrator {
            Some(migrator) => {
                db.migrate(migrator).await?;
            }
            None => warn!("跳过数据库迁移，需确保表结构已就绪"),
        }
        Ok(db)
    }

    /// 执行迁移集，返回其中的脚本数量
    ///
    /// 已应用的脚本会被跳过；脚本校验和与库中记录不一致时返回 `GuardError::Migration`。
    #[instrument(skip_all)]
    pub async fn migrate(&self, migrator: &Migrator) -> Result<usize> {
        let total = migrator.iter().count();
        info!(migrations = total, "Running database migrations...");

        migrator.run(&self.pool).await?;

        info!(migrations = total, "Database migrations up to date");
        Ok(total)
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查，返回往返耗时
    pub async fn health_check(&self) -> Result<Duration> {
        let started = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        let latency = started.elapsed();
        debug!(latency_ms = latency.as_millis() as u64, "Database health check passed");
        Ok(latency)
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}
