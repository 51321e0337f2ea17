//! 用户名限制服务入口
//!
//! 加载配置、初始化可观测性、构建规则存储与进程内宿主，
//! 载入规则后监听权限变更，直到收到 Ctrl-C。

use std::sync::Arc;

use anyhow::Result;
use guard_shared::{
    config::{AppConfig, StoreBackend},
    database::Database,
    error::GuardError,
    observability,
};
use tokio::signal;
use tracing::{info, warn};

use name_restriction::{
    NameRestrictionService,
    audit::TracingAuditSink,
    host::{FixedRound, LocalSessionRegistry},
    store::{MIGRATOR, MemoryRuleStore, PgRuleStore, RuleStore},
    sync::LocalTransport,
};

const SERVICE_NAME: &str = "name-restriction-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置；配置文件缺失或无法解析时使用默认值，校验失败则直接退出
    let config = match AppConfig::load(SERVICE_NAME) {
        Ok(config) => config,
        Err(e @ GuardError::InvalidConfig { .. }) => return Err(e.into()),
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {}", e);
            AppConfig {
                service_name: SERVICE_NAME.to_string(),
                ..AppConfig::default()
            }
        }
    };

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config)?;

    info!("Starting {}...", SERVICE_NAME);
    info!(
        environment = %config.environment,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    // 3. 构建规则存储
    let mut database = None;
    let store: Arc<dyn RuleStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("使用内存规则存储，进程退出后规则将丢失");
            Arc::new(MemoryRuleStore::new())
        }
        StoreBackend::Postgres => {
            let migrator = config.store.run_migrations.then_some(&MIGRATOR);
            let db = Database::bootstrap(&config.database, migrator).await?;

            let store = PgRuleStore::new(db.pool().clone());
            database = Some(db);
            Arc::new(store)
        }
    };

    // 4. 进程内宿主
    let sessions = Arc::new(LocalSessionRegistry::new());
    let transport = Arc::new(LocalTransport::new());

    let service = NameRestrictionService::new(
        store,
        sessions.clone(),
        transport,
        Arc::new(FixedRound(None)),
        Arc::new(TracingAuditSink),
    );

    // 5. 载入规则，失败时以空缓存启动
    match service.restart().await {
        Ok(count) => info!(rules = count, "规则已加载"),
        Err(e) => warn!(error = %e, "启动时加载规则失败，以空缓存运行"),
    }

    // 6. 监听权限变更
    let subscription = service.watch_permissions(sessions.subscribe());

    info!("{} ready", SERVICE_NAME);
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    subscription.unsubscribe();
    if let Some(db) = database {
        db.close().await;
    }

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
