//! 可观测性模块集成测试
//!
//! 测试指标记录函数、日志初始化与配置的核心行为。
//! 未安装 recorder 时所有记录函数都应是无操作且不 panic。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use guard_shared::observability::metrics::{
        record_cache_restart, record_enforcement_kick, record_rule_change, record_rule_evaluation,
        record_sync_messages, set_cached_rules,
    };

    #[test]
    fn test_record_rule_evaluation() {
        record_rule_evaluation("allowed", 0.0001);
        record_rule_evaluation("restricted", 0.0002);
        record_rule_evaluation("whitelisted", 0.003);
    }

    #[test]
    fn test_record_rule_change() {
        record_rule_change("created");
        record_rule_change("removed");
    }

    #[test]
    fn test_record_sync_messages() {
        record_sync_messages("delta", 3);
        record_sync_messages("reset", 101);
        record_sync_messages("detail", 1);
        // 没有管理通道时计数为 0
        record_sync_messages("delta", 0);
    }

    #[test]
    fn test_record_enforcement_and_restart() {
        record_enforcement_kick();
        record_cache_restart("ok");
        record_cache_restart("failed");
    }

    #[test]
    fn test_set_cached_rules() {
        set_cached_rules(0);
        set_cached_rules(1_000);
        set_cached_rules(usize::MAX);
    }
}

// ============================================================================
// 日志初始化测试
// ============================================================================

mod init_tests {
    use guard_shared::observability::{self, ObservabilityConfig};

    // 全局 subscriber 只能安装一次，初始化相关断言集中在同一个测试里
    #[test]
    fn test_init_without_metrics() {
        let invalid = ObservabilityConfig {
            log_format: "xml".to_string(),
            ..Default::default()
        };
        let err = observability::init(&invalid).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");

        let config = ObservabilityConfig {
            log_format: "json".to_string(),
            ..Default::default()
        }
        .with_service_name("observability-test");

        let guard = observability::init(&config).unwrap();
        assert!(!guard.metrics_enabled());

        let err = observability::init(&config).unwrap_err();
        assert_eq!(err.code(), "OBSERVABILITY_ERROR");
        assert!(!err.is_retryable());
    }
}

// ============================================================================
// 配置测试
// ============================================================================

mod config_tests {
    use guard_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "unknown-service");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.metrics_enabled);
        assert!(!config.json_logs());
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig {
            service_name: "my-service".to_string(),
            log_level: "debug".to_string(),
            log_format: "JSON".to_string(),
            metrics_enabled: true,
            metrics_port: 9091,
        };

        assert!(config.json_logs());
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(
            config.with_service_name("renamed").service_name,
            "renamed"
        );
    }
}

// ============================================================================
// Guard 测试
// ============================================================================

mod guard_tests {
    use guard_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard() {
        let guard = ObservabilityGuard::empty();
        assert!(!guard.metrics_enabled());
        drop(guard);
    }
}
