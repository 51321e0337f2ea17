//! 用户名匹配引擎
//!
//! 评估顺序：白名单短路 → 字面量索引 → 正则规则，首个命中即返回。
//! 多条规则同时命中时没有优先级，正则规则之间的遍历顺序不确定。

use std::sync::Arc;
use std::time::Instant;

use guard_shared::observability::metrics;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cache::RuleCache;
use crate::store::RuleStore;

/// 评估结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub matched: bool,
    /// 未命中时为空串
    pub message: String,
    pub extend_to_ban: bool,
}

impl MatchOutcome {
    pub fn allowed() -> Self {
        Self {
            matched: false,
            message: String::new(),
            extend_to_ban: false,
        }
    }

    pub fn restricted(message: impl Into<String>, extend_to_ban: bool) -> Self {
        Self {
            matched: true,
            message: message.into(),
            extend_to_ban,
        }
    }
}

/// 用户名匹配引擎
///
/// 只读访问缓存，可与缓存写入并发调用。
#[derive(Clone)]
pub struct MatchEngine {
    cache: Arc<RuleCache>,
    store: Arc<dyn RuleStore>,
}

impl MatchEngine {
    pub fn new(cache: Arc<RuleCache>, store: Arc<dyn RuleStore>) -> Self {
        Self { cache, store }
    }

    /// 评估用户名
    ///
    /// 白名单查询失败时按未加白处理，继续规则匹配
    #[instrument(skip(self))]
    pub async fn evaluate(&self, username: &str) -> MatchOutcome {
        let start = Instant::now();

        match self.store.is_whitelisted(username).await {
            Ok(true) => {
                debug!("用户名在白名单中");
                metrics::record_rule_evaluation("whitelisted", start.elapsed().as_secs_f64());
                return MatchOutcome::allowed();
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "白名单查询失败，继续规则匹配"),
        }

        let outcome = self.evaluate_rules(username);
        let label = if outcome.matched { "restricted" } else { "allowed" };
        metrics::record_rule_evaluation(label, start.elapsed().as_secs_f64());
        outcome
    }

    /// 仅按缓存规则评估，不查询白名单
    pub fn evaluate_rules(&self, username: &str) -> MatchOutcome {
        match self.cache.find_match(username) {
            Some(hit) => {
                debug!(rule_id = hit.rule_id, "用户名命中规则");
                MatchOutcome::restricted(hit.message, hit.extend_to_ban)
            }
            None => MatchOutcome::allowed(),
        }
    }
}
