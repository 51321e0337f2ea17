//! 用户名规则缓存
//!
//! 规则 ID -> 编译后规则 的内存映射，是"某个用户名当前是否受限"的唯一判定来源。
//!
//! ## 一致性
//!
//! 精确匹配规则额外登记在字面量索引（表达式 -> 规则 ID 集合）中，索引与 ID 映射
//! 放在同一个 `CacheState` 里，由一把 `parking_lot::RwLock` 保护：
//! 任何写入都在一次写锁内同时更新两者，读者不会看到只更新了一半的状态。
//! 锁守卫不跨越 `.await`，写入路径中没有挂起点。

use std::collections::{BTreeSet, HashMap};

use guard_shared::observability::metrics;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{RestrictionError, Result};
use crate::models::{RuleKind, UsernameRule};

/// 编译正则表达式
pub fn compile_pattern(expression: &str) -> Result<Regex> {
    Regex::new(expression).map_err(|e| RestrictionError::InvalidPattern {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// 编译后的缓存规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: i64,
    pub kind: RuleKind,
    /// 仅 Pattern 规则持有
    matcher: Option<Regex>,
    pub expression: String,
    pub message: String,
    pub extend_to_ban: bool,
}

impl CompiledRule {
    pub fn new(
        id: i64,
        kind: RuleKind,
        expression: impl Into<String>,
        message: impl Into<String>,
        extend_to_ban: bool,
    ) -> Result<Self> {
        let expression = expression.into();
        let matcher = match kind {
            RuleKind::Pattern => Some(compile_pattern(&expression)?),
            RuleKind::Literal => None,
        };

        Ok(Self {
            id,
            kind,
            matcher,
            expression,
            message: message.into(),
            extend_to_ban,
        })
    }

    /// 从存储记录编译
    pub fn from_rule(rule: &UsernameRule) -> Result<Self> {
        Self::new(
            rule.id,
            rule.kind,
            rule.expression.clone(),
            rule.message.clone(),
            rule.extend_to_ban,
        )
    }

    /// 用户名是否命中本规则
    pub fn matches(&self, username: &str) -> bool {
        match &self.matcher {
            Some(regex) => regex.is_match(username),
            None => self.expression == username,
        }
    }

    pub fn entry(&self) -> CachedRuleEntry {
        CachedRuleEntry {
            id: self.id,
            kind: self.kind,
            expression: self.expression.clone(),
            message: self.message.clone(),
            extend_to_ban: self.extend_to_ban,
        }
    }
}

/// 缓存条目快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRuleEntry {
    pub id: i64,
    pub kind: RuleKind,
    pub expression: String,
    pub message: String,
    pub extend_to_ban: bool,
}

/// 匹配命中的规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub rule_id: i64,
    pub message: String,
    pub extend_to_ban: bool,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleCacheStats {
    pub total: usize,
    pub patterns: usize,
    pub literals: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    rules: HashMap<i64, CompiledRule>,
    /// 精确用户名 -> 规则 ID；允许多条规则使用同一字面量
    literals: HashMap<String, BTreeSet<i64>>,
}

impl CacheState {
    fn insert(&mut self, rule: CompiledRule) -> bool {
        if self.rules.contains_key(&rule.id) {
            return false;
        }
        if rule.kind == RuleKind::Literal {
            self.literals
                .entry(rule.expression.clone())
                .or_default()
                .insert(rule.id);
        }
        self.rules.insert(rule.id, rule);
        true
    }

    fn evict(&mut self, id: i64) -> Option<CompiledRule> {
        let rule = self.rules.remove(&id)?;
        if rule.kind == RuleKind::Literal {
            if let Some(ids) = self.literals.get_mut(&rule.expression) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.literals.remove(&rule.expression);
                }
            }
        }
        Some(rule)
    }

    /// 首个命中的规则
    ///
    /// 先查字面量索引，再按 HashMap 迭代顺序扫描正则规则。多条规则同时命中时
    /// 不定义优先级，返回先找到的那一条。
    fn find_first(&self, username: &str) -> Option<&CompiledRule> {
        let literal = self
            .literals
            .get(username)
            .and_then(|ids| ids.iter().next())
            .and_then(|id| self.rules.get(id));
        if literal.is_some() {
            return literal;
        }

        self.rules
            .values()
            .filter(|rule| rule.kind == RuleKind::Pattern)
            .find(|rule| rule.matches(username))
    }
}

/// 用户名规则缓存
#[derive(Debug, Default)]
pub struct RuleCache {
    state: RwLock<CacheState>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入规则
    ///
    /// ID 已存在时不覆盖：重复插入说明调用方状态有误，记录告警后返回 false。
    pub fn put(&self, rule: CompiledRule) -> bool {
        let id = rule.id;
        let (inserted, len) = {
            let mut state = self.state.write();
            let inserted = state.insert(rule);
            (inserted, state.rules.len())
        };

        if inserted {
            debug!(rule_id = id, "规则已缓存");
            metrics::set_cached_rules(len);
        } else {
            warn!(rule_id = id, "规则已在缓存中，忽略重复插入");
        }
        inserted
    }

    /// 按 ID 移除规则，同时从字面量索引中移除
    pub fn remove(&self, id: i64) -> Result<CompiledRule> {
        let (evicted, len) = {
            let mut state = self.state.write();
            let evicted = state.evict(id);
            (evicted, state.rules.len())
        };

        let rule = evicted.ok_or(RestrictionError::RuleNotFound(id))?;
        debug!(rule_id = id, "规则已移出缓存");
        metrics::set_cached_rules(len);
        Ok(rule)
    }

    /// 清空所有规则
    pub fn clear(&self) {
        let count = {
            let mut state = self.state.write();
            let count = state.rules.len();
            *state = CacheState::default();
            count
        };
        debug!(count, "缓存已清空");
        metrics::set_cached_rules(0);
    }

    /// 以一组规则整体替换缓存内容
    ///
    /// 新状态在锁外构建，再一次性交换，读者只会看到旧集合或新集合。
    /// 返回实际载入的条数（重复 ID 只保留第一条）。
    pub fn replace_all(&self, rules: impl IntoIterator<Item = CompiledRule>) -> usize {
        let mut next = CacheState::default();
        for rule in rules {
            let id = rule.id;
            if !next.insert(rule) {
                warn!(rule_id = id, "重建缓存时遇到重复规则 ID，已跳过");
            }
        }

        let count = next.rules.len();
        *self.state.write() = next;
        metrics::set_cached_rules(count);
        count
    }

    /// 时间点一致的全部规则快照
    pub fn snapshot(&self) -> Vec<CachedRuleEntry> {
        self.state
            .read()
            .rules
            .values()
            .map(CompiledRule::entry)
            .collect()
    }

    /// 查找首个命中用户名的规则
    pub fn find_match(&self, username: &str) -> Option<RuleHit> {
        let state = self.state.read();
        state.find_first(username).map(|rule| RuleHit {
            rule_id: rule.id,
            message: rule.message.clone(),
            extend_to_ban: rule.extend_to_ban,
        })
    }

    pub fn get(&self, id: i64) -> Option<CachedRuleEntry> {
        self.state.read().rules.get(&id).map(CompiledRule::entry)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.state.read().rules.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().rules.is_empty()
    }

    pub fn stats(&self) -> RuleCacheStats {
        let state = self.state.read();
        let patterns = state
            .rules
            .values()
            .filter(|rule| rule.kind == RuleKind::Pattern)
            .count();

        RuleCacheStats {
            total: state.rules.len(),
            patterns,
            literals: state.rules.len() - patterns,
        }
    }

    /// 字面量索引中登记的规则 ID（用于校验索引与映射同步）
    pub fn literal_ids(&self, expression: &str) -> Vec<i64> {
        self.state
            .read()
            .literals
            .get(expression)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}
