//! 客户端规则镜像
//!
//! 管理端按接收顺序应用增量记录，重建服务端生效规则集。

use std::collections::BTreeMap;

use super::messages::RuleDelta;

/// 镜像中的规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredRule {
    pub is_pattern: bool,
    pub extend_to_ban: bool,
    pub expression: String,
}

/// 规则镜像
#[derive(Debug, Clone, Default)]
pub struct RuleMirror {
    rules: BTreeMap<i64, MirroredRule>,
    resets: usize,
}

impl RuleMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一条增量记录
    pub fn apply(&mut self, delta: &RuleDelta) {
        if delta.is_reset_marker() {
            self.rules.clear();
            self.resets += 1;
            return;
        }

        if delta.present {
            self.rules.insert(
                delta.id,
                MirroredRule {
                    is_pattern: delta.is_pattern,
                    extend_to_ban: delta.extend_to_ban,
                    expression: delta.expression.clone(),
                },
            );
        } else {
            self.rules.remove(&delta.id);
        }
    }

    pub fn apply_all<'a>(&mut self, deltas: impl IntoIterator<Item = &'a RuleDelta>) {
        for delta in deltas {
            self.apply(delta);
        }
    }

    pub fn get(&self, id: i64) -> Option<&MirroredRule> {
        self.rules.get(&id)
    }

    /// 镜像中的规则 ID（升序）
    pub fn ids(&self) -> Vec<i64> {
        self.rules.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 已收到的重置次数
    pub fn resets(&self) -> usize {
        self.resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(id: i64, expression: &str) -> RuleDelta {
        RuleDelta {
            id,
            present: true,
            is_pattern: false,
            extend_to_ban: false,
            expression: expression.to_string(),
        }
    }

    #[test]
    fn test_add_and_remove() {
        let mut mirror = RuleMirror::new();
        mirror.apply(&add(1, "a"));
        mirror.apply(&add(2, "b"));
        mirror.apply(&RuleDelta::removed(1));

        assert_eq!(mirror.ids(), vec![2]);
        assert_eq!(mirror.get(2).unwrap().expression, "b");
    }

    #[test]
    fn test_tombstone_fields_are_ignored() {
        let mut mirror = RuleMirror::new();
        mirror.apply(&add(5, "keep"));
        mirror.apply(&RuleDelta::removed(6));

        assert_eq!(mirror.ids(), vec![5]);
        assert!(mirror.get(6).is_none());
    }

    #[test]
    fn test_reset_clears_then_applies() {
        let mut mirror = RuleMirror::new();
        mirror.apply(&add(1, "stale"));

        mirror.apply_all(&[RuleDelta::reset_marker(), add(3, "fresh"), add(4, "fresh2")]);

        assert_eq!(mirror.ids(), vec![3, 4]);
        assert_eq!(mirror.resets(), 1);
        assert_eq!(mirror.len(), 2);
    }
}
