//! 用户名匹配性能基准测试
//!
//! 测试覆盖：
//! - 字面量命中（索引直查）
//! - 正则命中 / 全部未命中（遍历正则规则）
//! - 含白名单查询的完整评估
//! - 不同规则数量下的性能曲线

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use name_restriction::MatchEngine;
use name_restriction::cache::{CompiledRule, RuleCache};
use name_restriction::models::RuleKind;
use name_restriction::store::MemoryRuleStore;

/// 构建包含指定数量规则的缓存，一半正则一半字面量
fn populated_cache(count: usize) -> Arc<RuleCache> {
    let cache = Arc::new(RuleCache::new());
    let rules = (0..count).map(|i| {
        let id = i as i64 + 1;
        if i % 2 == 0 {
            CompiledRule::new(
                id,
                RuleKind::Pattern,
                format!("^reserved{}[a-z]*$", i),
                "reserved",
                false,
            )
        } else {
            CompiledRule::new(id, RuleKind::Literal, format!("banned{}", i), "banned", true)
        }
    });
    cache.replace_all(rules.filter_map(Result::ok));
    cache
}

fn engine(count: usize) -> MatchEngine {
    MatchEngine::new(populated_cache(count), Arc::new(MemoryRuleStore::new()))
}

fn bench_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_cache_lookup");

    for count in [10usize, 100, 1000] {
        let engine = engine(count);
        let literal = format!("banned{}", count - 1);
        let pattern = format!("reserved{}abc", count - 2);
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("literal_hit", count), &literal, |b, name| {
            b.iter(|| engine.evaluate_rules(black_box(name)))
        });
        group.bench_with_input(BenchmarkId::new("pattern_hit", count), &pattern, |b, name| {
            b.iter(|| engine.evaluate_rules(black_box(name)))
        });
        group.bench_with_input(BenchmarkId::new("miss", count), &"player1", |b, name| {
            b.iter(|| engine.evaluate_rules(black_box(name)))
        });
    }

    group.finish();
}

fn bench_full_evaluation(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build tokio runtime");
    let engine = engine(100);

    c.bench_function("evaluate_with_whitelist_check", |b| {
        b.iter(|| runtime.block_on(engine.evaluate(black_box("player1"))))
    });
}

criterion_group!(benches, bench_cache_lookup, bench_full_evaluation);
criterion_main!(benches);
