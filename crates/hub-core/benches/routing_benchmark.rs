//! Routing and Aggregation Benchmarks
//!
//! Measures the hot, synchronous parts of request handling:
//! - Intent classification
//! - Agent selection over registries of increasing size
//! - Result aggregation per strategy

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hub_core::agents::{AgentConfig, AgentType, SubAgent, SubAgentResult};
use hub_core::aggregator::{AggregationStrategy, ResultAggregator};
use hub_core::router::{classify_intent, RequestRouter};
use hub_core::types::Request;

fn agents(count: usize) -> Vec<SubAgent> {
    let types = [AgentType::Validator, AgentType::Knowledge, AgentType::Task, AgentType::Dynamic];
    (0..count)
        .map(|i| {
            let config = AgentConfig::virtual_agent(format!("agent-{}", i), format!("Agent {}", i), types[i % types.len()])
                .with_capabilities(["code-analysis", "task-execution"]);
            SubAgent::from_config(&config)
        })
        .collect()
}

/// Benchmark intent classification
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_intent");

    group.bench_function("short_prompt", |b| {
        b.iter(|| classify_intent(black_box("review this code for security issues")))
    });

    let long_prompt = "please refactor the build scripts and add test coverage ".repeat(50);
    group.bench_function("long_prompt", |b| b.iter(|| classify_intent(black_box(&long_prompt))));

    group.finish();
}

/// Benchmark routing against registries of different sizes
fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    let router = RequestRouter::new();
    let request = Request::new("bench", "check the dependencies for known vulnerabilities");

    for size in [4, 32, 256] {
        let snapshot = agents(size);
        group.bench_with_input(BenchmarkId::new("agents", size), &snapshot, |b, snapshot| {
            b.iter(|| router.route(black_box(&request), black_box(snapshot)))
        });
    }

    group.finish();
}

/// Benchmark aggregation strategies
fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let aggregator = ResultAggregator::with_defaults();
    let results: Vec<SubAgentResult> = agents(8)
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            SubAgentResult::new(agent, format!("finding {}", i), 0.5 + i as f64 / 20.0)
                .with_tokens(100)
                .with_execution_time(250 * i as u64)
        })
        .collect();

    for strategy in [
        AggregationStrategy::Concatenate,
        AggregationStrategy::BestScore,
        AggregationStrategy::Consensus,
        AggregationStrategy::Weighted,
    ] {
        group.bench_function(strategy.to_string(), |b| {
            b.iter(|| aggregator.aggregate("bench", black_box(results.clone()), strategy))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_route, bench_aggregate);
criterion_main!(benches);
