//! # Studio Gateway Benchmarks
//!
//! Hot paths that run on every request or every listing:
//!
//! | Path | Runs |
//! |------|------|
//! | Per-IP rate limit check | every request |
//! | Prompt validation + style suffix | every generation |
//! | Error reconciliation | every provider failure |
//! | Gallery pagination | every history/explore page |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::net::{IpAddr, Ipv4Addr};

use studio_gateway::adapters::reconcile_generation;
use studio_gateway::domain::config::RateLimitConfig;
use studio_gateway::domain::{paginate, prompt, styles};
use studio_gateway::middleware::RateLimitState;
use studio_gateway::ProviderError;

fn bench_rate_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate-limit");
    let state = RateLimitState::new(RateLimitConfig {
        requests_per_second: 1_000_000,
        burst_size: 1_000_000,
        whitelist: Vec::new(),
        ..Default::default()
    });

    group.bench_function("single_client", |b| {
        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
        b.iter(|| black_box(state.check(ip).is_ok()))
    });

    for clients in [16u8, 128, 255] {
        group.throughput(Throughput::Elements(u64::from(clients)));
        group.bench_with_input(BenchmarkId::new("many_clients", clients), &clients, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    black_box(state.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, i))).is_ok());
                }
            })
        });
    }
    group.finish();
}

fn bench_prompt(c: &mut Criterion) {
    let mut group = c.benchmark_group("prompt");
    let style = styles::find("5");
    let text = "a lighthouse on a cliff at dusk, waves crashing below";

    group.bench_function("validate_and_style", |b| {
        b.iter(|| {
            prompt::validate_prompt(black_box(text), 5000).unwrap();
            black_box(prompt::apply_style(text, style))
        })
    });

    let long = "detailed ".repeat(1000);
    group.bench_function("truncate_enhanced", |b| {
        b.iter(|| black_box(prompt::truncate_enhanced(&long, 5000)))
    });
    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let html = format!("<html>{}</html>\nsecond line", "x".repeat(4096));
    c.bench_function("reconcile_generation_html_body", |b| {
        b.iter(|| {
            black_box(reconcile_generation(ProviderError::Http {
                status: 500,
                body: html.clone(),
            }))
        })
    });
}

fn bench_paginate(c: &mut Criterion) {
    let mut group = c.benchmark_group("paginate");
    for len in [8usize, 100, 1000] {
        let items: Vec<u64> = (0..len as u64).collect();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("middle_page", len), &items, |b, items| {
            b.iter(|| black_box(paginate(items.clone(), len / 16 + 1, 8)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_rate_limit,
    bench_prompt,
    bench_reconcile,
    bench_paginate
);
criterion_main!(benches);
