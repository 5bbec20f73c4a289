// Credential store benchmarks.
//
// Covers token issue (fresh and refresh), validation on the happy path,
// and an expiry sweep over a store of a given size.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::net::IpAddr;

use chrono::{Duration, Utc};
use coinpass_protocol::identity::Username;
use coinpass_protocol::session::CredentialStore;

fn addr() -> IpAddr {
    "10.0.0.1".parse().unwrap()
}

fn users(n: usize) -> Vec<Username> {
    (0..n)
        .map(|i| Username::parse(&format!("user{i}")).unwrap())
        .collect()
}

fn bench_issue_refresh(c: &mut Criterion) {
    let store = CredentialStore::default();
    let alice = Username::parse("alice").unwrap();

    c.bench_function("session/issue_refresh", |b| {
        b.iter(|| store.issue(addr(), alice.clone()));
    });
}

fn bench_validate(c: &mut Criterion) {
    let store = CredentialStore::default();
    let alice = Username::parse("alice").unwrap();
    let token = store.issue(addr(), alice.clone());

    c.bench_function("session/validate_ok", |b| {
        b.iter(|| store.validate(token.as_str(), &alice, addr()));
    });
}

fn bench_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("session/reclaim_expired");

    for size in [100usize, 1_000, 10_000] {
        let names = users(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &names, |b, names| {
            b.iter_batched(
                || {
                    let store = CredentialStore::default();
                    let past = Utc::now() - Duration::hours(12);
                    for name in names {
                        store.issue_at(addr(), name.clone(), past);
                    }
                    store
                },
                |store| store.reclaim_expired(),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_issue_refresh, bench_validate, bench_reclaim);
criterion_main!(benches);
