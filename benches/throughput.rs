//! Throughput Benchmark for SQLRelay
//!
//! Measures row rendering, statement execution against the store, and a full
//! request/reply round trip over TCP.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rusqlite::types::ValueRef;
use sqlrelay::commands::{render_value, CommandHandler};
use sqlrelay::{Config, Server, SqlClient, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

fn handler() -> CommandHandler {
    CommandHandler::new(Arc::new(Store::open_in_memory().unwrap()))
}

/// Benchmark value rendering
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(1));

    group.bench_function("integer", |b| {
        b.iter(|| black_box(render_value(ValueRef::Integer(black_box(1_234_567)))));
    });

    group.bench_function("real", |b| {
        b.iter(|| black_box(render_value(ValueRef::Real(black_box(0.1 + 0.2)))));
    });

    group.bench_function("text", |b| {
        let text = "it's a \"quoted\"\nline".as_bytes();
        b.iter(|| black_box(render_value(ValueRef::Text(black_box(text)))));
    });

    group.finish();
}

/// Benchmark statements executed directly against the store
fn bench_execute(c: &mut Criterion) {
    let handler = handler();

    let mut group = c.benchmark_group("execute");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let sql = format!(
                "INSERT INTO users (username, password) VALUES ('user{}', 'pw')",
                i
            );
            black_box(handler.execute_blocking(&sql));
            i += 1;
        });
    });

    group.bench_function("select_one", |b| {
        b.iter(|| {
            black_box(handler.execute_blocking("SELECT username FROM users WHERE id = 1"));
        });
    });

    group.bench_function("select_100", |b| {
        b.iter(|| {
            black_box(handler.execute_blocking("SELECT id, username FROM users LIMIT 100"));
        });
    });

    group.finish();
}

/// Benchmark a full round trip: connect, send, execute, reply, close
fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let addr = rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let server = Server::new(listener, store, &Config::default());
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run_until(std::future::pending()));
        addr
    });
    let client = SqlClient::new(addr.to_string());

    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("select_literal", |b| {
        b.to_async(&rt).iter(|| {
            let client = client.clone();
            async move {
                black_box(client.send("SELECT 1").await.unwrap());
            }
        });
    });

    group.bench_function("insert", |b| {
        let mut i = 0u64;
        b.to_async(&rt).iter(|| {
            i += 1;
            let sql = format!(
                "INSERT INTO login_history (username, login_time) VALUES ('user{}', datetime('now'))",
                i
            );
            let client = client.clone();
            async move {
                black_box(client.send(&sql).await.unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render, bench_execute, bench_round_trip);

criterion_main!(benches);
