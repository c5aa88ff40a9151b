//! Criterion benchmark harness: measures per-query latency of every client
//! library for each query shape against a live PostgreSQL server.
//!
//! One context is built before any group runs and shared by reference, so the
//! fixtures are loaded and the pools opened exactly once.

use bench_core::config::ConnConfig;
use criterion::{BenchmarkId, Criterion};
use driver_bench::context::BenchContext;
use driver_bench::driver::DriverKind;
use driver_bench::fixtures::FixtureParams;
use driver_bench::raw::RawClient;
use driver_bench::runner::{execute_shape, QueryShape};
use std::time::Duration;

fn bench_shape(c: &mut Criterion, ctx: &BenchContext, raw: &mut RawClient, shape: QueryShape) {
    let mut group = c.benchmark_group(format!("query/{shape}"));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(50);

    let ids = ctx.ids_for(shape);

    for kind in DriverKind::ALL {
        let mut driver = ctx.checkout(kind).expect("Failed to check out a connection");
        driver.prepare().expect("Failed to prepare statements");
        let mut i = 0usize;

        group.bench_function(BenchmarkId::from_parameter(kind.name()), |b| {
            b.iter(|| {
                let id = ids.id_at(i);
                i += 1;
                execute_shape(driver.as_mut(), shape, id).expect("query failed")
            });
        });
    }

    // Raw requests are encoded before measurement starts.
    let requests = RawClient::build_requests(shape, ids.ids()).expect("Failed to build requests");
    let mut i = 0usize;
    group.bench_function(BenchmarkId::from_parameter("raw"), |b| {
        b.iter(|| {
            raw.roundtrip(&requests[i % requests.len()])
                .expect("round trip failed");
            i += 1;
        });
    });

    group.finish();
}

fn main() {
    let config = ConnConfig::from_env().expect("Invalid connection configuration");
    let ctx = BenchContext::setup(config, &FixtureParams::standard())
        .expect("Failed to set up benchmark context");

    let mut raw = ctx.raw_client().expect("Failed to open raw connection");
    for shape in QueryShape::ALL {
        raw.prepare(shape).expect("Failed to prepare raw statement");
        raw.verify(shape, ctx.ids_for(shape).id_at(0))
            .expect("raw verification failed");
    }

    let mut criterion = Criterion::default().configure_from_args();
    for shape in QueryShape::ALL {
        bench_shape(&mut criterion, &ctx, &mut raw, shape);
    }
    criterion.final_summary();

    drop(raw);
    ctx.teardown();
}
