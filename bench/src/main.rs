//! Standalone benchmark runner that prints the formatted report.
//!
//! Connects with the libpq environment variables (`PGHOST`, `PGPORT`,
//! `PGUSER`, `PGPASSWORD`, `PGDATABASE`), seeds the fixture tables when they
//! are empty and times every (driver, query shape) pair.
//!
//! Usage:
//!   cargo run --release
//!   BENCH_DRIVERS=postgres,raw BENCH_SAMPLES=20000 cargo run --release

use anyhow::{Context, Result};
use bench_core::config::ConnConfig;
use bench_core::{initialize_logger, parse_log_level};
use driver_bench::context::BenchContext;
use driver_bench::driver::DriverKind;
use driver_bench::fixtures::FixtureParams;
use driver_bench::report::{print_report, ShapeResult};
use driver_bench::runner::{measure, measure_raw, LoopParams, QueryShape};
use log::LevelFilter;
use std::{env, process};

const RAW_DRIVER: &str = "raw";

fn resolve_log_level() -> LevelFilter {
    env::var("BENCH_LOG_LEVEL")
        .ok()
        .as_deref()
        .and_then(parse_log_level)
        .unwrap_or(LevelFilter::Info)
}

fn resolve_log_file() -> Option<String> {
    match env::var("BENCH_LOG_FILE") {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn resolve_count(var: &str, default: usize) -> Result<usize> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .with_context(|| format!("{var}={value:?} is not a non-negative integer")),
        Err(_) => Ok(default),
    }
}

fn resolve_loop_params() -> Result<LoopParams> {
    let standard = LoopParams::standard();
    let params = LoopParams {
        warmup: resolve_count("BENCH_WARMUP", standard.warmup)?,
        samples: resolve_count("BENCH_SAMPLES", standard.samples)?,
    };
    anyhow::ensure!(params.samples > 0, "BENCH_SAMPLES must be at least 1");
    Ok(params)
}

/// Drivers selected by `BENCH_DRIVERS`, plus whether the raw client runs.
fn resolve_drivers() -> Result<(Vec<DriverKind>, bool)> {
    let Ok(value) = env::var("BENCH_DRIVERS") else {
        return Ok((DriverKind::ALL.to_vec(), true));
    };

    let mut kinds = Vec::new();
    let mut raw = false;
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if name.eq_ignore_ascii_case(RAW_DRIVER) {
            raw = true;
        } else {
            let kind = name
                .parse::<DriverKind>()
                .map_err(|e| anyhow::anyhow!("BENCH_DRIVERS: {e}"))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
    }
    anyhow::ensure!(
        raw || !kinds.is_empty(),
        "BENCH_DRIVERS={value:?} selects no drivers"
    );
    Ok((kinds, raw))
}

fn run_drivers(
    ctx: &BenchContext,
    kinds: &[DriverKind],
    params: &LoopParams,
) -> Result<Vec<ShapeResult>> {
    let mut results = Vec::new();
    for &kind in kinds {
        for shape in QueryShape::ALL {
            eprint!("  Benchmarking {kind}/{shape}...");
            let mut driver = ctx.checkout(kind)?;
            let r = measure(driver.as_mut(), shape, ctx.ids_for(shape), params)?;
            eprintln!(" done ({:.1}µs mean)", r.mean_us());
            results.push(r);
        }
    }
    Ok(results)
}

fn run_raw(ctx: &BenchContext, params: &LoopParams) -> Result<Vec<ShapeResult>> {
    let mut client = ctx.raw_client()?;
    let mut results = Vec::new();
    for shape in QueryShape::ALL {
        eprint!("  Benchmarking {RAW_DRIVER}/{shape}...");
        client
            .prepare(shape)
            .with_context(|| format!("raw: prepare {shape} failed"))?;

        let id = ctx.ids_for(shape).id_at(0);
        let summary = client
            .verify(shape, id)
            .with_context(|| format!("raw/{shape}: verification for id {id} failed"))?;
        log::debug!(
            "raw/{shape}: id {id} returned {} rows ({})",
            summary.data_rows,
            summary.command_tag
        );

        let r = measure_raw(&mut client, shape, ctx.ids_for(shape), params)?;
        eprintln!(" done ({:.1}µs mean)", r.mean_us());
        results.push(r);
    }
    Ok(results)
}

fn run() -> Result<()> {
    let config = ConnConfig::from_env().context("invalid connection configuration")?;
    let params = resolve_loop_params()?;
    let (kinds, raw) = resolve_drivers()?;

    println!("Running PostgreSQL driver latency benchmark...");
    println!("  Connection:     {config}");
    println!("  Warmup queries: {}", params.warmup);
    println!("  Sample queries: {}", params.samples);

    let ctx = BenchContext::setup(config, &FixtureParams::standard())?;

    let mut results = run_drivers(&ctx, &kinds, &params)?;
    if raw {
        results.extend(run_raw(&ctx, &params)?);
    }

    print_report(&results);
    ctx.teardown();
    Ok(())
}

fn main() {
    let log_file = resolve_log_file();
    if let Err(e) = initialize_logger(resolve_log_level(), log_file.as_deref()) {
        eprintln!("Failed to initialize logger: {e:#}");
        process::exit(1);
    }

    if let Err(e) = run() {
        log::error!("Benchmark aborted: {e:#}");
        process::exit(1);
    }
}
