//! PostgreSQL Client Latency Benchmark
//!
//! Measures how long the same parameterized queries take through several
//! PostgreSQL client libraries:
//! - **postgres**: blocking client pooled with r2d2
//! - **tokio-postgres**: async client pooled with deadpool
//! - **sqlx**: async client with its own pool
//! - **raw**: pre-built extended-query messages written straight to a socket
//!
//! Every driver is exercised through the [`driver::QueryDriver`] trait so the
//! measurement loop is identical across libraries. Fixtures live in the
//! `person` and `pgxbench_user` tables and are seeded on first run.
//!
//! Run benchmarks: `cargo bench`
//! Run the standalone report: `cargo run --release`
//! Run tests: `cargo test` (database tests: `cargo test -- --ignored`)

pub mod context;
pub mod driver;
pub mod error;
pub mod fixtures;
pub mod raw;
pub mod report;
pub mod runner;
