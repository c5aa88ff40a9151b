//! Process-wide benchmark state, built once and passed by reference.
//!
//! A [`BenchContext`] owns the runtime that drives the async clients, one pool
//! per library and the shuffled id lists. Benchmarks borrow drivers from it and
//! return their connection by dropping them.

use crate::driver::async_postgres::{self, AsyncPostgresDriver};
use crate::driver::sqlx_pg::{self, SqlxDriver};
use crate::driver::sync_postgres::{self, SyncPool, SyncPostgresDriver};
use crate::driver::{DriverKind, QueryDriver};
use crate::fixtures::{self, FixtureCounts, FixtureParams, PERSON_TABLE, USER_TABLE};
use crate::raw::RawClient;
use crate::runner::QueryShape;
use anyhow::{Context, Result};
use bench_core::config::ConnConfig;
use bench_core::ids::IdCycle;
use postgres::NoTls;
use sqlx::PgPool;
use tokio::runtime::{Builder, Runtime};

pub struct BenchContext {
    config: ConnConfig,
    sync_pool: SyncPool,
    async_pool: deadpool_postgres::Pool,
    sqlx_pool: PgPool,
    person_ids: IdCycle,
    user_ids: IdCycle,
    counts: FixtureCounts,
    // Declared last so it outlives the pools whose tasks it runs.
    runtime: Runtime,
}

impl BenchContext {
    /// Load or verify fixtures, collect the id lists and open every pool.
    pub fn setup(config: ConnConfig, params: &FixtureParams) -> Result<Self> {
        log::info!("Setting up benchmark context ({config})");

        let mut client = sync_postgres::client_config(&config)
            .connect(NoTls)
            .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
        let counts = fixtures::load_or_verify(&mut client, params)?;
        let person_ids = fixtures::fetch_ids(&mut client, PERSON_TABLE)?;
        let user_ids = fixtures::fetch_ids(&mut client, USER_TABLE)?;
        drop(client);

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        let sync_pool = sync_postgres::build_pool(&config)?;
        let async_pool = async_postgres::build_pool(&config)?;
        let sqlx_pool = sqlx_pg::build_pool(&config, &runtime)?;

        log::info!(
            "Context ready: {} person ids, {} user ids, pool size {}",
            person_ids.len(),
            user_ids.len(),
            config.pool_size
        );

        Ok(Self {
            config,
            sync_pool,
            async_pool,
            sqlx_pool,
            person_ids,
            user_ids,
            counts,
            runtime,
        })
    }

    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    pub fn fixture_counts(&self) -> &FixtureCounts {
        &self.counts
    }

    /// Check one connection out of the pool for `kind`. It stays checked out
    /// until the returned driver is dropped.
    pub fn checkout(&self, kind: DriverKind) -> Result<Box<dyn QueryDriver + '_>> {
        let driver: Box<dyn QueryDriver + '_> = match kind {
            DriverKind::Postgres => Box::new(SyncPostgresDriver::checkout(&self.sync_pool)?),
            DriverKind::TokioPostgres => Box::new(AsyncPostgresDriver::checkout(
                &self.async_pool,
                &self.runtime,
            )?),
            DriverKind::Sqlx => Box::new(SqlxDriver::checkout(&self.sqlx_pool, &self.runtime)?),
        };
        Ok(driver)
    }

    /// Open a dedicated raw-protocol connection.
    pub fn raw_client(&self) -> Result<RawClient> {
        RawClient::connect(&self.config).context("raw client failed to connect")
    }

    /// Ids valid for the table `shape` reads from.
    pub fn ids_for(&self, shape: QueryShape) -> &IdCycle {
        if shape.reads_users() {
            &self.user_ids
        } else {
            &self.person_ids
        }
    }

    /// Close every pool.
    pub fn teardown(self) {
        let BenchContext {
            runtime,
            sync_pool,
            async_pool,
            sqlx_pool,
            ..
        } = self;

        runtime.block_on(sqlx_pool.close());
        async_pool.close();
        drop(sync_pool);
        log::info!("Benchmark context torn down");
    }
}
