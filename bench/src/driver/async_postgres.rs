//! `tokio-postgres` client checked out of a deadpool pool.
//!
//! Calls are driven to completion on the context's current-thread runtime so
//! the driver exposes the same blocking interface as the others.

use super::pg_rows::{person_from_row, user_from_row};
use super::{
    prepared, QueryDriver, SELECT_MULTIPLE_PEOPLE_SQL, SELECT_PERSON_NAME_SQL, SELECT_PERSON_SQL,
    SELECT_USER_SQL,
};
use anyhow::{Context, Result};
use bench_core::config::ConnConfig;
use bench_core::types::{Person, User};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio::runtime::Runtime;
use tokio_postgres::{NoTls, Statement};

/// Open a deadpool pool capped at `config.pool_size` connections.
///
/// Connections are established lazily on first checkout.
pub fn build_pool(config: &ConnConfig) -> Result<Pool> {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .dbname(&config.database)
        .application_name("driver-bench");
    if let Some(password) = &config.password {
        pg.password(password);
    }

    let mut manager_config = ManagerConfig::default();
    manager_config.recycling_method = RecyclingMethod::Fast;
    let manager = Manager::from_config(pg, NoTls, manager_config);

    Pool::builder(manager)
        .max_size(config.pool_size as usize)
        .build()
        .context("failed to build tokio-postgres (deadpool) pool")
}

struct Statements {
    person_name: Statement,
    person: Statement,
    people: Statement,
    user: Statement,
}

pub struct AsyncPostgresDriver<'rt> {
    runtime: &'rt Runtime,
    conn: Object,
    statements: Option<Statements>,
}

impl<'rt> AsyncPostgresDriver<'rt> {
    pub fn checkout(pool: &Pool, runtime: &'rt Runtime) -> Result<Self> {
        let conn = runtime
            .block_on(pool.get())
            .context("failed to check out a tokio-postgres connection")?;
        Ok(Self {
            runtime,
            conn,
            statements: None,
        })
    }
}

impl QueryDriver for AsyncPostgresDriver<'_> {
    fn name(&self) -> &'static str {
        "tokio-postgres"
    }

    fn prepare(&mut self) -> Result<()> {
        let conn = &self.conn;
        let statements = self.runtime.block_on(async {
            Ok::<_, tokio_postgres::Error>(Statements {
                person_name: conn.prepare(SELECT_PERSON_NAME_SQL).await?,
                person: conn.prepare(SELECT_PERSON_SQL).await?,
                people: conn.prepare(SELECT_MULTIPLE_PEOPLE_SQL).await?,
                user: conn.prepare(SELECT_USER_SQL).await?,
            })
        })?;
        self.statements = Some(statements);
        Ok(())
    }

    fn select_first_name(&mut self, id: i32) -> Result<String> {
        let stmts = prepared(&self.statements)?;
        let row = self
            .runtime
            .block_on(self.conn.query_one(&stmts.person_name, &[&id]))?;
        Ok(row.try_get(0)?)
    }

    fn select_person(&mut self, id: i32) -> Result<Person> {
        let stmts = prepared(&self.statements)?;
        let row = self
            .runtime
            .block_on(self.conn.query_one(&stmts.person, &[&id]))?;
        Ok(person_from_row(&row)?)
    }

    fn select_people(&mut self, first_id: i32) -> Result<Vec<Person>> {
        let stmts = prepared(&self.statements)?;
        let rows = self
            .runtime
            .block_on(self.conn.query(&stmts.people, &[&first_id]))?;
        let people = rows
            .iter()
            .map(person_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(people)
    }

    fn count_people(&mut self, first_id: i32) -> Result<usize> {
        let stmts = prepared(&self.statements)?;
        let rows = self
            .runtime
            .block_on(self.conn.query(&stmts.people, &[&first_id]))?;
        Ok(rows.len())
    }

    fn select_user(&mut self, id: i32) -> Result<User> {
        let stmts = prepared(&self.statements)?;
        let row = self
            .runtime
            .block_on(self.conn.query_one(&stmts.user, &[&id]))?;
        Ok(user_from_row(&row)?)
    }
}
