//! Blocking `postgres` client checked out of an r2d2 pool.

use super::pg_rows::{person_from_row, user_from_row};
use super::{
    prepared, QueryDriver, SELECT_MULTIPLE_PEOPLE_SQL, SELECT_PERSON_NAME_SQL, SELECT_PERSON_SQL,
    SELECT_USER_SQL,
};
use anyhow::{Context, Result};
use bench_core::config::ConnConfig;
use bench_core::types::{Person, User};
use postgres::{NoTls, Statement};
use r2d2::PooledConnection;
use r2d2_postgres::PostgresConnectionManager;

pub type SyncPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;

/// Build the blocking client configuration shared by the pool and the
/// fixture loader.
pub fn client_config(config: &ConnConfig) -> postgres::Config {
    let mut pg = postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .dbname(&config.database)
        .application_name("driver-bench")
        .notice_callback(|notice| {
            log::debug!("server notice: {}: {}", notice.severity(), notice.message())
        });
    if let Some(password) = &config.password {
        pg.password(password);
    }
    pg
}

/// Open an r2d2 pool capped at `config.pool_size` connections.
pub fn build_pool(config: &ConnConfig) -> Result<SyncPool> {
    let manager = PostgresConnectionManager::new(client_config(config), NoTls);
    r2d2::Pool::builder()
        .max_size(config.pool_size)
        .min_idle(Some(1))
        .build(manager)
        .context("failed to build postgres (r2d2) pool")
}

struct Statements {
    person_name: Statement,
    person: Statement,
    people: Statement,
    user: Statement,
}

pub struct SyncPostgresDriver {
    conn: PooledConnection<PostgresConnectionManager<NoTls>>,
    statements: Option<Statements>,
}

impl SyncPostgresDriver {
    pub fn checkout(pool: &SyncPool) -> Result<Self> {
        let conn = pool
            .get()
            .context("failed to check out a postgres connection")?;
        Ok(Self {
            conn,
            statements: None,
        })
    }
}

impl QueryDriver for SyncPostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn prepare(&mut self) -> Result<()> {
        let conn = &mut self.conn;
        self.statements = Some(Statements {
            person_name: conn.prepare(SELECT_PERSON_NAME_SQL)?,
            person: conn.prepare(SELECT_PERSON_SQL)?,
            people: conn.prepare(SELECT_MULTIPLE_PEOPLE_SQL)?,
            user: conn.prepare(SELECT_USER_SQL)?,
        });
        Ok(())
    }

    fn select_first_name(&mut self, id: i32) -> Result<String> {
        let stmts = prepared(&self.statements)?;
        let row = self.conn.query_one(&stmts.person_name, &[&id])?;
        Ok(row.try_get(0)?)
    }

    fn select_person(&mut self, id: i32) -> Result<Person> {
        let stmts = prepared(&self.statements)?;
        let row = self.conn.query_one(&stmts.person, &[&id])?;
        Ok(person_from_row(&row)?)
    }

    fn select_people(&mut self, first_id: i32) -> Result<Vec<Person>> {
        let stmts = prepared(&self.statements)?;
        let rows = self.conn.query(&stmts.people, &[&first_id])?;
        let people = rows
            .iter()
            .map(person_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(people)
    }

    fn count_people(&mut self, first_id: i32) -> Result<usize> {
        let stmts = prepared(&self.statements)?;
        Ok(self.conn.query(&stmts.people, &[&first_id])?.len())
    }

    fn select_user(&mut self, id: i32) -> Result<User> {
        let stmts = prepared(&self.statements)?;
        let row = self.conn.query_one(&stmts.user, &[&id])?;
        Ok(user_from_row(&row)?)
    }
}
