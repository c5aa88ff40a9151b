//! `sqlx` client checked out of its own `PgPool`.

use super::{
    prepared, QueryDriver, SELECT_MULTIPLE_PEOPLE_SQL, SELECT_PERSON_NAME_SQL, SELECT_PERSON_SQL,
    SELECT_USER_SQL,
};
use anyhow::{Context, Result};
use bench_core::config::ConnConfig;
use bench_core::types::{Person, User};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode, PgStatement};
use sqlx::{Executor, Postgres, Row, Statement};
use tokio::runtime::Runtime;

pub fn connect_options(config: &ConnConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database)
        .ssl_mode(PgSslMode::Disable)
        .application_name("driver-bench");
    match &config.password {
        Some(password) => options.password(password),
        None => options,
    }
}

/// Open a sqlx pool capped at `config.pool_size` connections. The pool's
/// maintenance tasks live on `runtime`.
pub fn build_pool(config: &ConnConfig, runtime: &Runtime) -> Result<PgPool> {
    let options = connect_options(config);
    runtime
        .block_on(
            PgPoolOptions::new()
                .max_connections(config.pool_size)
                .connect_with(options),
        )
        .context("failed to build sqlx pool")
}

fn person_from_row(row: &PgRow) -> Result<Person, sqlx::Error> {
    Ok(Person {
        id: row.try_get(0)?,
        first_name: row.try_get(1)?,
        last_name: row.try_get(2)?,
        sex: row.try_get(3)?,
        birth_date: row.try_get(4)?,
        weight: row.try_get(5)?,
        height: row.try_get(6)?,
        update_time: row.try_get(7)?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get(0)?,
        active: row.try_get(1)?,
        admin: row.try_get(2)?,
        name: row.try_get(3)?,
        email: row.try_get(4)?,
        first_name: row.try_get(5)?,
        last_name: row.try_get(6)?,
        birth_date: row.try_get(7)?,
        password_digest: row.try_get(8)?,
        login_count: row.try_get(9)?,
        failed_login_count: row.try_get(10)?,
        password_strength: row.try_get(11)?,
        creation_time: row.try_get(12)?,
        last_login_time: row.try_get(13)?,
    })
}

struct Statements {
    person_name: PgStatement<'static>,
    person: PgStatement<'static>,
    people: PgStatement<'static>,
    user: PgStatement<'static>,
}

pub struct SqlxDriver<'rt> {
    runtime: &'rt Runtime,
    /// Always `Some` until the driver is dropped.
    conn: Option<PoolConnection<Postgres>>,
    statements: Option<Statements>,
}

impl<'rt> SqlxDriver<'rt> {
    pub fn checkout(pool: &PgPool, runtime: &'rt Runtime) -> Result<Self> {
        let conn = runtime
            .block_on(pool.acquire())
            .context("failed to check out a sqlx connection")?;
        Ok(Self {
            runtime,
            conn: Some(conn),
            statements: None,
        })
    }
}

fn held(conn: &mut Option<PoolConnection<Postgres>>) -> Result<&mut PoolConnection<Postgres>> {
    conn.as_mut().context("sqlx connection already released")
}

// Returning a connection spawns a task on the pool's runtime, so the release
// has to happen inside that runtime's context.
impl Drop for SqlxDriver<'_> {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        self.statements = None;
        drop(self.conn.take());
    }
}

impl QueryDriver for SqlxDriver<'_> {
    fn name(&self) -> &'static str {
        "sqlx"
    }

    fn prepare(&mut self) -> Result<()> {
        let conn = held(&mut self.conn)?;
        let statements = self.runtime.block_on(async {
            Ok::<_, sqlx::Error>(Statements {
                person_name: (&mut **conn).prepare(SELECT_PERSON_NAME_SQL).await?,
                person: (&mut **conn).prepare(SELECT_PERSON_SQL).await?,
                people: (&mut **conn).prepare(SELECT_MULTIPLE_PEOPLE_SQL).await?,
                user: (&mut **conn).prepare(SELECT_USER_SQL).await?,
            })
        })?;
        self.statements = Some(statements);
        Ok(())
    }

    fn select_first_name(&mut self, id: i32) -> Result<String> {
        let stmts = prepared(&self.statements)?;
        let conn = held(&mut self.conn)?;
        let row = self
            .runtime
            .block_on(stmts.person_name.query().bind(id).fetch_one(&mut **conn))?;
        Ok(row.try_get(0)?)
    }

    fn select_person(&mut self, id: i32) -> Result<Person> {
        let stmts = prepared(&self.statements)?;
        let conn = held(&mut self.conn)?;
        let row = self
            .runtime
            .block_on(stmts.person.query().bind(id).fetch_one(&mut **conn))?;
        Ok(person_from_row(&row)?)
    }

    fn select_people(&mut self, first_id: i32) -> Result<Vec<Person>> {
        let stmts = prepared(&self.statements)?;
        let conn = held(&mut self.conn)?;
        let rows = self
            .runtime
            .block_on(stmts.people.query().bind(first_id).fetch_all(&mut **conn))?;
        let people = rows
            .iter()
            .map(person_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(people)
    }

    fn count_people(&mut self, first_id: i32) -> Result<usize> {
        let stmts = prepared(&self.statements)?;
        let conn = held(&mut self.conn)?;
        let rows = self
            .runtime
            .block_on(stmts.people.query().bind(first_id).fetch_all(&mut **conn))?;
        Ok(rows.len())
    }

    fn select_user(&mut self, id: i32) -> Result<User> {
        let stmts = prepared(&self.statements)?;
        let conn = held(&mut self.conn)?;
        let row = self
            .runtime
            .block_on(stmts.user.query().bind(id).fetch_one(&mut **conn))?;
        Ok(user_from_row(&row)?)
    }
}
