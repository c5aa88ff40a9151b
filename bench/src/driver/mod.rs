//! Driver definitions and the common `QueryDriver` trait.
//!
//! Three pooled implementations are provided:
//! - [`sync_postgres::SyncPostgresDriver`]: blocking `postgres` client via r2d2
//! - [`async_postgres::AsyncPostgresDriver`]: `tokio-postgres` via deadpool
//! - [`sqlx_pg::SqlxDriver`]: `sqlx` with its own pool
//!
//! The raw protocol client does not decode rows and lives in [`crate::raw`].

pub mod async_postgres;
mod pg_rows;
pub mod sqlx_pg;
pub mod sync_postgres;

use anyhow::Result;
use bench_core::types::{Person, User};
use std::fmt;
use std::str::FromStr;

pub const SELECT_PERSON_NAME_SQL: &str = "select first_name from person where id=$1";

pub const SELECT_PERSON_SQL: &str = "
select id, first_name, last_name, sex, birth_date, weight, height, update_time
from person
where id=$1";

/// Range width of [`SELECT_MULTIPLE_PEOPLE_SQL`]: ids `$1` through `$1 + 24`.
pub const PEOPLE_PER_RANGE: i32 = 25;

pub const SELECT_MULTIPLE_PEOPLE_SQL: &str = "
select id, first_name, last_name, sex, birth_date, weight, height, update_time
from person
where id between $1 and $1 + 24";

pub const SELECT_USER_SQL: &str = "
select id, active, admin, name, email, first_name, last_name, birth_date,
  password_digest, login_count, failed_login_count, password_strength,
  creation_time, last_login_time
from pgxbench_user
where id=$1";

/// Trait implemented by each client library under test.
///
/// A driver value owns one pooled connection for its whole lifetime; the
/// connection goes back to the pool when the driver is dropped. Statements
/// are prepared once by [`QueryDriver::prepare`] outside the timed region.
pub trait QueryDriver {
    /// Human-readable name for reports.
    fn name(&self) -> &'static str;

    /// Prepare every benchmark statement on the held connection.
    fn prepare(&mut self) -> Result<()>;

    /// Single scalar: the `first_name` of one person.
    fn select_first_name(&mut self, id: i32) -> Result<String>;

    /// Single row: one full person.
    fn select_person(&mut self, id: i32) -> Result<Person>;

    /// Many rows: every person with `first_id <= id <= first_id + 24`.
    fn select_people(&mut self, first_id: i32) -> Result<Vec<Person>>;

    /// Many rows fetched but left undecoded: the number of rows the range
    /// query for `first_id` returned.
    fn count_people(&mut self, first_id: i32) -> Result<usize>;

    /// Single wide row: one full user including its `bytea` digest.
    fn select_user(&mut self, id: i32) -> Result<User>;
}

/// Borrow a driver's prepared statements, failing when `prepare` was skipped.
pub(crate) fn prepared<T>(statements: &Option<T>) -> Result<&T> {
    statements
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("statements used before QueryDriver::prepare"))
}

/// The pooled client libraries a [`crate::context::BenchContext`] can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Postgres,
    TokioPostgres,
    Sqlx,
}

impl DriverKind {
    pub const ALL: [DriverKind; 3] = [
        DriverKind::Postgres,
        DriverKind::TokioPostgres,
        DriverKind::Sqlx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DriverKind::Postgres => "postgres",
            DriverKind::TokioPostgres => "tokio-postgres",
            DriverKind::Sqlx => "sqlx",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DriverKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown driver {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names_round_trip_through_from_str() {
        for kind in DriverKind::ALL {
            assert_eq!(kind.name().parse::<DriverKind>(), Ok(kind));
        }
        assert_eq!(" SQLX ".parse::<DriverKind>(), Ok(DriverKind::Sqlx));
        assert!("pq".parse::<DriverKind>().is_err());
    }

    #[test]
    fn range_sql_matches_range_width() {
        let upper = format!("$1 + {}", PEOPLE_PER_RANGE - 1);
        assert!(SELECT_MULTIPLE_PEOPLE_SQL.contains(&upper));
    }
}
