//! Row scanning shared by the `postgres` and `tokio-postgres` drivers
//! (`postgres::Row` is a re-export of `tokio_postgres::Row`).

use bench_core::types::{Person, User};
use tokio_postgres::{Error, Row};

pub(crate) fn person_from_row(row: &Row) -> Result<Person, Error> {
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

pub(crate) fn user_from_row(row: &Row) -> Result<User, Error> {
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
