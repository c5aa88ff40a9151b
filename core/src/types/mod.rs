//! Fixture records mirrored from the `person` and `pgxbench_user` tables.

mod person;
mod user;

pub use person::Person;
pub use user::User;

use thiserror::Error;

/// A fetched record still holds the zero value in one of its columns, which
/// means the driver returned nothing useful for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{record}.{field} was empty")]
pub struct SanityError {
    pub record: &'static str,
    pub field: &'static str,
}

impl SanityError {
    pub(crate) fn new(record: &'static str, field: &'static str) -> Self {
        Self { record, field }
    }
}
