use super::SanityError;
use chrono::{DateTime, NaiveDate, Utc};

/// One row of the `pgxbench_user` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub active: bool,
    pub admin: bool,
    pub name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    /// Raw digest bytes (`bytea`).
    pub password_digest: Vec<u8>,
    pub login_count: i32,
    pub failed_login_count: i32,
    pub password_strength: i32,
    pub creation_time: DateTime<Utc>,
    pub last_login_time: DateTime<Utc>,
}

impl User {
    /// Checks that every non-flag column came back populated. `active` and
    /// `admin` are legitimately false on most rows and are not checked.
    pub fn check_filled(&self) -> Result<(), SanityError> {
        let empty = |field: &'static str| Err(SanityError::new("user", field));

        if self.id == 0 {
            return empty("id");
        }
        if self.name.is_empty() {
            return empty("name");
        }
        if self.email.is_empty() {
            return empty("email");
        }
        if self.first_name.is_empty() {
            return empty("first_name");
        }
        if self.last_name.is_empty() {
            return empty("last_name");
        }
        if self.birth_date == NaiveDate::default() {
            return empty("birth_date");
        }
        if self.password_digest.is_empty() {
            return empty("password_digest");
        }
        if self.login_count == 0 {
            return empty("login_count");
        }
        if self.failed_login_count == 0 {
            return empty("failed_login_count");
        }
        if self.password_strength == 0 {
            return empty("password_strength");
        }
        if self.creation_time == DateTime::<Utc>::default() {
            return empty("creation_time");
        }
        if self.last_login_time == DateTime::<Utc>::default() {
            return empty("last_login_time");
        }
        Ok(())
    }
}
