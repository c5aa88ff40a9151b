use super::SanityError;
use chrono::{DateTime, NaiveDate, Utc};

/// One row of the `person` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub sex: String,
    pub birth_date: NaiveDate,
    pub weight: i32,
    pub height: i32,
    pub update_time: DateTime<Utc>,
}

impl Person {
    /// Checks that every column came back populated.
    pub fn check_filled(&self) -> Result<(), SanityError> {
        let empty = |field: &'static str| Err(SanityError::new("person", field));

        if self.id == 0 {
            return empty("id");
        }
        if self.first_name.is_empty() {
            return empty("first_name");
        }
        if self.last_name.is_empty() {
            return empty("last_name");
        }
        if self.sex.is_empty() {
            return empty("sex");
        }
        if self.birth_date == NaiveDate::default() {
            return empty("birth_date");
        }
        if self.weight == 0 {
            return empty("weight");
        }
        if self.height == 0 {
            return empty("height");
        }
        if self.update_time == DateTime::<Utc>::default() {
            return empty("update_time");
        }
        Ok(())
    }
}
