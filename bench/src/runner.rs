//! The measurement loop shared by every driver.
//!
//! One iteration executes one query shape with the next id from the cycle and
//! checks the result. Any error or failed check aborts the whole benchmark.

use crate::driver::{
    QueryDriver, PEOPLE_PER_RANGE, SELECT_MULTIPLE_PEOPLE_SQL, SELECT_PERSON_NAME_SQL,
    SELECT_PERSON_SQL, SELECT_USER_SQL,
};
use crate::error::ShapeError;
use crate::raw::RawClient;
use crate::report::ShapeResult;
use anyhow::{Context, Result};
use bench_core::ids::IdCycle;
use bench_core::types::SanityError;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Instant;

/// The statements being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    /// `first_name` of one person.
    SingleValue,
    /// One full person row.
    SingleRow,
    /// Up to 25 person rows from an id range.
    MultipleRows,
    /// The same range, with rows fetched but never decoded.
    MultipleRowsDiscard,
    /// One full user row.
    UserRow,
}

impl QueryShape {
    pub const ALL: [QueryShape; 5] = [
        QueryShape::SingleValue,
        QueryShape::SingleRow,
        QueryShape::MultipleRows,
        QueryShape::MultipleRowsDiscard,
        QueryShape::UserRow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueryShape::SingleValue => "single_value",
            QueryShape::SingleRow => "single_row",
            QueryShape::MultipleRows => "multiple_rows",
            QueryShape::MultipleRowsDiscard => "multiple_rows_discard",
            QueryShape::UserRow => "user_row",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            QueryShape::SingleValue => SELECT_PERSON_NAME_SQL,
            QueryShape::SingleRow => SELECT_PERSON_SQL,
            QueryShape::MultipleRows | QueryShape::MultipleRowsDiscard => {
                SELECT_MULTIPLE_PEOPLE_SQL
            }
            QueryShape::UserRow => SELECT_USER_SQL,
        }
    }

    /// How many rows one execution may legitimately return.
    pub fn expected_rows(self) -> RangeInclusive<usize> {
        match self {
            QueryShape::MultipleRows | QueryShape::MultipleRowsDiscard => {
                1..=PEOPLE_PER_RANGE as usize
            }
            _ => 1..=1,
        }
    }

    /// Whether the shape takes its ids from `pgxbench_user` rather than `person`.
    pub fn reads_users(self) -> bool {
        matches!(self, QueryShape::UserRow)
    }
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that a range result only holds ids from `[first_id, first_id + 24]`.
pub fn check_range(first_id: i32, ids: impl IntoIterator<Item = i32>) -> Result<usize, ShapeError> {
    let last_id = first_id + PEOPLE_PER_RANGE - 1;
    let mut count = 0;
    for id in ids {
        if id < first_id || id > last_id {
            return Err(ShapeError::OutOfRange {
                first_id,
                last_id,
                id,
            });
        }
        count += 1;
    }
    check_range_count(first_id, count)
}

/// Check a row count from an undecoded range query.
pub fn check_range_count(first_id: i32, count: usize) -> Result<usize, ShapeError> {
    let max = PEOPLE_PER_RANGE as usize;
    if count == 0 {
        return Err(ShapeError::EmptyRange { first_id });
    }
    if count > max {
        return Err(ShapeError::TooManyRows {
            first_id,
            count,
            max,
        });
    }
    Ok(count)
}

fn check_id(requested: i32, returned: i32) -> Result<(), ShapeError> {
    if requested != returned {
        return Err(ShapeError::WrongRow {
            requested,
            returned,
        });
    }
    Ok(())
}

/// Execute `shape` once with `id` and validate what came back.
///
/// Returns the number of rows checked.
pub fn execute_shape(driver: &mut dyn QueryDriver, shape: QueryShape, id: i32) -> Result<usize> {
    match shape {
        QueryShape::SingleValue => {
            let first_name = driver.select_first_name(id)?;
            if first_name.is_empty() {
                return Err(SanityError {
                    record: "person",
                    field: "first_name",
                }
                .into());
            }
            Ok(1)
        }
        QueryShape::SingleRow => {
            let person = driver.select_person(id)?;
            check_id(id, person.id)?;
            person.check_filled()?;
            Ok(1)
        }
        QueryShape::MultipleRows => {
            let people = driver.select_people(id)?;
            for person in &people {
                person.check_filled()?;
            }
            Ok(check_range(id, people.iter().map(|p| p.id))?)
        }
        QueryShape::MultipleRowsDiscard => {
            let count = driver.count_people(id)?;
            Ok(check_range_count(id, count)?)
        }
        QueryShape::UserRow => {
            let user = driver.select_user(id)?;
            check_id(id, user.id)?;
            user.check_filled()?;
            Ok(1)
        }
    }
}

/// Iteration counts for one measurement.
#[derive(Debug, Clone, Copy)]
pub struct LoopParams {
    /// Untimed iterations run first.
    pub warmup: usize,
    /// Timed iterations.
    pub samples: usize,
}

impl LoopParams {
    pub fn standard() -> Self {
        Self {
            warmup: 100,
            samples: 5_000,
        }
    }
}

/// Prepare `driver`, then time `params.samples` executions of `shape`.
pub fn measure(
    driver: &mut dyn QueryDriver,
    shape: QueryShape,
    ids: &IdCycle,
    params: &LoopParams,
) -> Result<ShapeResult> {
    let name = driver.name();
    driver
        .prepare()
        .with_context(|| format!("{name}: prepare failed"))?;

    for i in 0..params.warmup {
        let id = ids.id_at(i);
        execute_shape(driver, shape, id)
            .with_context(|| format!("{name}/{shape}: warmup query for id {id} failed"))?;
    }

    let mut result = ShapeResult::new(name, shape.name());
    for i in params.warmup..params.warmup + params.samples {
        let id = ids.id_at(i);
        let start = Instant::now();
        let rows = execute_shape(driver, shape, id)
            .with_context(|| format!("{name}/{shape}: query for id {id} failed"))?;
        result.add_sample(start.elapsed(), rows);
    }

    Ok(result)
}

/// Time `params.samples` raw round trips of `shape`, which must already be
/// prepared on `client`.
///
/// Request buffers for every id are built before the clock starts. Only
/// completion is checked inside the loop; see [`RawClient::verify`] for the
/// content check run beforehand.
pub fn measure_raw(
    client: &mut RawClient,
    shape: QueryShape,
    ids: &IdCycle,
    params: &LoopParams,
) -> Result<ShapeResult> {
    let requests = RawClient::build_requests(shape, ids.ids())
        .with_context(|| format!("raw: building {shape} requests failed"))?;

    for i in 0..params.warmup {
        client
            .roundtrip(&requests[i % requests.len()])
            .with_context(|| format!("raw/{shape}: warmup round trip failed"))?;
    }

    let mut result = ShapeResult::new("raw", shape.name());
    for i in params.warmup..params.warmup + params.samples {
        let start = Instant::now();
        client
            .roundtrip(&requests[i % requests.len()])
            .with_context(|| format!("raw/{shape}: round trip for id {} failed", ids.id_at(i)))?;
        result.add_sample(start.elapsed(), 0);
    }

    Ok(result)
}
