//! Fixture tables: schema, deterministic row generation and seeding.
//!
//! Tables are created when missing and seeded only when empty, so repeated
//! runs against the same database reuse the rows of the first run. Seeding
//! goes through a plain blocking `postgres::Client` outside any pool.

use anyhow::{Context, Result};
use bench_core::ids::IdCycle;
use bench_core::types::{Person, User};
use chrono::{DateTime, Duration, Utc};
use postgres::Client;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const PERSON_TABLE: &str = "person";
pub const USER_TABLE: &str = "pgxbench_user";

/// Seed for row generation. Changing it changes every fixture value.
const FIXTURE_SEED: u64 = 0xDEAD_BEEF_CAFE_1337;
/// Advisory lock key held while the fixture tables are created and seeded.
const FIXTURE_LOCK_KEY: i64 = 0x7067_7862_656e_6368;
/// Seed for the order in which ids are replayed.
const ID_ORDER_SEED: u64 = 0x5EED_0F_1D5;

const CREATE_PERSON_SQL: &str = "
create table person (
  id int4 primary key,
  first_name text not null,
  last_name text not null,
  sex text not null,
  birth_date date not null,
  weight int4 not null,
  height int4 not null,
  update_time timestamptz not null
)";

const CREATE_USER_SQL: &str = "
create table pgxbench_user (
  id int4 primary key,
  active boolean not null,
  admin boolean not null,
  name text not null unique,
  email text not null,
  first_name text not null,
  last_name text not null,
  birth_date date not null,
  password_digest bytea not null,
  login_count int4 not null,
  failed_login_count int4 not null,
  password_strength int4 not null,
  creation_time timestamptz not null,
  last_login_time timestamptz not null
)";

const INSERT_PERSON_SQL: &str = "
insert into person (id, first_name, last_name, sex, birth_date, weight, height, update_time)
values ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_USER_SQL: &str = "
insert into pgxbench_user (
  id, active, admin, name, email, first_name, last_name, birth_date,
  password_digest, login_count, failed_login_count, password_strength,
  creation_time, last_login_time
) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)";

const FIRST_NAMES: &[&str] = &[
    "Jane", "John", "Mary", "James", "Patricia", "Robert", "Linda", "Michael", "Barbara",
    "William", "Elizabeth", "David", "Susan", "Richard", "Jessica", "Joseph", "Sarah", "Thomas",
    "Karen", "Charles",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Taylor", "Moore",
    "Jackson", "Martin", "Lee",
];

/// How many rows each fixture table receives when seeded.
#[derive(Debug, Clone, Copy)]
pub struct FixtureParams {
    pub persons: usize,
    pub users: usize,
}

impl FixtureParams {
    pub fn standard() -> Self {
        Self {
            persons: 10_000,
            users: 10_000,
        }
    }

    pub fn small() -> Self {
        Self {
            persons: 100,
            users: 50,
        }
    }
}

/// Row counts observed after [`load_or_verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureCounts {
    pub persons: i64,
    pub users: i64,
    pub seeded: bool,
}

fn pick<'a>(rng: &mut StdRng, names: &[&'a str]) -> &'a str {
    names[rng.gen_range(0..names.len())]
}

/// A date or timestamp `seconds` after the epoch. Callers keep `seconds`
/// positive so no fixture ever holds the zero value.
fn epoch_plus(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(seconds)
}

/// Generate `params.persons` people with ids `1..=persons`.
///
/// Uses a fixed seed for deterministic, reproducible fixtures.
pub fn generate_people(params: &FixtureParams) -> Vec<Person> {
    let mut rng = StdRng::seed_from_u64(FIXTURE_SEED);

    (1..=params.persons as i32)
        .map(|id| {
            let sex = if rng.gen_bool(0.5) { "female" } else { "male" };
            // 1971-01-01 onwards keeps birth dates clear of the epoch.
            let birth_days = 365 + rng.gen_range(0..12_000i64);
            Person {
                id,
                first_name: pick(&mut rng, FIRST_NAMES).to_string(),
                last_name: pick(&mut rng, LAST_NAMES).to_string(),
                sex: sex.to_string(),
                birth_date: epoch_plus(birth_days * 86_400).date_naive(),
                weight: rng.gen_range(40..140),
                height: rng.gen_range(140..210),
                update_time: epoch_plus(1_420_070_400 + rng.gen_range(0..100_000_000i64)),
            }
        })
        .collect()
}

/// Generate `params.users` users with ids `1..=users`.
pub fn generate_users(params: &FixtureParams) -> Vec<User> {
    let mut rng = StdRng::seed_from_u64(FIXTURE_SEED ^ 0xFFFF);

    (1..=params.users as i32)
        .map(|id| {
            let first_name = pick(&mut rng, FIRST_NAMES);
            let last_name = pick(&mut rng, LAST_NAMES);
            let name = format!("{}{}{id}", &first_name[..1], last_name).to_lowercase();
            let mut password_digest = vec![0u8; 32];
            rng.fill(&mut password_digest[..]);
            // A digest of all zero bytes would still be non-empty; keep the
            // first byte non-zero so it also never looks like a zeroed buffer.
            password_digest[0] |= 1;
            let creation_secs = 1_262_304_000 + rng.gen_range(0..100_000_000i64);
            let birth_days = 365 + rng.gen_range(0..12_000i64);

            User {
                id,
                active: rng.gen_bool(0.9),
                admin: rng.gen_bool(0.05),
                email: format!("{name}@example.com"),
                name,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                birth_date: epoch_plus(birth_days * 86_400).date_naive(),
                password_digest,
                login_count: rng.gen_range(1..5_000),
                failed_login_count: rng.gen_range(1..50),
                password_strength: rng.gen_range(1..5),
                creation_time: epoch_plus(creation_secs),
                last_login_time: epoch_plus(creation_secs + rng.gen_range(1..50_000_000i64)),
            }
        })
        .collect()
}

fn count_rows(client: &mut Client, table: &str) -> Result<i64> {
    let row = client
        .query_one(format!("select count(*) from {table}").as_str(), &[])
        .with_context(|| format!("failed to count rows in {table}"))?;
    Ok(row.try_get(0)?)
}

fn insert_people(client: &mut Client, people: &[Person]) -> Result<()> {
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(INSERT_PERSON_SQL)?;
    for p in people {
        tx.execute(
            &stmt,
            &[
                &p.id,
                &p.first_name,
                &p.last_name,
                &p.sex,
                &p.birth_date,
                &p.weight,
                &p.height,
                &p.update_time,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn insert_users(client: &mut Client, users: &[User]) -> Result<()> {
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(INSERT_USER_SQL)?;
    for u in users {
        tx.execute(
            &stmt,
            &[
                &u.id,
                &u.active,
                &u.admin,
                &u.name,
                &u.email,
                &u.first_name,
                &u.last_name,
                &u.birth_date,
                &u.password_digest,
                &u.login_count,
                &u.failed_login_count,
                &u.password_strength,
                &u.creation_time,
                &u.last_login_time,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Create the fixture tables if needed, seed any that are empty, and refresh
/// planner statistics. Fails when a table still has no rows afterwards.
///
/// Runs under a session advisory lock so concurrent callers against the same
/// database take turns and later ones only verify.
pub fn load_or_verify(client: &mut Client, params: &FixtureParams) -> Result<FixtureCounts> {
    client
        .execute("select pg_advisory_lock($1)", &[&FIXTURE_LOCK_KEY])
        .context("failed to take the fixture lock")?;
    let loaded = create_and_seed(client, params);
    let unlocked = client
        .execute("select pg_advisory_unlock($1)", &[&FIXTURE_LOCK_KEY])
        .context("failed to release the fixture lock");
    let counts = loaded?;
    unlocked?;
    Ok(counts)
}

fn table_exists(client: &mut Client, table: &str) -> Result<bool> {
    let row = client
        .query_one("select to_regclass($1::text) is not null", &[&table])
        .with_context(|| format!("failed to look up table {table}"))?;
    Ok(row.try_get(0)?)
}

fn create_and_seed(client: &mut Client, params: &FixtureParams) -> Result<FixtureCounts> {
    if !table_exists(client, PERSON_TABLE)? {
        client
            .batch_execute(CREATE_PERSON_SQL)
            .context("failed to create person table")?;
    }
    if !table_exists(client, USER_TABLE)? {
        client
            .batch_execute(CREATE_USER_SQL)
            .context("failed to create pgxbench_user table")?;
    }

    let mut seeded = false;

    if count_rows(client, PERSON_TABLE)? == 0 {
        log::info!("Seeding {} rows into {PERSON_TABLE}", params.persons);
        insert_people(client, &generate_people(params)).context("failed to seed person")?;
        seeded = true;
    }
    if count_rows(client, USER_TABLE)? == 0 {
        log::info!("Seeding {} rows into {USER_TABLE}", params.users);
        insert_users(client, &generate_users(params)).context("failed to seed pgxbench_user")?;
        seeded = true;
    }

    client
        .batch_execute("analyze person; analyze pgxbench_user")
        .context("failed to analyze fixture tables")?;

    let counts = FixtureCounts {
        persons: count_rows(client, PERSON_TABLE)?,
        users: count_rows(client, USER_TABLE)?,
        seeded,
    };
    if counts.persons == 0 || counts.users == 0 {
        anyhow::bail!(
            "fixture tables are empty after seeding (person={}, pgxbench_user={})",
            counts.persons,
            counts.users
        );
    }
    log::info!(
        "Fixtures ready: {} people, {} users{}",
        counts.persons,
        counts.users,
        if seeded { " (freshly seeded)" } else { "" }
    );
    Ok(counts)
}

/// Shuffle ids with a fixed seed so consecutive iterations hit scattered rows
/// while every run replays the same order.
pub fn shuffle_ids(mut ids: Vec<i32>) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(ID_ORDER_SEED);
    ids.shuffle(&mut rng);
    ids
}

/// Fetch every id of `table` and return them as a shuffled cycle.
pub fn fetch_ids(client: &mut Client, table: &str) -> Result<IdCycle> {
    let rows = client
        .query(format!("select id from {table} order by id").as_str(), &[])
        .with_context(|| format!("failed to fetch ids from {table}"))?;
    let ids = rows
        .iter()
        .map(|row| row.try_get::<_, i32>(0))
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        anyhow::bail!("{table} has no rows to benchmark against");
    }
    Ok(IdCycle::new(shuffle_ids(ids)))
}
