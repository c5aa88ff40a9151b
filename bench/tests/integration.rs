//! Integration tests: run every driver and the raw client against a live
//! PostgreSQL server configured through the `PG*` environment variables.
//!
//! Run with `cargo test -- --ignored`.

use bench_core::config::ConnConfig;
use driver_bench::context::BenchContext;
use driver_bench::driver::sync_postgres::client_config;
use driver_bench::driver::DriverKind;
use driver_bench::fixtures::{load_or_verify, FixtureParams};
use driver_bench::runner::{
    check_range, execute_shape, measure, measure_raw, LoopParams, QueryShape,
};
use postgres::NoTls;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn setup_context() -> BenchContext {
    let config = ConnConfig::from_env().expect("connection configuration");
    BenchContext::setup(config, &FixtureParams::small()).expect("setup")
}

/// Make person 1 the well-known "Jane" row. Runs after the context so the
/// table exists and has been seeded.
fn upsert_jane(ctx: &BenchContext) {
    let mut client = client_config(ctx.config())
        .connect(NoTls)
        .expect("connect");
    client
        .execute(
            "insert into person (id, first_name, last_name, sex, birth_date, weight, height, update_time)
             values (1, 'Jane', 'Smith', 'female', '1990-04-12', 60, 165, now())
             on conflict (id) do update
               set first_name = excluded.first_name, weight = excluded.weight",
            &[],
        )
        .expect("upsert jane");
}

fn quick_params() -> LoopParams {
    LoopParams {
        warmup: 5,
        samples: 50,
    }
}

// ── Driver tests ────────────────────────────────────────────────────

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn every_driver_reads_jane() {
    let ctx = setup_context();
    upsert_jane(&ctx);

    for kind in DriverKind::ALL {
        let mut driver = ctx.checkout(kind).unwrap();
        driver.prepare().unwrap();

        assert_eq!(driver.select_first_name(1).unwrap(), "Jane", "{kind}");

        let person = driver.select_person(1).unwrap();
        assert_eq!(person.id, 1, "{kind}");
        assert_eq!(person.first_name, "Jane", "{kind}");
        assert_eq!(person.weight, 60, "{kind}");
        person.check_filled().unwrap();
    }

    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn range_one_to_twenty_five_returns_exactly_those_rows() {
    let ctx = setup_context();

    for kind in DriverKind::ALL {
        let mut driver = ctx.checkout(kind).unwrap();
        driver.prepare().unwrap();

        let people = driver.select_people(1).unwrap();
        let mut ids: Vec<i32> = people.iter().map(|p| p.id).collect();
        assert_eq!(check_range(1, ids.iter().copied()), Ok(25), "{kind}");
        ids.sort_unstable();
        assert_eq!(ids, (1..=25).collect::<Vec<_>>(), "{kind}");
        for person in &people {
            person.check_filled().unwrap();
        }
    }

    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn every_driver_passes_every_shape() {
    let ctx = setup_context();

    for kind in DriverKind::ALL {
        let mut driver = ctx.checkout(kind).unwrap();
        driver.prepare().unwrap();
        for shape in QueryShape::ALL {
            let ids = ctx.ids_for(shape);
            for i in 0..ids.len().min(20) {
                let rows = execute_shape(driver.as_mut(), shape, ids.id_at(i))
                    .unwrap_or_else(|e| panic!("{kind}/{shape}: {e:#}"));
                assert!(shape.expected_rows().contains(&rows));
            }
        }
    }

    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn measure_collects_samples_for_every_driver() {
    let ctx = setup_context();
    let params = quick_params();

    for kind in DriverKind::ALL {
        let mut driver = ctx.checkout(kind).unwrap();
        let ids = ctx.ids_for(QueryShape::SingleRow);
        let result = measure(driver.as_mut(), QueryShape::SingleRow, ids, &params).unwrap();
        assert_eq!(result.driver, kind.name());
        assert_eq!(result.durations.len(), params.samples);
        assert_eq!(result.total_rows, params.samples);
    }

    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn checkouts_return_to_the_pool() {
    let ctx = setup_context();

    // More sequential checkouts than the pool holds.
    for _ in 0..ctx.config().pool_size * 2 {
        for kind in DriverKind::ALL {
            let mut driver = ctx.checkout(kind).unwrap();
            driver.prepare().unwrap();
            let id = ctx.ids_for(QueryShape::SingleValue).id_at(0);
            driver.select_first_name(id).unwrap();
        }
    }

    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn sqlx_checkout_is_released_on_drop() {
    let ctx = setup_context();

    // Each release goes back through the pool's runtime; more rounds than
    // the pool holds would block if a connection leaked.
    for _ in 0..ctx.config().pool_size + 1 {
        let mut driver = ctx.checkout(DriverKind::Sqlx).unwrap();
        driver.prepare().unwrap();
        drop(driver);
    }

    let mut driver = ctx.checkout(DriverKind::Sqlx).unwrap();
    driver.prepare().unwrap();
    assert!(!driver.select_first_name(1).unwrap().is_empty());
    drop(driver);

    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn sqlx_measures_every_shape_with_a_fresh_checkout() {
    let ctx = setup_context();
    let params = quick_params();

    for shape in QueryShape::ALL {
        let mut driver = ctx.checkout(DriverKind::Sqlx).unwrap();
        let result = measure(driver.as_mut(), shape, ctx.ids_for(shape), &params)
            .unwrap_or_else(|e| panic!("sqlx/{shape}: {e:#}"));
        assert_eq!(result.durations.len(), params.samples);
        assert!(result.total_rows >= params.samples);
    }

    ctx.teardown();
}

// ── Raw client tests ────────────────────────────────────────────────

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn raw_client_verifies_every_shape() {
    let ctx = setup_context();
    let mut raw = ctx.raw_client().unwrap();

    for shape in QueryShape::ALL {
        raw.prepare(shape).unwrap();
        let summary = raw.verify(shape, ctx.ids_for(shape).id_at(0)).unwrap();
        assert!(shape.expected_rows().contains(&summary.data_rows));
        assert!(summary.command_tag.starts_with("SELECT"));
    }

    let summary = raw.verify(QueryShape::MultipleRows, 1).unwrap();
    assert_eq!(summary.data_rows, 25);

    drop(raw);
    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn raw_measurement_completes() {
    let ctx = setup_context();
    let mut raw = ctx.raw_client().unwrap();
    let params = quick_params();

    raw.prepare(QueryShape::UserRow).unwrap();
    let ids = ctx.ids_for(QueryShape::UserRow);
    let result = measure_raw(&mut raw, QueryShape::UserRow, ids, &params).unwrap();
    assert_eq!(result.durations.len(), params.samples);
    assert_eq!(result.rows_per_op(), None);

    drop(raw);
    ctx.teardown();
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn raw_client_reports_unprepared_statement() {
    let ctx = setup_context();
    let mut raw = ctx.raw_client().unwrap();

    let err = raw.verify(QueryShape::SingleRow, 1).unwrap_err();
    assert!(err.to_string().contains("26000"), "{err}");

    // The session is still usable afterwards.
    raw.prepare(QueryShape::SingleRow).unwrap();
    raw.verify(QueryShape::SingleRow, 1).unwrap();

    drop(raw);
    ctx.teardown();
}

// ── Fixture tests ───────────────────────────────────────────────────

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn concurrent_fixture_loads_agree() {
    let config = ConnConfig::from_env().expect("connection configuration");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let config = config.clone();
            thread::spawn(move || {
                let mut client = client_config(&config).connect(NoTls).expect("connect");
                load_or_verify(&mut client, &FixtureParams::small()).expect("load_or_verify")
            })
        })
        .collect();

    let counts: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("loader thread panicked"))
        .collect();
    for c in &counts {
        assert_eq!((c.persons, c.users), (counts[0].persons, counts[0].users));
        assert!(c.persons > 0 && c.users > 0);
    }
    // At most one caller seeds each table.
    assert!(counts.iter().filter(|c| c.seeded).count() <= 2);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn verifying_existing_fixtures_raises_no_notices() {
    // Make sure the tables exist first.
    setup_context().teardown();

    let config = ConnConfig::from_env().expect("connection configuration");
    let notices = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notices);
    let mut client = client_config(&config)
        .notice_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .connect(NoTls)
        .expect("connect");

    let counts = load_or_verify(&mut client, &FixtureParams::small()).unwrap();
    assert!(!counts.seeded);
    assert_eq!(notices.load(Ordering::SeqCst), 0);
}

#[test]
#[ignore = "requires a running PostgreSQL server"]
fn id_cycles_cover_the_fixture_tables() {
    let ctx = setup_context();
    let counts = *ctx.fixture_counts();

    let person_ids = ctx.ids_for(QueryShape::SingleRow);
    assert_eq!(person_ids.len() as i64, counts.persons);
    let user_ids = ctx.ids_for(QueryShape::UserRow);
    assert_eq!(user_ids.len() as i64, counts.users);

    let mut sorted = person_ids.ids().to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), person_ids.len());

    ctx.teardown();
}
