//! Test helpers shared by unit and integration tests.

use std::env;
use std::sync::Once;

use chrono::{NaiveDate, TimeZone, Utc};
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{CustomerId, Label, PointId, Registration, RegistrationPoint, Timestamp};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "trace");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");

    // rayon worker spans add nothing to test output
    let noisy_modules = ["rayon"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Fixed timestamp in March 2024 for deterministic soft-delete tests.
pub fn fixed_time(day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Point with its stored path; metrics are left empty.
pub fn point(
    id: PointId,
    parent: Option<PointId>,
    path: &[PointId],
    customer: CustomerId,
    label: Label,
) -> RegistrationPoint {
    RegistrationPoint::new(id, parent, customer, format!("{} {}", label, id), label)
        .with_path(path.to_vec())
}

/// Area(1) > Category(2) > {Product(3, cost 100), Product(4, cost 200)}, plus an
/// unrelated Area(10) > Product(5, cost 50). All owned by `customer`.
pub fn kitchen_points(customer: CustomerId) -> Vec<RegistrationPoint> {
    vec![
        point(1, None, &[], customer, Label::Area),
        point(2, Some(1), &[1], customer, Label::Category),
        point(3, Some(2), &[1, 2], customer, Label::Product).with_cost(100.0),
        point(4, Some(2), &[1, 2], customer, Label::Product).with_cost(200.0),
        point(10, None, &[], customer, Label::Area),
        point(5, Some(10), &[10], customer, Label::Product).with_cost(50.0),
    ]
}

/// Registration on 2024-03-01.
pub fn registration(
    id: u64,
    point: PointId,
    customer: CustomerId,
    amount: f64,
    cost: f64,
) -> Registration {
    Registration {
        id,
        registration_point_id: point,
        customer_id: customer,
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default(),
        amount,
        cost,
    }
}
