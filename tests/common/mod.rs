// tests/common/mod.rs

#![allow(dead_code)]

pub use gridrun_test_utils::builders;
pub use gridrun_test_utils::{init_tracing, with_timeout};

use std::time::Duration;

use gridrun::grid::GridSettings;

/// Settings for runs against fake backends: no waiting for targets.
pub fn fast_settings() -> GridSettings {
    GridSettings {
        settle_tries: 1,
        settle_interval: Duration::ZERO,
        ..GridSettings::default()
    }
}
