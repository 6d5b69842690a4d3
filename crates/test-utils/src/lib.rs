pub mod builders;
pub mod fake_backend;
pub mod fake_executor;
pub mod recording;

use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests, once per test binary.
///
/// Output goes through the test writer, so it only shows for failing tests
/// (or with `-- --nocapture`). The filter comes from `GRIDRUN_LOG`, then
/// `RUST_LOG`, then `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("GRIDRUN_LOG")
            .ok()
            .and_then(|s| EnvFilter::try_new(s).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Upper bound for a whole pipeline run in tests.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `f`, failing the test if it takes longer than [`RUN_TIMEOUT`].
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(RUN_TIMEOUT, f)
        .await
        .expect("pipeline did not finish in time")
}

/// Write `text` as `gridrun.toml` inside `dir` and return its path.
pub fn write_pipeline(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("gridrun.toml");
    std::fs::write(&path, text).expect("writing pipeline file");
    path
}
