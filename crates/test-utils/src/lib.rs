pub mod builders;
pub mod fake_task;

use std::sync::{Arc, Once};
use std::time::Duration;

use cadence::config::ConfigFile;
use cadence::pipeline::PipelineFactory;
use cadence::registry::Registry;
use cadence::status::StatusManager;
use cadence::task::TaskRegistry;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `condition` every few milliseconds until it holds (5s timeout).
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Registry + factory over `status`, the way the binary wires them.
pub fn factory(cfg: &ConfigFile, tasks: TaskRegistry, status: &StatusManager) -> Arc<PipelineFactory> {
    let registry = Registry::from_config(cfg, tasks).expect("registry from test config");
    Arc::new(PipelineFactory::new(Arc::new(registry), status.clone()))
}
