use std::sync::Once;

use statement_core::{Client, ClientConfig};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing-subscriber` fmt layer once per test binary, the way
/// the teacher's own integration tests do, so `tracing::debug!`/`warn!`
/// output from the fetch loop and transport retry path is visible with
/// `RUST_LOG=statement_core=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Build a client pointed at a `wiremock` server with default configuration.
#[allow(dead_code)]
pub fn client_for(server_url: &str) -> Client {
    init_tracing();
    let config = ClientConfig::new(server_url);
    Client::new(config).expect("client config built from a mock server URL is always valid")
}

/// Build a client with a configuration override, e.g. a short statement
/// timeout for timeout-path tests.
#[allow(dead_code)]
pub fn client_with(config: ClientConfig) -> Client {
    init_tracing();
    Client::new(config).expect("client config built from a mock server URL is always valid")
}
