//! Tracing initialization.
//!
//! The library only emits `tracing` events; embedding applications that don't
//! install their own subscriber can call [`init`].

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// True under `cargo test` or nextest.
fn under_test_harness() -> bool {
    std::env::var_os("NEXTEST").is_some() || std::env::var_os("CARGO_TARGET_TMPDIR").is_some()
}

/// Installs a compact stderr subscriber. Later calls are no-ops.
///
/// `RUST_LOG` directives apply on top of the base level: INFO normally, DEBUG
/// under a test harness. Test output goes through the harness's capture.
pub fn init() {
    INIT.call_once(|| {
        let is_test = under_test_harness();
        let base = if is_test { Level::DEBUG } else { Level::INFO };
        let filter = EnvFilter::from_default_env().add_directive(base.into());

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_target(true)
            .compact();

        if is_test {
            // Keep the thread-default subscriber installed for the test's lifetime
            std::mem::forget(builder.with_test_writer().finish().set_default());
        } else if let Err(e) = builder.with_writer(std::io::stderr).try_init() {
            eprintln!("symdex: tracing subscriber already installed: {}", e);
        }
    });
}
