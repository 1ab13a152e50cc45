//! Common test utilities for idle-audit
//!
//! Instrumented engine, idle schedulers, recording callback and a few
//! subject fixtures shared by the integration tests.

#![allow(dead_code)]

mod engines;
mod fixtures;

pub use engines::*;
pub use fixtures::*;

use std::future::Future;
use std::time::Duration;

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("idle_audit=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds, panicking after `timeout`
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached within {:?}", timeout);
}

/// Await `future`, panicking if it takes longer than `timeout`
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .expect("future did not settle in time")
}
