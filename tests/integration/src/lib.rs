//! Integration test utilities for the watch gateway
//!
//! Runs several gateway nodes in one process over a shared in-memory store and
//! pub/sub broker, with in-memory repositories standing in for Postgres.

pub mod cluster;
pub mod faults;
pub mod fixtures;

pub use client::{TestClient, QUIET_PERIOD, RECV_TIMEOUT};
pub use cluster::{TestCluster, TestServer};
pub use faults::FaultyStore;
pub use fixtures::{token_for, unique_id, Directory, TestTokens};

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `condition` until it holds or the receive timeout passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
