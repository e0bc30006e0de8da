//! Mock HTTP services for the ledger and existence-check clients.
//!
//! Sandboxed runners may forbid loopback sockets. Tests then skip with a
//! note naming the service, unless `HARVESTER_REQUIRE_SOCKET_TESTS` is set.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "HARVESTER_REQUIRE_SOCKET_TESTS";

/// Whether a missing loopback socket fails the test or skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPolicy {
    Required,
    Optional,
}

impl SocketPolicy {
    pub fn from_env() -> Self {
        match std::env::var(REQUIRE_ENV) {
            Ok(value) if matches!(value.trim(), "1" | "true" | "yes") => Self::Required,
            _ => Self::Optional,
        }
    }
}

pub fn loopback_available() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Starts a mock for `service`, or returns `None` when sockets are unavailable
/// and not required.
#[track_caller]
pub fn service_or_skip(service: &str) -> impl Future<Output = Option<MockServer>> {
    let caller = std::panic::Location::caller();
    let available = loopback_available();
    if !available {
        let note = format!(
            "{service} mock needs a loopback socket ({}:{})",
            caller.file(),
            caller.line()
        );
        match SocketPolicy::from_env() {
            SocketPolicy::Required => panic!("{note}; unset {REQUIRE_ENV} to allow skipping"),
            SocketPolicy::Optional => eprintln!("{note}, skipping"),
        }
    }
    async move {
        if available {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
