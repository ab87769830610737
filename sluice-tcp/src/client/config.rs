use super::{ConnectRequest, Connector, TimeoutPolicy};
use sluice_core::admission::{AdmissionController, AdmissionLimit};
use sluice_proxy::ProxyConfig;
use sluice_utils::macros::generate_set_and_with;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
/// Static configuration of a [`Connector`].
pub struct ConnectorConfig {
    /// Proxy to tunnel through.
    pub proxy: ProxyConfig,
    /// How many attempts may be in flight at once.
    pub limit: AdmissionLimit,
    /// Whether or not TCP keep-alive is enabled on established connections.
    pub keep_alive: bool,
    /// Default time budget of requests created by [`ConnectorConfig::request`],
    /// zero meaning no timeout.
    pub timeout: Duration,
    /// Default [`TimeoutPolicy`] of requests created by [`ConnectorConfig::request`].
    pub policy: TimeoutPolicy,
}

impl ConnectorConfig {
    /// Create a new [`ConnectorConfig`] connecting directly without limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Tunnel through the given proxy.
        pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
            self.proxy = proxy;
            self
        }
    }

    generate_set_and_with! {
        /// Bound the number of attempts in flight.
        pub fn limit(mut self, limit: AdmissionLimit) -> Self {
            self.limit = limit;
            self
        }
    }

    generate_set_and_with! {
        /// Enable or disable TCP keep-alive.
        pub fn keep_alive(mut self, keep_alive: bool) -> Self {
            self.keep_alive = keep_alive;
            self
        }
    }

    generate_set_and_with! {
        /// Set the default time budget and policy of requests.
        pub fn timeout(mut self, timeout: Duration, policy: TimeoutPolicy) -> Self {
            self.timeout = timeout;
            self.policy = policy;
            self
        }
    }

    /// Create a [`ConnectRequest`] using the configured timeout and policy.
    pub fn request(&self, host: impl Into<String>, port: u16) -> ConnectRequest {
        ConnectRequest::new(host, port)
            .with_timeout(self.timeout)
            .with_policy(self.policy)
    }

    /// Build a [`Connector`] with its own [`AdmissionController`].
    #[must_use]
    pub fn build(&self) -> Connector {
        Connector::new()
            .with_proxy_settings(self.proxy.clone())
            .with_admission(AdmissionController::new(self.limit))
            .with_keep_alive(self.keep_alive)
    }
}
