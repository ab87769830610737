use crate::ConnectError;
use sluice_utils::macros::generate_set_and_with;
use sluice_utils::time::non_zero_timeout;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
/// How time spent waiting for admission counts against the timeout of an attempt.
pub enum TimeoutPolicy {
    /// The wait for admission is bounded by the timeout,
    /// after which the attempt itself gets the full timeout.
    #[default]
    Soft,
    /// A single budget covers admission, connect and handshake,
    /// an attempt admitted after its budget ran out fails with a timeout.
    Hard,
}

impl fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft => f.write_str("soft"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single outbound connection request.
pub struct ConnectRequest {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    policy: TimeoutPolicy,
}

impl ConnectRequest {
    /// Create a new [`ConnectRequest`] without timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
            policy: TimeoutPolicy::Soft,
        }
    }

    /// Create a [`ConnectRequest`] using the [`TimeoutPolicy::Soft`] policy.
    pub fn soft(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self::new(host, port).with_timeout(timeout)
    }

    /// Create a [`ConnectRequest`] using the [`TimeoutPolicy::Hard`] policy.
    pub fn hard(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self::new(host, port)
            .with_timeout(timeout)
            .with_policy(TimeoutPolicy::Hard)
    }

    generate_set_and_with! {
        /// Set the time budget of the attempt, zero meaning no timeout.
        pub fn timeout(mut self, timeout: Duration) -> Self {
            self.timeout = non_zero_timeout(timeout);
            self
        }
    }

    generate_set_and_with! {
        /// Set the [`TimeoutPolicy`] of the attempt.
        pub fn policy(mut self, policy: TimeoutPolicy) -> Self {
            self.policy = policy;
            self
        }
    }

    /// The target host, a name or an IP literal.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The target port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The time budget, `None` if unbounded.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The [`TimeoutPolicy`] of the attempt.
    #[must_use]
    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    pub(crate) fn validate(&self) -> Result<(), ConnectError> {
        if self.port == 0 {
            return Err(ConnectError::invalid_input("port 0"));
        }
        if self.host.is_empty() {
            return Err(ConnectError::invalid_input("empty host"));
        }
        Ok(())
    }
}

impl fmt::Display for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectErrorKind;

    #[test]
    fn zero_timeout_means_unbounded() {
        let request = ConnectRequest::soft("example.com", 80, Duration::ZERO);
        assert_eq!(request.timeout(), None);

        let request = ConnectRequest::hard("example.com", 80, Duration::from_millis(100));
        assert_eq!(request.timeout(), Some(Duration::from_millis(100)));
        assert_eq!(request.policy(), TimeoutPolicy::Hard);
    }

    #[test]
    fn port_zero_is_invalid() {
        let err = ConnectRequest::new("example.com", 0).validate().unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::InvalidInput);
        ConnectRequest::new("example.com", 1).validate().unwrap();
    }

    #[test]
    fn display_brackets_ipv6() {
        assert_eq!(ConnectRequest::new("::1", 80).to_string(), "[::1]:80");
        assert_eq!(ConnectRequest::new("example.com", 443).to_string(), "example.com:443");
    }
}
