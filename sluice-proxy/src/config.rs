use arc_swap::ArcSwap;
use sluice_utils::macros::{generate_set_and_with, static_str_error};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
/// The kind of proxy an outbound connection traverses.
pub enum ProxyKind {
    #[default]
    /// Connect directly to the target.
    None,
    /// HTTP CONNECT tunneling.
    Http,
    /// SOCKS4 (IPv4 targets only).
    Socks4,
    /// SOCKS5 (RFC 1928), optionally with username/password authentication (RFC 1929).
    Socks5,
}

impl ProxyKind {
    /// The lowercase name of this proxy kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Http => "http",
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static_str_error! {
    pub struct UnknownProxyKind = "unknown proxy kind, expected one of: none, http, socks4, socks5";
}

impl FromStr for ProxyKind {
    type Err = UnknownProxyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [Self::None, Self::Http, Self::Socks4, Self::Socks5]
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(UnknownProxyKind::new)
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
/// Snapshot of the proxy an attempt has to traverse.
///
/// The configuration is consulted once per attempt,
/// later changes never affect an attempt in flight.
pub struct ProxyConfig {
    kind: ProxyKind,
    host: String,
    port: u16,
    authenticate: bool,
    username: String,
    password: String,
    use_proxy_for_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Borrowed proxy credentials.
pub struct Credentials<'a> {
    /// Username, also used as the SOCKS4 user id.
    pub username: &'a str,
    /// Password, only used by SOCKS5.
    pub password: &'a str,
}

impl ProxyConfig {
    /// Create a new [`ProxyConfig`] for the given proxy.
    pub fn new(kind: ProxyKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Create a [`ProxyConfig`] which connects directly.
    #[must_use]
    pub fn direct() -> Self {
        Self::default()
    }

    /// Create a [`ProxyConfig`] for an HTTP CONNECT proxy.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new(ProxyKind::Http, host, port)
    }

    /// Create a [`ProxyConfig`] for a SOCKS4 proxy.
    pub fn socks4(host: impl Into<String>, port: u16) -> Self {
        Self::new(ProxyKind::Socks4, host, port)
    }

    /// Create a [`ProxyConfig`] for a SOCKS5 proxy.
    pub fn socks5(host: impl Into<String>, port: u16) -> Self {
        Self::new(ProxyKind::Socks5, host, port)
    }

    generate_set_and_with! {
        /// Authenticate with the given username and password.
        pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
            self.authenticate = true;
            self.username = username.into();
            self.password = password.into();
            self
        }
    }

    generate_set_and_with! {
        /// Toggle whether or not the configured credentials are sent.
        pub fn authenticate(mut self, authenticate: bool) -> Self {
            self.authenticate = authenticate;
            self
        }
    }

    generate_set_and_with! {
        /// Toggle whether or not private, loopback and link-local
        /// targets are reached through the proxy as well.
        ///
        /// Disabled by default: such targets are connected to directly.
        pub fn use_proxy_for_private(mut self, enabled: bool) -> Self {
            self.use_proxy_for_private = enabled;
            self
        }
    }

    /// The kind of proxy.
    #[must_use]
    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// The proxy host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The proxy port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether or not connections are made without proxy.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.kind == ProxyKind::None
    }

    /// The credentials to send, if authentication is enabled.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials<'_>> {
        self.authenticate.then_some(Credentials {
            username: &self.username,
            password: &self.password,
        })
    }

    /// Decide whether a target resolved to `ip` is reached through the proxy.
    #[must_use]
    pub fn proxies_target(&self, ip: Option<IpAddr>) -> bool {
        if self.is_direct() {
            return false;
        }
        match ip {
            Some(ip) if is_private(ip) => self.use_proxy_for_private,
            _ => true,
        }
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified(),
        IpAddr::V6(ip) => {
            if let Some(ip) = ip.to_ipv4_mapped() {
                return is_private(IpAddr::V4(ip));
            }
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authenticate", &self.authenticate)
            .field("username", &self.username)
            .field("password", &"***")
            .field("use_proxy_for_private", &self.use_proxy_for_private)
            .finish()
    }
}

/// Provider of the [`ProxyConfig`] to use for the next attempt.
pub trait ProxySettings: Send + Sync + 'static {
    /// Snapshot the active proxy configuration.
    fn proxy_config(&self) -> Arc<ProxyConfig>;
}

impl ProxySettings for ProxyConfig {
    fn proxy_config(&self) -> Arc<ProxyConfig> {
        Arc::new(self.clone())
    }
}

impl<S: ProxySettings> ProxySettings for Arc<S> {
    fn proxy_config(&self) -> Arc<ProxyConfig> {
        (**self).proxy_config()
    }
}

#[derive(Debug, Clone)]
/// [`ProxySettings`] which can be swapped at runtime.
///
/// Clones share the same configuration.
pub struct LiveProxySettings(Arc<ArcSwap<ProxyConfig>>);

impl LiveProxySettings {
    /// Create new [`LiveProxySettings`] starting with the given configuration.
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(config)))
    }

    /// Replace the active configuration,
    /// attempts already started keep using their snapshot.
    pub fn update(&self, config: ProxyConfig) {
        self.0.store(Arc::new(config));
    }
}

impl Default for LiveProxySettings {
    fn default() -> Self {
        Self::new(ProxyConfig::direct())
    }
}

impl ProxySettings for LiveProxySettings {
    fn proxy_config(&self) -> Arc<ProxyConfig> {
        self.0.load_full()
    }
}
