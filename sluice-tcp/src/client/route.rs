use crate::ConnectError;
use sluice_core::telemetry::tracing;
use sluice_proxy::handshake::{HandshakeTarget, HandshakeTransaction};
use sluice_proxy::{ProxyConfig, ProxyKind};
use sluice_utils::time::Deadline;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::thread;

/// Where a raw connection has to go for a single attempt.
#[derive(Debug)]
pub(crate) enum Route {
    Direct(SocketAddr),
    Proxied {
        proxy_host: String,
        proxy_port: u16,
        transaction: HandshakeTransaction,
    },
}

impl Route {
    /// Plan the route to `host:port`, given the outcome of resolving the target.
    ///
    /// An HTTP proxy is handed the host as given, so it does not need
    /// the target to be resolvable. All other routes do.
    pub(crate) fn plan(
        config: &ProxyConfig,
        host: &str,
        port: u16,
        resolved: io::Result<IpAddr>,
    ) -> Result<Self, ConnectError> {
        let ip = match resolved {
            Ok(ip) => Some(ip),
            Err(err) if config.kind() == ProxyKind::Http => {
                tracing::trace!(%host, error = %err, "target not resolvable locally, left to http proxy");
                None
            }
            Err(err) => {
                return Err(ConnectError::transport(err).with_context("resolve target"));
            }
        };

        if !config.proxies_target(ip) {
            let Some(ip) = ip else {
                return Err(ConnectError::invalid_input("unresolved target"));
            };
            return Ok(Self::Direct(SocketAddr::new(ip, port)));
        }

        let target = HandshakeTarget::new(host, port, ip);
        let transaction = HandshakeTransaction::new(config.kind(), target, config.credentials())?;
        Ok(Self::Proxied {
            proxy_host: config.host().to_owned(),
            proxy_port: config.port(),
            transaction,
        })
    }
}

/// Resolve `host` to a single address, blocking the current thread.
pub(crate) fn resolve_blocking(host: &str, port: u16) -> io::Result<IpAddr> {
    if let Some(ip) = ip_literal(host) {
        return Ok(ip);
    }
    pick_address((host, port).to_socket_addrs()?)
}

/// Resolve `host` to a single address, giving up once `deadline` passes.
///
/// The lookup itself cannot be interrupted, so a bounded one runs on its own
/// thread which is left to finish in the background on timeout.
pub(crate) fn resolve_blocking_within(host: &str, port: u16, deadline: &Deadline) -> io::Result<IpAddr> {
    if let Some(ip) = ip_literal(host) {
        return Ok(ip);
    }
    let Some(left) = deadline.remaining() else {
        return resolve_blocking(host, port);
    };
    if left.is_zero() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "no budget left to resolve"));
    }

    let (tx, rx) = flume::bounded(1);
    let query = host.to_owned();
    thread::Builder::new()
        .name("sluice-resolve".to_owned())
        .spawn(move || {
            if tx.send(resolve_blocking(&query, port)).is_err() {
                tracing::trace!(host = %query, "resolved after the attempt gave up");
            }
        })?;
    rx.recv_timeout(left)
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "resolve timed out")))
}

/// Resolve `host` to a single address.
pub(crate) async fn resolve(host: &str, port: u16) -> io::Result<IpAddr> {
    if let Some(ip) = ip_literal(host) {
        return Ok(ip);
    }
    pick_address(tokio::net::lookup_host((host, port)).await?)
}

fn ip_literal(host: &str) -> Option<IpAddr> {
    host.strip_prefix('[')
        .and_then(|host| host.strip_suffix(']'))
        .unwrap_or(host)
        .parse()
        .ok()
}

// IPv4 first: SOCKS cannot address anything else.
fn pick_address(addrs: impl Iterator<Item = SocketAddr>) -> io::Result<IpAddr> {
    let mut first = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Ok(addr.ip());
        }
        first.get_or_insert(addr.ip());
    }
    first.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectErrorKind;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const PUBLIC: IpAddr = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));

    fn unresolvable() -> io::Result<IpAddr> {
        Err(io::Error::new(io::ErrorKind::NotFound, "nxdomain"))
    }

    #[test]
    fn direct_without_proxy() {
        let route = Route::plan(&ProxyConfig::direct(), "example.com", 80, Ok(PUBLIC)).unwrap();
        assert!(matches!(route, Route::Direct(addr) if addr == SocketAddr::new(PUBLIC, 80)));
    }

    #[test]
    fn private_targets_bypass_proxy() {
        let config = ProxyConfig::socks5("proxy.local", 1080);
        let route = Route::plan(&config, "localhost", 80, Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))).unwrap();
        assert!(matches!(route, Route::Direct(_)));

        let config = config.with_use_proxy_for_private(true);
        let route = Route::plan(&config, "localhost", 80, Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))).unwrap();
        assert!(matches!(route, Route::Proxied { .. }));
    }

    #[test]
    fn public_targets_go_through_proxy() {
        let config = ProxyConfig::socks4("10.0.0.1", 1080);
        match Route::plan(&config, "example.com", 80, Ok(PUBLIC)).unwrap() {
            Route::Proxied {
                proxy_host,
                proxy_port,
                transaction,
            } => {
                assert_eq!(proxy_host, "10.0.0.1");
                assert_eq!(proxy_port, 1080);
                assert_eq!(transaction.kind(), ProxyKind::Socks4);
            }
            Route::Direct(addr) => panic!("expected proxied route, got direct to {addr}"),
        }
    }

    #[test]
    fn http_proxy_resolves_for_us() {
        let config = ProxyConfig::http("proxy.local", 3128);
        let route = Route::plan(&config, "internal.example", 443, unresolvable()).unwrap();
        assert!(matches!(route, Route::Proxied { transaction, .. } if transaction.target().ip().is_none()));
    }

    #[test]
    fn socks_needs_resolved_ipv4() {
        let config = ProxyConfig::socks5("proxy.local", 1080);
        let err = Route::plan(&config, "internal.example", 443, unresolvable()).unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Transport);

        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let err = Route::plan(&config, "v6.example", 443, Ok(v6)).unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::InvalidInput);
    }

    #[test]
    fn resolves_literals_without_lookup() {
        assert_eq!(
            resolve_blocking("127.0.0.1", 80).unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(resolve_blocking("[::1]", 80).unwrap(), "::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn bounded_resolve_gives_up_without_budget() {
        let expired = Deadline::after(Some(Duration::ZERO));
        let err = resolve_blocking_within("localhost", 80, &expired).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // literals need no lookup and no budget
        assert_eq!(
            resolve_blocking_within("127.0.0.1", 80, &expired).unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[test]
    fn bounded_resolve_within_budget() {
        let deadline = Deadline::after(Some(Duration::from_secs(5)));
        assert!(resolve_blocking_within("localhost", 80, &deadline).unwrap().is_loopback());
        assert!(resolve_blocking_within("localhost", 80, &Deadline::after(None)).unwrap().is_loopback());
    }

    #[test]
    fn prefers_ipv4() {
        let addrs = [
            "[::1]:80".parse::<SocketAddr>().unwrap(),
            "127.0.0.1:80".parse().unwrap(),
        ];
        assert_eq!(
            pick_address(addrs.into_iter()).unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert!(pick_address(std::iter::empty()).is_err());
    }
}
