use clap::{Args, ValueEnum};
use sluice::{
    admission::AdmissionLimit,
    error::{BoxError, ErrorContext, OpaqueError},
    proxy::{ProxyConfig, ProxyKind},
    tcp::client::{ConnectorConfig, TimeoutPolicy},
    telemetry::tracing,
};
use std::time::{Duration, Instant};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Args)]
/// check whether a server can be reached, optionally through a proxy
pub struct CliCommandDial {
    /// The authority to connect to
    ///
    /// e.g. "127.0.0.1:443", "[::1]:22" or "example.com:8443"
    authority: String,

    #[arg(long, default_value_t = ProxyKind::None)]
    /// the kind of proxy to tunnel through (none, http, socks4, socks5)
    proxy_kind: ProxyKind,

    #[arg(long)]
    /// the authority of the proxy, required unless the proxy kind is none
    proxy: Option<String>,

    #[arg(long)]
    /// username to authenticate with at the proxy
    username: Option<String>,

    #[arg(long, requires = "username")]
    /// password to authenticate with at the proxy
    password: Option<String>,

    #[arg(long)]
    /// also tunnel private, loopback and link-local targets through the proxy
    proxy_private: bool,

    #[arg(long, short = 'c', default_value_t = 0)]
    /// the number of connection attempts allowed in flight (0 = no limit)
    max_connecting: usize,

    #[arg(long, short = 't', default_value_t = 10)]
    /// the timeout in seconds for the attempt (0 = no timeout)
    timeout: u64,

    #[arg(long, value_enum, default_value_t = Policy::Soft)]
    /// how time spent waiting for admission counts against the timeout
    policy: Policy,

    #[arg(long, value_enum, default_value_t = Mode::Async)]
    /// whether to connect from a blocking thread or an async task
    mode: Mode,

    /// enable debug logs for tracing (possible via RUST_LOG env as well)
    #[arg(long, short = 'v', default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum Policy {
    /// admission wait and connect each get the full timeout
    #[default]
    Soft,
    /// one timeout covers admission wait and connect
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum Mode {
    /// connect from a blocking thread
    Blocking,
    /// connect from an async task
    #[default]
    Async,
}

/// Run the dial command
pub async fn run(cfg: CliCommandDial) -> Result<(), BoxError> {
    crate::trace::init_tracing(if cfg.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    })?;

    let (host, port) = split_authority(&cfg.authority).context("parse target authority")?;
    let config = connector_config(&cfg)?;
    let connector = config.build();
    let request = config.request(host, port);

    tracing::info!(
        server.address = %request,
        proxy.kind = %cfg.proxy_kind,
        mode = ?cfg.mode,
        max_connecting = connector.num_allowed_sockets(),
        "connecting to server",
    );

    let start = Instant::now();
    let (local, peer) = match cfg.mode {
        Mode::Blocking => {
            let stream = tokio::task::spawn_blocking(move || connector.connect_blocking(request))
                .await
                .context("join blocking connect")??;
            (stream.local_addr()?, stream.peer_addr()?)
        }
        Mode::Async => {
            let stream = connector.connect(request)?.await?;
            (stream.local_addr()?, stream.peer_addr()?)
        }
    };

    tracing::info!(
        local.address = %local,
        peer.address = %peer,
        elapsed_ms = start.elapsed().as_millis(),
        "connected",
    );

    Ok(())
}

fn connector_config(cfg: &CliCommandDial) -> Result<ConnectorConfig, BoxError> {
    let proxy = match (cfg.proxy_kind, cfg.proxy.as_deref()) {
        (ProxyKind::None, _) => ProxyConfig::direct(),
        (_, None) => {
            return Err(OpaqueError::from_display("--proxy is required for the given --proxy-kind").into());
        }
        (kind, Some(authority)) => {
            let (host, port) =
                split_authority(authority).with_context(|| format!("parse proxy authority {authority:?}"))?;
            let mut proxy = ProxyConfig::new(kind, host, port).with_use_proxy_for_private(cfg.proxy_private);
            if let Some(username) = cfg.username.as_deref() {
                proxy.set_credentials(username, cfg.password.as_deref().unwrap_or_default());
            }
            proxy
        }
    };

    let limit = match cfg.max_connecting {
        0 => AdmissionLimit::Unlimited,
        n => AdmissionLimit::Bounded(n),
    };
    let policy = match cfg.policy {
        Policy::Soft => TimeoutPolicy::Soft,
        Policy::Hard => TimeoutPolicy::Hard,
    };

    Ok(ConnectorConfig::new()
        .with_proxy(proxy)
        .with_limit(limit)
        .with_timeout(Duration::from_secs(cfg.timeout), policy))
}

fn split_authority(authority: &str) -> Result<(String, u16), OpaqueError> {
    let (host, port) = authority
        .rsplit_once(':')
        .context("missing port in authority")?;
    let host = host
        .strip_prefix('[')
        .and_then(|host| host.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(OpaqueError::from_display("missing host in authority"));
    }
    let port = port.parse().context("parse port")?;
    Ok((host.to_owned(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_authorities() {
        assert_eq!(
            split_authority("example.com:8443").unwrap(),
            ("example.com".to_owned(), 8443)
        );
        assert_eq!(split_authority("[::1]:22").unwrap(), ("::1".to_owned(), 22));
        assert!(split_authority("example.com").is_err());
        assert!(split_authority(":80").is_err());
        assert!(split_authority("example.com:http").is_err());
    }
}
