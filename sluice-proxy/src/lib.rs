//! Proxy support for sluice.
//!
//! This crate knows how to talk to the proxies an outbound connection
//! may have to traverse:
//!
//! - [`ProxyConfig`]: which proxy (if any) to use and with which credentials,
//!   consulted through a [`ProxySettings`] provider once per attempt;
//! - [`proto`]: the bit-exact wire frames of HTTP CONNECT, SOCKS4 and SOCKS5;
//! - [`handshake`]: a sans-io [`HandshakeTransaction`](handshake::HandshakeTransaction)
//!   per attempt, driven over a blocking stream with
//!   [`handshake_blocking`](handshake::handshake_blocking) or over an
//!   async stream with [`handshake`](handshake::handshake()).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

mod config;
#[doc(inline)]
pub use config::{Credentials, LiveProxySettings, ProxyConfig, ProxyKind, ProxySettings, UnknownProxyKind};

pub mod handshake;
pub mod proto;
