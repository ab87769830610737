//! Scripted fake proxies listening on loopback.

#![allow(dead_code)]

use sluice::proxy::{ProxyConfig, ProxyKind};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Target every test connects to through a proxy, matching `1.2.3.4:80`.
pub(crate) const TARGET_HOST: &str = "1.2.3.4";
pub(crate) const TARGET_PORT: u16 = 80;

pub(crate) const SOCKS4_CONNECT: &[u8] = b"\x04\x01\x00\x50\x01\x02\x03\x04\x00";
pub(crate) const SOCKS4_GRANTED: &[u8] = b"\x00\x5a\x00\x00\x00\x00\x00\x00";
pub(crate) const SOCKS4_REJECTED: &[u8] = b"\x00\x5b\x00\x00\x00\x00\x00\x00";
pub(crate) const HTTP_CONNECT: &[u8] = b"CONNECT 1.2.3.4:80 HTTP/1.0\r\n\r\n";
pub(crate) const SOCKS5_CONNECT: &[u8] = b"\x05\x01\x00\x01\x01\x02\x03\x04\x00\x50";
pub(crate) const SOCKS5_SUCCEEDED: &[u8] = b"\x05\x00\x00\x01\x00\x00\x00\x00\x00\x00";

/// One step of the conversation a [`FakeProxy`] has with its single client.
pub(crate) enum Step {
    /// Read exactly these bytes from the client.
    Expect(&'static [u8]),
    /// Write these bytes to the client.
    Reply(&'static [u8]),
    /// Sleep before the next step.
    Pause(Duration),
    /// Echo tunneled bytes back until the client closes.
    Echo,
}

#[derive(Debug, Default)]
pub(crate) struct Observed {
    pub(crate) received: Vec<u8>,
    pub(crate) client_closed: bool,
}

/// A proxy serving a single client according to a script.
///
/// Once the script is done it waits for the client to close the connection.
pub(crate) struct FakeProxy {
    port: u16,
    handle: JoinHandle<Observed>,
}

impl FakeProxy {
    pub(crate) fn spawn(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
            serve(&mut conn, script)
        });
        Self { port, handle }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn config(&self, kind: ProxyKind) -> ProxyConfig {
        ProxyConfig::new(kind, "127.0.0.1", self.port).with_use_proxy_for_private(true)
    }

    pub(crate) fn join(self) -> Observed {
        self.handle.join().unwrap()
    }
}

fn serve(conn: &mut TcpStream, script: Vec<Step>) -> Observed {
    let mut observed = Observed::default();
    for step in script {
        match step {
            Step::Expect(expected) => {
                let mut buf = vec![0u8; expected.len()];
                if conn.read_exact(&mut buf).is_err() {
                    observed.client_closed = true;
                    return observed;
                }
                assert_eq!(buf, expected, "unexpected bytes from client");
                observed.received.extend_from_slice(&buf);
            }
            Step::Reply(bytes) => {
                if conn.write_all(bytes).is_err() {
                    observed.client_closed = true;
                    return observed;
                }
            }
            Step::Pause(duration) => thread::sleep(duration),
            Step::Echo => {
                let mut reader = conn.try_clone().unwrap();
                io::copy(&mut reader, conn).unwrap();
                observed.client_closed = true;
                return observed;
            }
        }
    }
    observed.client_closed = wait_for_close(conn);
    observed
}

/// Read until the peer closes, `false` if it did not within the read timeout.
pub(crate) fn wait_for_close(conn: &mut TcpStream) -> bool {
    let mut buf = [0u8; 512];
    loop {
        match conn.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => {}
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => return false,
            Err(_) => return true,
        }
    }
}

/// Write `msg` through an established tunnel and expect it echoed back.
pub(crate) fn assert_echo(stream: &mut TcpStream, msg: &[u8]) {
    stream.write_all(msg).unwrap();
    let mut buf = vec![0u8; msg.len()];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(buf, msg);
}
