mod common;

use common::*;
use sluice::admission::AdmissionController;
use sluice::proxy::ProxyConfig;
use sluice::tcp::client::{ConnectRequest, Connector};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LIMIT: usize = 3;
const PER_STYLE: usize = 8;

/// A socks4 proxy granting `expected` connections, returning the highest
/// number of handshakes it saw in progress at once.
fn spawn_counting_proxy(expected: usize) -> (u16, JoinHandle<usize>) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..expected)
            .map(|_| {
                let (mut conn, _) = listener.accept().unwrap();
                let in_flight = in_flight.clone();
                let max_in_flight = max_in_flight.clone();
                thread::spawn(move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);

                    let mut request = [0u8; SOCKS4_CONNECT.len()];
                    conn.read_exact(&mut request).unwrap();
                    assert_eq!(request, SOCKS4_CONNECT);
                    thread::sleep(Duration::from_millis(20));

                    // the client holds its slot until it has read the reply
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    conn.write_all(SOCKS4_GRANTED).unwrap();
                    conn.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
                    assert!(wait_for_close(&mut conn));
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        max_in_flight.load(Ordering::SeqCst)
    });

    (port, handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_load_never_exceeds_limit() {
    let (port, proxy) = spawn_counting_proxy(2 * PER_STYLE);
    let connector = Connector::new()
        .with_proxy_settings(ProxyConfig::socks4("127.0.0.1", port))
        .with_admission(AdmissionController::bounded(LIMIT));

    let mut blocking = Vec::new();
    for _ in 0..PER_STYLE {
        let connector = connector.clone();
        blocking.push(tokio::task::spawn_blocking(move || {
            connector.connect_blocking(ConnectRequest::soft(TARGET_HOST, TARGET_PORT, Duration::from_secs(10)))
        }));
    }

    let mut pending = Vec::new();
    for _ in 0..PER_STYLE {
        pending.push(
            connector
                .connect(ConnectRequest::soft(TARGET_HOST, TARGET_PORT, Duration::from_secs(10)))
                .unwrap(),
        );
    }

    for task in blocking {
        drop(task.await.unwrap().unwrap());
    }
    for completion in pending {
        drop(completion.await.unwrap());
    }

    let max_in_flight = tokio::task::spawn_blocking(move || proxy.join().unwrap())
        .await
        .unwrap();
    assert!(max_in_flight >= 1);
    assert!(max_in_flight <= LIMIT, "max in flight: {max_in_flight}");

    assert_eq!(connector.admission().active(), 0);
    assert_eq!(connector.admission().waiting(), 0);
    assert_eq!(connector.attempts(), (2 * PER_STYLE) as u64);
}
