mod common;

use common::*;
use sluice::admission::AdmissionController;
use sluice::proxy::ProxyKind;
use sluice::rt::Executor;
use sluice::tcp::ConnectErrorKind;
use sluice::tcp::client::{AttemptState, ConnectRequest, Connector, DenyRawConnector};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

fn request() -> ConnectRequest {
    ConnectRequest::soft(TARGET_HOST, TARGET_PORT, Duration::from_secs(5))
}

#[tokio::test]
async fn socks5_tunnel() {
    let proxy = FakeProxy::spawn(vec![
        Step::Expect(b"\x05\x01\x00"),
        Step::Reply(b"\x05\x00"),
        Step::Expect(SOCKS5_CONNECT),
        Step::Reply(SOCKS5_SUCCEEDED),
        Step::Echo,
    ]);
    let connector = Connector::new()
        .with_proxy_settings(proxy.config(ProxyKind::Socks5))
        .with_admission(AdmissionController::bounded(1));

    let completion = connector.connect(request()).unwrap();
    let handle = completion.handle().clone();
    let mut stream = completion.await.unwrap();
    assert_eq!(handle.state(), AttemptState::Connected);

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    drop(stream);
    assert_eq!(connector.admission().active(), 0);
    assert!(tokio::task::spawn_blocking(move || proxy.join()).await.unwrap().client_closed);
}

#[tokio::test]
async fn callback_receives_outcome() {
    let proxy = FakeProxy::spawn(vec![Step::Expect(SOCKS4_CONNECT), Step::Reply(SOCKS4_GRANTED)]);
    let connector = Connector::new().with_proxy_settings(proxy.config(ProxyKind::Socks4));

    let (tx, rx) = oneshot::channel();
    let handle = connector
        .connect_async(request(), move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();

    let stream = rx.await.unwrap().unwrap();
    assert_eq!(handle.state(), AttemptState::Connected);
    assert!(!connector.cancel(&handle));
    drop(stream);
    assert!(tokio::task::spawn_blocking(move || proxy.join()).await.unwrap().client_closed);
}

#[tokio::test]
async fn cancel_in_flight_handshake() {
    // accepts the greeting but never answers it
    let proxy = FakeProxy::spawn(vec![Step::Expect(b"\x05\x01\x00")]);
    let connector = Connector::new().with_proxy_settings(proxy.config(ProxyKind::Socks5));

    let completion = connector.connect(request()).unwrap();
    let handle = completion.handle().clone();
    while handle.state() != AttemptState::Handshaking {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(connector.cancel(&handle));
    let err = completion.await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(handle.state(), AttemptState::Cancelled);
    assert_eq!(connector.admission().active(), 0);
    assert!(tokio::task::spawn_blocking(move || proxy.join()).await.unwrap().client_closed);
}

#[tokio::test]
async fn queued_attempts_are_dispatched_in_order() {
    let admission = AdmissionController::bounded(1);
    let connector = Connector::new()
        .with_raw_connector(DenyRawConnector::new())
        .with_admission(admission.clone());

    let held = admission.acquire_blocking(None).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let mut handles = Vec::new();
    for label in ["A", "B", "C"] {
        let order = order.clone();
        let done_tx = done_tx.clone();
        let handle = connector
            .connect_async(ConnectRequest::new("127.0.0.1", 80), move |result| {
                assert_eq!(result.unwrap_err().kind(), ConnectErrorKind::Transport);
                order.lock().unwrap().push(label);
                done_tx.send(()).unwrap();
            })
            .unwrap();
        assert_eq!(handle.state(), AttemptState::Queued);
        handles.push(handle);
    }
    assert_eq!(admission.waiting(), 3);

    held.release();
    for _ in 0..3 {
        done_rx.recv().await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), ["A", "B", "C"]);
    assert!(handles.iter().all(|handle| handle.state() == AttemptState::Failed));
    assert_eq!(admission.active(), 0);
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn cancelled_queued_attempt_is_skipped() {
    let admission = AdmissionController::bounded(1);
    let connector = Connector::new()
        .with_raw_connector(DenyRawConnector::new())
        .with_admission(admission.clone());

    let held = admission.acquire_blocking(None).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let first = connector
        .connect_async(ConnectRequest::new("127.0.0.1", 80), |_| {
            panic!("cancelled attempt must not complete")
        })
        .unwrap();
    let tx2 = tx.clone();
    connector
        .connect_async(ConnectRequest::new("127.0.0.1", 81), move |result| {
            tx2.send(result.map(|_| ())).unwrap();
        })
        .unwrap();
    drop(tx);

    assert!(connector.cancel(&first));
    assert!(!connector.cancel(&first));
    held.release();

    let result = rx.recv().await.unwrap();
    assert_eq!(result.unwrap_err().kind(), ConnectErrorKind::Transport);
    assert!(rx.recv().await.is_none());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(admission.active(), 0);
}

#[tokio::test]
async fn hard_budget_runs_out_while_queued() {
    let admission = AdmissionController::bounded(1);
    let connector = Connector::new().with_admission(admission.clone());

    let held = admission.acquire_blocking(None).unwrap();
    let completion = connector
        .connect(ConnectRequest::hard("127.0.0.1", 80, Duration::from_millis(30)))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    held.release();

    let err = completion.await.unwrap_err();
    assert_eq!(err.kind(), ConnectErrorKind::Timeout);
    assert_eq!(connector.attempts(), 0);
    assert_eq!(admission.active(), 0);
}

#[tokio::test]
async fn close_rejects_queued_attempts() {
    let admission = AdmissionController::bounded(1);
    let connector = Connector::new().with_admission(admission.clone());

    let held = admission.acquire_blocking(None).unwrap();
    let completion = connector.connect(ConnectRequest::new("127.0.0.1", 80)).unwrap();
    let handle = completion.handle().clone();

    admission.close();
    let err = completion.await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(handle.state(), AttemptState::Cancelled);

    let err = connector.connect(ConnectRequest::new("127.0.0.1", 80)).unwrap_err();
    assert!(err.is_cancelled());

    drop(held);
    assert_eq!(admission.active(), 0);
}

#[tokio::test]
async fn cancel_after_dispatch_with_expired_budget_reports_cancelled() {
    let admission = AdmissionController::bounded(1);
    let connector = Connector::new().with_admission(admission.clone());

    let held = admission.acquire_blocking(None).unwrap();
    let completion = connector
        .connect(ConnectRequest::hard("127.0.0.1", 80, Duration::from_millis(30)))
        .unwrap();
    let handle = completion.handle().clone();

    tokio::time::sleep(Duration::from_millis(60)).await;
    // dispatched on this thread, the task has not run yet
    held.release();
    assert_eq!(handle.state(), AttemptState::Admitted);

    assert!(connector.cancel(&handle));
    let err = completion.await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(handle.state(), AttemptState::Cancelled);
    assert_eq!(admission.active(), 0);
    assert_eq!(connector.attempts(), 0);
}

#[test]
fn callback_invoked_when_runtime_is_gone() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let admission = AdmissionController::bounded(1);
    let connector = Connector::new()
        .with_executor(Executor::with_handle(runtime.handle().clone()))
        .with_admission(admission.clone());

    let held = admission.acquire_blocking(None).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = connector
        .connect_async(ConnectRequest::new("127.0.0.1", 80), move |result| {
            tx.send(result.map(drop)).unwrap();
        })
        .unwrap();
    assert_eq!(handle.state(), AttemptState::Queued);

    drop(runtime);
    // dispatches onto the shut down runtime
    held.release();

    let err = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
    assert!(err.is_cancelled());
    // sender went away with the callback, no second outcome
    assert!(rx.recv().is_err());
    assert_eq!(handle.state(), AttemptState::Cancelled);
    assert_eq!(admission.active(), 0);
    assert_eq!(connector.attempts(), 0);
}
