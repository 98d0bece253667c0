
use std::time::Duration;

use harness::{echo_roundtrip, payload, relay, ProxyHandle, ScriptedBackend, TcpEchoBackend};
use rstest::rstest;
use sproxy::CopyMode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

fn zero_copy() -> CopyMode {
    CopyMode::select(true)
}

#[rstest]
#[tokio::test]
async fn relays_bytes_exactly(
    #[values(CopyMode::select(true), CopyMode::Buffered)] mode: CopyMode,
    #[values(1, 16 * 1024)] buffer_size: usize,
) {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr, relay(mode, buffer_size))
        .await
        .unwrap();

    let data = payload(48 * 1024);
    let echoed = timeout(
        Duration::from_secs(10),
        echo_roundtrip(proxy.connect().await, &data),
    )
    .await
    .expect("echo timed out")
    .unwrap();
    assert_eq!(echoed, data);

    let snapshot = proxy
        .wait_for("pair closed", |s| s.pairs_closed == 1)
        .await;
    assert_eq!(snapshot.bytes_to_backend, data.len() as u64);
    assert_eq!(snapshot.bytes_from_backend, data.len() as u64);
    assert_eq!(snapshot.pipes_open, 0);
    assert_eq!(snapshot.endpoints_closed, 2);
    assert_eq!(snapshot.pairs_active, 0);
    assert_eq!(backend.connection_count(), 1);
}

#[rstest]
#[case::zero_copy(zero_copy())]
#[case::buffered(CopyMode::Buffered)]
#[tokio::test]
async fn empty_client_releases_everything(#[case] mode: CopyMode) {
    let mut backend = ScriptedBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr, relay(mode, 16 * 1024))
        .await
        .unwrap();

    let client = proxy.connect().await;
    let mut upstream = backend.accept().await;
    drop(client);

    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(5), upstream.read(&mut buf))
        .await
        .expect("backend never saw end-of-stream")
        .unwrap();
    assert_eq!(n, 0);

    let snapshot = proxy
        .wait_for("pair closed", |s| s.pairs_closed == 1)
        .await;
    assert_eq!(snapshot.bytes_to_backend, 0);
    assert_eq!(snapshot.bytes_from_backend, 0);
    assert_eq!(snapshot.pipes_open, 0);
    assert_eq!(snapshot.endpoints_closed, 2);
    if mode == CopyMode::ZeroCopy {
        assert_eq!(snapshot.pipes_created, 2);
    }
}

#[rstest]
#[case::zero_copy(zero_copy())]
#[case::buffered(CopyMode::Buffered)]
#[tokio::test]
async fn request_then_reply_then_client_close(#[case] mode: CopyMode) {
    let mut backend = ScriptedBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr, relay(mode, 8 * 1024))
        .await
        .unwrap();

    let data = payload(16 * 1024);
    let mut client = proxy.connect().await;
    let mut upstream = backend.accept().await;

    client.write_all(&data).await.unwrap();

    let mut received = vec![0u8; data.len()];
    timeout(Duration::from_secs(5), upstream.read_exact(&mut received))
        .await
        .expect("backend did not receive the payload")
        .unwrap();
    assert_eq!(received, data);

    let reply = payload(8 * 1024);
    upstream.write_all(&reply).await.unwrap();
    let mut received = vec![0u8; reply.len()];
    timeout(Duration::from_secs(5), client.read_exact(&mut received))
        .await
        .expect("client did not receive the reply")
        .unwrap();
    assert_eq!(received, reply);

    drop(client);
    let mut rest = [0u8; 16];
    let n = timeout(Duration::from_secs(5), upstream.read(&mut rest))
        .await
        .expect("close never reached the backend")
        .unwrap();
    assert_eq!(n, 0);

    let snapshot = proxy
        .wait_for("pair closed", |s| s.pairs_closed == 1)
        .await;
    assert_eq!(snapshot.bytes_to_backend, 16 * 1024);
    assert_eq!(snapshot.bytes_from_backend, 8 * 1024);
    assert_eq!(snapshot.pipes_open, 0);
    assert_eq!(snapshot.endpoints_closed, 2);
}

#[rstest]
#[case::zero_copy(zero_copy())]
#[case::buffered(CopyMode::Buffered)]
#[tokio::test]
async fn backend_close_reaches_client(#[case] mode: CopyMode) {
    let mut backend = ScriptedBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr, relay(mode, 16 * 1024))
        .await
        .unwrap();

    let mut client = proxy.connect().await;
    let mut upstream = backend.accept().await;

    upstream.write_all(b"server greeting").await.unwrap();
    drop(upstream);

    let mut received = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut received))
        .await
        .expect("client never saw end-of-stream")
        .unwrap();
    assert_eq!(received, b"server greeting");

    let snapshot = proxy
        .wait_for("pair closed", |s| s.pairs_closed == 1)
        .await;
    assert_eq!(snapshot.bytes_from_backend, 15);
    assert_eq!(snapshot.endpoints_closed, 2);
    assert_eq!(snapshot.pipes_open, 0);
}

#[rstest]
#[case::zero_copy(zero_copy())]
#[case::buffered(CopyMode::Buffered)]
#[tokio::test]
async fn backend_reset_releases_pair(#[case] mode: CopyMode) {
    let mut backend = ScriptedBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr, relay(mode, 16 * 1024))
        .await
        .unwrap();

    let mut client = proxy.connect().await;
    let upstream = backend.accept().await;

    // Closing with unread data makes the kernel answer with a reset.
    client.write_all(b"never read").await.unwrap();
    upstream.readable().await.unwrap();
    drop(upstream);

    let mut rest = Vec::new();
    let outcome = timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("client was never released");
    if let Ok(n) = outcome {
        assert_eq!(n, 0);
    }

    let snapshot = proxy
        .wait_for("pair closed", |s| s.pairs_closed == 1)
        .await;
    assert_eq!(snapshot.pairs_active, 0);
    assert_eq!(snapshot.pipes_open, 0);
    assert_eq!(snapshot.endpoints_closed, 2);
}

#[tokio::test]
async fn pairs_are_isolated() {
    let backend = TcpEchoBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(backend.addr, relay(zero_copy(), 4096))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8usize {
        let client = proxy.connect().await;
        tasks.push(tokio::spawn(async move {
            let data = payload(1024 * (i + 1));
            let echoed = echo_roundtrip(client, &data).await.unwrap();
            assert_eq!(echoed, data);
        }));
    }
    for task in tasks {
        timeout(Duration::from_secs(10), task)
            .await
            .expect("echo timed out")
            .unwrap();
    }

    let expected: u64 = (1..=8u64).map(|i| 1024 * i).sum();
    let snapshot = proxy
        .wait_for("all pairs closed", |s| s.pairs_closed == 8)
        .await;
    assert_eq!(snapshot.connections_accepted, 8);
    assert_eq!(snapshot.backend_connected, 8);
    assert_eq!(snapshot.bytes_to_backend, expected);
    assert_eq!(snapshot.bytes_from_backend, expected);
    assert_eq!(snapshot.endpoints_closed, 16);
    assert_eq!(snapshot.pipes_open, 0);
}
